//! Module: model::entity
//! Responsibility: the frozen, shareable mapping metadata of one type.
//! Does not own: construction (see `model::builder`).

use crate::{
    error::{DecodeError, MappingError, ModelError},
    model::{
        Instance, InstanceOps, Marker, MarkerKind, Markers, PropertyModel, PropertyValue,
        RecordMut, RecordRef,
    },
    value::{DocId, Value},
};
use std::{fmt, sync::Arc};

///
/// EntityModelParts
///
/// Everything `EntityModelBuilder::build` hands over once validation passes.
///

pub(crate) struct EntityModelParts {
    pub(crate) type_name: String,
    pub(crate) target_type: String,
    pub(crate) properties: Vec<PropertyModel>,
    pub(crate) superclass: Option<Arc<EntityModel>>,
    pub(crate) interfaces: Vec<Arc<EntityModel>>,
    pub(crate) classes: Vec<String>,
    pub(crate) markers: Markers,
    pub(crate) id_property_name: Option<String>,
    pub(crate) version_property_name: Option<String>,
    pub(crate) discriminator: Option<(String, String)>,
    pub(crate) collection_name: String,
    pub(crate) ops: Option<InstanceOps>,
}

///
/// EntityModel
///
/// Immutable mapping metadata for one record type. Built once per type and
/// shared behind `Arc` by the mapper.
///

pub struct EntityModel {
    type_name: String,
    target_type: String,
    properties: Vec<PropertyModel>,
    superclass: Option<Arc<Self>>,
    interfaces: Vec<Arc<Self>>,
    classes: Vec<String>,
    markers: Markers,
    id_property_name: Option<String>,
    version_property_name: Option<String>,
    discriminator: Option<(String, String)>,
    collection_name: String,
    ops: Option<InstanceOps>,
}

impl EntityModel {
    pub(crate) fn new(parts: EntityModelParts) -> Self {
        Self {
            type_name: parts.type_name,
            target_type: parts.target_type,
            properties: parts.properties,
            superclass: parts.superclass,
            interfaces: parts.interfaces,
            classes: parts.classes,
            markers: parts.markers,
            id_property_name: parts.id_property_name,
            version_property_name: parts.version_property_name,
            discriminator: parts.discriminator,
            collection_name: parts.collection_name,
            ops: parts.ops,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Type actually constructed when decoding.
    #[must_use]
    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    #[must_use]
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    #[must_use]
    pub fn properties(&self) -> &[PropertyModel] {
        &self.properties
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyModel> {
        self.properties.iter().find(|property| property.name() == name)
    }

    /// Like [`Self::property`], failing with the list of valid names.
    pub fn property_by_name(&self, name: &str) -> Result<&PropertyModel, MappingError> {
        self.property(name).ok_or_else(|| {
            ModelError::NoSuchProperty {
                name: name.to_string(),
                valid: self
                    .properties
                    .iter()
                    .map(|property| property.name().to_string())
                    .collect(),
            }
            .into()
        })
    }

    #[must_use]
    pub fn property_by_mapped_name(&self, mapped_name: &str) -> Option<&PropertyModel> {
        self.properties
            .iter()
            .find(|property| property.mapped_name() == mapped_name)
    }

    #[must_use]
    pub fn id_property_name(&self) -> Option<&str> {
        self.id_property_name.as_deref()
    }

    pub fn id_property(&self) -> Result<&PropertyModel, MappingError> {
        self.id_property_name
            .as_deref()
            .and_then(|name| self.property(name))
            .ok_or_else(|| {
                ModelError::MissingIdentity {
                    type_name: self.type_name.clone(),
                }
                .into()
            })
    }

    #[must_use]
    pub fn version_property(&self) -> Option<&PropertyModel> {
        self.version_property_name
            .as_deref()
            .and_then(|name| self.property(name))
    }

    // ------------------------------------------------------------------
    // Hierarchy and markers
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn superclass(&self) -> Option<&Arc<Self>> {
        self.superclass.as_ref()
    }

    #[must_use]
    pub fn interfaces(&self) -> &[Arc<Self>] {
        &self.interfaces
    }

    /// Ancestor type names, nearest first.
    #[must_use]
    pub fn class_hierarchy(&self) -> &[String] {
        &self.classes
    }

    /// True when `type_name` is this type or one of its ancestors.
    #[must_use]
    pub fn is_a(&self, type_name: &str) -> bool {
        self.type_name == type_name || self.classes.iter().any(|class| class == type_name)
    }

    #[must_use]
    pub const fn markers(&self) -> &Markers {
        &self.markers
    }

    #[must_use]
    pub fn marker(&self, kind: &MarkerKind) -> Option<&Marker> {
        self.markers.get(kind)
    }

    #[must_use]
    pub fn has_marker(&self, kind: &MarkerKind) -> bool {
        self.markers.contains(kind)
    }

    #[must_use]
    pub const fn is_discriminator_enabled(&self) -> bool {
        self.discriminator.is_some()
    }

    #[must_use]
    pub fn discriminator_key(&self) -> Option<&str> {
        self.discriminator.as_ref().map(|(key, _)| key.as_str())
    }

    #[must_use]
    pub fn discriminator(&self) -> Option<&str> {
        self.discriminator.as_ref().map(|(_, value)| value.as_str())
    }

    // ------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn is_instantiable(&self) -> bool {
        self.ops.is_some()
    }

    fn ops(&self) -> Result<InstanceOps, MappingError> {
        self.ops.ok_or_else(|| {
            ModelError::NotInstantiable {
                type_name: self.target_type.clone(),
            }
            .into()
        })
    }

    /// Construct a default-initialized instance of the target type.
    pub fn instantiate(&self) -> Result<Instance, MappingError> {
        Ok(self.ops()?.create())
    }

    #[must_use]
    pub fn is_instance(&self, instance: &Instance) -> bool {
        self.ops.is_some_and(|ops| ops.matches(instance))
    }

    pub fn borrow<'a>(&self, instance: &'a Instance) -> Result<RecordRef<'a>, MappingError> {
        let ops = self.ops()?;
        self.check_instance(ops, instance)?;

        ops.borrow(instance)
    }

    pub fn borrow_mut<'a>(&self, instance: &'a Instance) -> Result<RecordMut<'a>, MappingError> {
        let ops = self.ops()?;
        self.check_instance(ops, instance)?;

        ops.borrow_mut(instance)
    }

    fn check_instance(&self, ops: InstanceOps, instance: &Instance) -> Result<(), MappingError> {
        if ops.matches(instance) {
            Ok(())
        } else {
            Err(DecodeError::InstanceMismatch {
                expected: ops.type_name(),
                type_name: self.type_name.clone(),
            }
            .into())
        }
    }

    /// Read one property of an instance.
    pub fn read_property(
        &self,
        instance: &Instance,
        name: &str,
    ) -> Result<PropertyValue, MappingError> {
        let property = self.property_by_name(name)?;
        let record = self.borrow(instance)?;

        property.read(&*record)
    }

    /// Read a stored (non-reference) value of an instance.
    pub fn read_value(&self, instance: &Instance, name: &str) -> Result<Value, MappingError> {
        match self.read_property(instance, name)? {
            PropertyValue::Value(value) => Ok(value),
            PropertyValue::Reference(_) => Err(MappingError::configuration(format!(
                "property '{name}' of {} is a reference, not a value",
                self.type_name
            ))),
        }
    }

    /// Identity of an instance; `None` while the identity is unset.
    pub fn read_id(&self, instance: &Instance) -> Result<Option<DocId>, MappingError> {
        let property = self.id_property()?;
        let value = self.read_value(instance, property.name())?;
        if value.is_null() {
            return Ok(None);
        }

        DocId::from_value(&value)
            .map(Some)
            .map_err(|source| {
                DecodeError::Property {
                    property: property.name().to_string(),
                    source,
                }
                .into()
            })
    }
}

impl fmt::Debug for EntityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityModel")
            .field("type_name", &self.type_name)
            .field("collection", &self.collection_name)
            .field(
                "properties",
                &self
                    .properties
                    .iter()
                    .map(PropertyModel::name)
                    .collect::<Vec<_>>(),
            )
            .field("classes", &self.classes)
            .finish_non_exhaustive()
    }
}
