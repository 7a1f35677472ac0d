//! Module: model::property
//! Responsibility: per-property mapping metadata and its builder.
//! Does not own: property discovery (see `mapper::convention`).

use crate::{
    db::reference::ReferenceShape,
    error::{MappingError, ModelError},
    model::{Accessor, Marker, MarkerKind, Markers, PropertyValue, ReferenceMarker, TypeData},
};
use std::any::Any;

///
/// PropertyModel
///
/// Frozen mapping metadata for one property of an entity model.
///

#[derive(Clone, Debug)]
pub struct PropertyModel {
    name: String,
    mapped_name: String,
    declaring_type: String,
    type_data: TypeData,
    markers: Markers,
    accessor: Accessor,
    shape: Option<ReferenceShape>,
}

impl PropertyModel {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name used in stored documents.
    #[must_use]
    pub fn mapped_name(&self) -> &str {
        &self.mapped_name
    }

    /// Type that declared this property; an ancestor for inherited ones.
    #[must_use]
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    #[must_use]
    pub const fn type_data(&self) -> &TypeData {
        &self.type_data
    }

    #[must_use]
    pub const fn markers(&self) -> &Markers {
        &self.markers
    }

    #[must_use]
    pub fn has_marker(&self, kind: &MarkerKind) -> bool {
        self.markers.contains(kind)
    }

    #[must_use]
    pub const fn accessor(&self) -> &Accessor {
        &self.accessor
    }

    #[must_use]
    pub fn reference(&self) -> Option<&ReferenceMarker> {
        self.markers.reference()
    }

    #[must_use]
    pub const fn shape(&self) -> Option<&ReferenceShape> {
        self.shape.as_ref()
    }

    #[must_use]
    pub const fn is_reference(&self) -> bool {
        self.shape.is_some()
    }

    /// Type of the referenced entity: the collection element, or the
    /// property type itself for single references.
    #[must_use]
    pub fn target_type(&self) -> &TypeData {
        self.type_data.element()
    }

    pub fn read(&self, record: &dyn Any) -> Result<PropertyValue, MappingError> {
        self.accessor.read(record)
    }

    pub fn write(&self, record: &mut dyn Any, value: PropertyValue) -> Result<(), MappingError> {
        self.accessor.write(record, value)
    }
}

///
/// PropertyModelBuilder
///
/// Mutable property metadata, adjusted by conventions before the owning
/// entity model is frozen.
///

#[derive(Clone, Debug, Default)]
pub struct PropertyModelBuilder {
    name: String,
    mapped_name: Option<String>,
    declaring_type: String,
    type_data: Option<TypeData>,
    markers: Markers,
    accessor: Option<Accessor>,
}

impl PropertyModelBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    /// Stored name, falling back to the property name.
    #[must_use]
    pub fn mapped_name(&self) -> &str {
        self.mapped_name.as_deref().unwrap_or(&self.name)
    }

    pub fn set_mapped_name(&mut self, mapped_name: impl Into<String>) -> &mut Self {
        self.mapped_name = Some(mapped_name.into());
        self
    }

    #[must_use]
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn set_declaring_type(&mut self, declaring_type: impl Into<String>) -> &mut Self {
        self.declaring_type = declaring_type.into();
        self
    }

    #[must_use]
    pub const fn type_data(&self) -> Option<&TypeData> {
        self.type_data.as_ref()
    }

    pub fn set_type_data(&mut self, type_data: TypeData) -> &mut Self {
        self.type_data = Some(type_data);
        self
    }

    #[must_use]
    pub const fn markers(&self) -> &Markers {
        &self.markers
    }

    /// Add a marker unless one of the same kind is already present.
    pub fn marker(&mut self, marker: Marker) -> &mut Self {
        self.markers.insert_if_absent(marker);
        self
    }

    #[must_use]
    pub fn has_marker(&self, kind: &MarkerKind) -> bool {
        self.markers.contains(kind)
    }

    pub fn set_accessor(&mut self, accessor: Accessor) -> &mut Self {
        self.accessor = Some(accessor);
        self
    }

    #[must_use]
    pub const fn accessor(&self) -> Option<&Accessor> {
        self.accessor.as_ref()
    }

    pub fn build(self) -> Result<PropertyModel, MappingError> {
        let type_data = self.type_data.ok_or(ModelError::RequiredValueMissing {
            field: "typeData",
        })?;
        let accessor = self
            .accessor
            .ok_or(ModelError::RequiredValueMissing { field: "accessor" })?;
        let shape = self
            .markers
            .reference()
            .map(|marker| ReferenceShape::of(&type_data, marker));

        Ok(PropertyModel {
            mapped_name: self.mapped_name.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            declaring_type: self.declaring_type,
            type_data,
            markers: self.markers,
            accessor,
            shape,
        })
    }
}

///
/// TESTS
///
