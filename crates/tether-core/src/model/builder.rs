//! Module: model::builder
//! Responsibility: staging an entity model from a type descriptor.
//! Does not own: property discovery or defaults (conventions run in `build`).
//!
//! Construction walks the descriptor hierarchy once: it resolves the
//! superclass model, collects markers (first occurrence of a kind wins),
//! records the generic parameterization of every ancestor and propagates it
//! down to concrete types. Conventions then shape properties before `build`
//! validates and freezes the result.

use crate::{
    error::{MappingError, ModelError},
    mapper::Mapper,
    model::{
        Accessor, EntityModel, GenericType, Marker, MarkerKind, Markers, Projection,
        PropertyModelBuilder, TypeBindings, TypeData, TypeDescriptor, entity::EntityModelParts,
    },
};
use std::{collections::HashSet, fmt, sync::Arc};

///
/// HierarchyLevel
///
/// One type in the ancestor chain (the modelled type first), with the
/// projections that reach it from the modelled type.
///

#[derive(Clone)]
pub struct HierarchyLevel {
    descriptor: Arc<TypeDescriptor>,
    projections: Vec<Arc<dyn Projection>>,
}

impl HierarchyLevel {
    #[must_use]
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Number of superclass steps between the modelled type and this level.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.projections.len()
    }

    /// Rebase an accessor declared at this level onto the modelled type.
    #[must_use]
    pub fn lift(&self, accessor: &Accessor) -> Accessor {
        self.projections
            .iter()
            .rev()
            .fold(accessor.clone(), |lifted, projection| projection.lift(&lifted))
    }
}

impl fmt::Debug for HierarchyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HierarchyLevel")
            .field("name", &self.name())
            .field("depth", &self.depth())
            .finish()
    }
}

///
/// EntityModelBuilder
///

pub struct EntityModelBuilder<'m> {
    mapper: &'m Mapper,
    descriptor: Arc<TypeDescriptor>,
    levels: Vec<HierarchyLevel>,
    parameterization: Vec<(String, TypeBindings)>,
    superclass: Option<Arc<EntityModel>>,
    interfaces: Vec<Arc<EntityModel>>,
    interface_names: Vec<String>,
    classes: Vec<String>,
    markers: Markers,
    properties: Vec<PropertyModelBuilder>,
    target_type: String,
    discriminator_enabled: bool,
    discriminator_key: Option<String>,
    discriminator: Option<String>,
    id_property_name: Option<String>,
    version_property_name: Option<String>,
    collection_name: Option<String>,
}

impl<'m> EntityModelBuilder<'m> {
    pub fn new(mapper: &'m Mapper, type_name: &str) -> Result<Self, MappingError> {
        let descriptor = mapper.descriptor(type_name)?;

        // Phase 1: immediate superclass model, when mappable.
        let superclass = match descriptor.superclass() {
            Some(superclass) => {
                mapper.register_if_absent(superclass.descriptor());
                tolerate_unmappable(mapper.entity_model(superclass.name()))?
            }
            None => None,
        };

        let mut builder = Self {
            mapper,
            target_type: descriptor.name().to_string(),
            levels: hierarchy_levels(&descriptor)?,
            descriptor,
            parameterization: Vec::new(),
            superclass,
            interfaces: Vec::new(),
            interface_names: Vec::new(),
            classes: Vec::new(),
            markers: Markers::new(),
            properties: Vec::new(),
            discriminator_enabled: false,
            discriminator_key: None,
            discriminator: None,
            id_property_name: None,
            version_property_name: None,
            collection_name: None,
        };

        // Phase 2: markers and interfaces across the hierarchy.
        let interface_descriptors = builder.collect_hierarchy();

        // Phase 3: generic bindings, root first, then propagated downward.
        builder.parameterization = find_parameterization(&builder.levels);
        propagate_types(&mut builder.parameterization);

        // Phase 4: interface models, when mappable.
        for interface in interface_descriptors {
            let name = interface.name().to_string();
            mapper.register_if_absent(interface);
            if let Some(model) = tolerate_unmappable(mapper.entity_model(&name))? {
                builder.interfaces.push(model);
            }
        }

        Ok(builder)
    }

    fn collect_hierarchy(&mut self) -> Vec<TypeDescriptor> {
        let levels = self.levels.clone();
        let mut interfaces = Vec::new();

        let Some((own, ancestors)) = levels.split_first() else {
            return interfaces;
        };

        self.add_markers(own.descriptor().markers());
        self.collect_interfaces(own.descriptor(), &mut interfaces);
        for level in ancestors {
            self.classes.push(level.name().to_string());
            self.add_markers(level.descriptor().markers());
        }
        for level in ancestors {
            self.collect_interfaces(level.descriptor(), &mut interfaces);
        }

        interfaces
    }

    fn collect_interfaces(&mut self, descriptor: &TypeDescriptor, out: &mut Vec<TypeDescriptor>) {
        for interface in descriptor.interfaces() {
            if self.interface_names.iter().any(|name| name == interface.name()) {
                continue;
            }
            self.interface_names.push(interface.name().to_string());

            let interface = interface.descriptor();
            self.add_markers(interface.markers());
            self.collect_interfaces(&interface, out);
            out.push(interface);
        }
    }

    fn add_markers(&mut self, markers: &[Marker]) {
        for marker in markers {
            self.markers.insert_if_absent(marker.clone());
        }
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Append a property and return it for further configuration.
    pub fn add_property(&mut self, property: PropertyModelBuilder) -> &mut PropertyModelBuilder {
        let index = self.properties.len();
        self.properties.push(property);

        &mut self.properties[index]
    }

    pub fn property_model_by_name(&self, name: &str) -> Result<&PropertyModelBuilder, MappingError> {
        self.properties
            .iter()
            .find(|property| property.name() == name)
            .ok_or_else(|| self.no_such_property(name))
    }

    pub fn property_model_by_name_mut(
        &mut self,
        name: &str,
    ) -> Result<&mut PropertyModelBuilder, MappingError> {
        match self.properties.iter().position(|property| property.name() == name) {
            Some(index) => Ok(&mut self.properties[index]),
            None => Err(self.no_such_property(name)),
        }
    }

    fn no_such_property(&self, name: &str) -> MappingError {
        ModelError::NoSuchProperty {
            name: name.to_string(),
            valid: self
                .properties
                .iter()
                .map(|property| property.name().to_string())
                .collect(),
        }
        .into()
    }

    #[must_use]
    pub fn property_models(&self) -> &[PropertyModelBuilder] {
        &self.properties
    }

    pub fn property_models_mut(&mut self) -> &mut [PropertyModelBuilder] {
        &mut self.properties
    }

    /// Type of a property declared on `declaring_type`, with the declaring
    /// type's variables resolved through the propagated bindings.
    #[must_use]
    pub fn get_type_data(
        &self,
        declaring_type: &str,
        suggested: &TypeData,
        generic: &GenericType,
    ) -> TypeData {
        if let Some(data) = generic.to_type_data() {
            return data;
        }

        self.parameterization
            .iter()
            .find(|(name, _)| name == declaring_type)
            .and_then(|(_, bindings)| generic.substitute(bindings).to_type_data())
            .unwrap_or_else(|| suggested.clone())
    }

    // ------------------------------------------------------------------
    // Markers
    // ------------------------------------------------------------------

    /// Add a marker unless one of the same kind is already present.
    pub fn annotation(&mut self, marker: Marker) -> &mut Self {
        self.markers.insert_if_absent(marker);
        self
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
    pub const fn markers(&self) -> &Markers {
        &self.markers
    }

    // ------------------------------------------------------------------
    // Discriminator
    // ------------------------------------------------------------------

    pub fn enable_discriminator(&mut self, enabled: bool) -> &mut Self {
        self.discriminator_enabled = enabled;
        self
    }

    #[must_use]
    pub const fn is_discriminator_enabled(&self) -> bool {
        self.discriminator_enabled
    }

    #[must_use]
    pub fn discriminator(&self) -> Option<&str> {
        self.discriminator.as_deref()
    }

    pub fn set_discriminator(&mut self, value: impl Into<String>) -> &mut Self {
        self.discriminator = Some(value.into());
        self
    }

    #[must_use]
    pub fn discriminator_key(&self) -> Option<&str> {
        self.discriminator_key.as_deref()
    }

    pub fn set_discriminator_key(&mut self, key: impl Into<String>) -> &mut Self {
        self.discriminator_key = Some(key.into());
        self
    }

    // ------------------------------------------------------------------
    // Identity and version
    // ------------------------------------------------------------------

    #[must_use]
    pub fn id_property_name(&self) -> Option<&str> {
        self.id_property_name.as_deref()
    }

    pub fn set_id_property_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.id_property_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn version_property_name(&self) -> Option<&str> {
        self.version_property_name.as_deref()
    }

    pub fn set_version_property_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.version_property_name = Some(name.into());
        self
    }

    // ------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.descriptor.name()
    }

    #[must_use]
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Ancestor type names, nearest first.
    #[must_use]
    pub fn class_hierarchy(&self) -> &[String] {
        &self.classes
    }

    /// The modelled type followed by its ancestors.
    #[must_use]
    pub fn levels(&self) -> &[HierarchyLevel] {
        &self.levels
    }

    /// Per-ancestor bindings, root first.
    #[must_use]
    pub fn parameterization(&self) -> &[(String, TypeBindings)] {
        &self.parameterization
    }

    #[must_use]
    pub fn interfaces(&self) -> &[Arc<EntityModel>] {
        &self.interfaces
    }

    /// Every implemented interface, mapped or not.
    #[must_use]
    pub fn interface_names(&self) -> &[String] {
        &self.interface_names
    }

    #[must_use]
    pub const fn superclass(&self) -> Option<&Arc<EntityModel>> {
        self.superclass.as_ref()
    }

    #[must_use]
    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    pub fn set_target_type(&mut self, type_name: impl Into<String>) -> &mut Self {
        self.target_type = type_name.into();
        self
    }

    #[must_use]
    pub fn collection_name(&self) -> Option<&str> {
        self.collection_name.as_deref()
    }

    pub fn set_collection_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.collection_name = Some(name.into());
        self
    }

    // ------------------------------------------------------------------
    // Build
    // ------------------------------------------------------------------

    /// Run the mapper's conventions, validate, and freeze.
    pub fn build(mut self) -> Result<EntityModel, MappingError> {
        let mapper = self.mapper;
        for convention in mapper.conventions() {
            convention.apply(mapper, &mut self)?;
        }

        if self.discriminator_enabled {
            if self.discriminator_key.is_none() {
                return Err(ModelError::RequiredValueMissing {
                    field: "discriminatorKey",
                }
                .into());
            }
            if self.discriminator.is_none() {
                return Err(ModelError::RequiredValueMissing {
                    field: "discriminator",
                }
                .into());
            }
        }

        let id_property_name = self.single_marked(MarkerKind::Id, self.id_property_name.clone())?;
        let version_property_name =
            self.single_marked(MarkerKind::Version, self.version_property_name.clone())?;

        let ops = if self.target_type == self.descriptor.name() {
            self.descriptor.ops()
        } else {
            mapper.descriptor(&self.target_type)?.ops()
        };

        let mut seen = HashSet::new();
        let mut properties = Vec::with_capacity(self.properties.len());
        for property in self.properties {
            let property = property.build()?;
            if !seen.insert(property.mapped_name().to_string()) {
                return Err(ModelError::DuplicateMappedName {
                    type_name: self.descriptor.name().to_string(),
                    mapped_name: property.mapped_name().to_string(),
                }
                .into());
            }
            properties.push(property);
        }

        let collection_name = self
            .collection_name
            .unwrap_or_else(|| self.descriptor.simple_name().to_string());
        let discriminator = if self.discriminator_enabled {
            self.discriminator_key.zip(self.discriminator)
        } else {
            None
        };

        Ok(EntityModel::new(EntityModelParts {
            type_name: self.descriptor.name().to_string(),
            target_type: self.target_type,
            properties,
            superclass: self.superclass,
            interfaces: self.interfaces,
            classes: self.classes,
            markers: self.markers,
            id_property_name,
            version_property_name,
            discriminator,
            collection_name,
            ops,
        }))
    }

    // At most one property may carry `kind`; an explicit name must exist.
    fn single_marked(
        &self,
        kind: MarkerKind,
        explicit: Option<String>,
    ) -> Result<Option<String>, MappingError> {
        let marked: Vec<String> = self
            .properties
            .iter()
            .filter(|property| property.has_marker(&kind))
            .map(|property| property.name().to_string())
            .collect();

        if marked.len() > 1 {
            return Err(ModelError::DuplicateMarker {
                type_name: self.descriptor.name().to_string(),
                kind,
                properties: marked,
            }
            .into());
        }

        match explicit {
            Some(name) => {
                self.property_model_by_name(&name)?;
                Ok(Some(name))
            }
            None => Ok(marked.into_iter().next()),
        }
    }
}

impl fmt::Debug for EntityModelBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityModelBuilder")
            .field("type_name", &self.type_name())
            .field("classes", &self.classes)
            .field("interfaces", &self.interface_names)
            .field("properties", &self.properties.len())
            .finish_non_exhaustive()
    }
}

fn tolerate_unmappable(
    result: Result<Arc<EntityModel>, MappingError>,
) -> Result<Option<Arc<EntityModel>>, MappingError> {
    match result {
        Ok(model) => Ok(Some(model)),
        Err(err) if err.is_not_mappable() => Ok(None),
        Err(err) => Err(err),
    }
}

fn hierarchy_levels(descriptor: &Arc<TypeDescriptor>) -> Result<Vec<HierarchyLevel>, MappingError> {
    let mut levels = vec![HierarchyLevel {
        descriptor: Arc::clone(descriptor),
        projections: Vec::new(),
    }];

    loop {
        let Some(current) = levels.last() else { break };
        let Some(superclass) = current.descriptor.superclass() else {
            break;
        };
        if levels.iter().any(|level| level.name() == superclass.name()) {
            return Err(MappingError::configuration(format!(
                "type hierarchy of {} is cyclic at {}",
                descriptor.name(),
                superclass.name()
            )));
        }

        let mut projections = current.projections.clone();
        projections.push(superclass.projection());
        let next = HierarchyLevel {
            descriptor: Arc::new(superclass.descriptor()),
            projections,
        };
        levels.push(next);
    }

    Ok(levels)
}

// For each ancestor, bind its type parameters to the arguments its direct
// subtype supplies. Returned root first.
fn find_parameterization(levels: &[HierarchyLevel]) -> Vec<(String, TypeBindings)> {
    let mut parameterization: Vec<(String, TypeBindings)> = levels
        .windows(2)
        .filter_map(|pair| {
            let (child, parent) = (&pair[0], &pair[1]);
            let superclass = child.descriptor().superclass()?;
            let bindings: TypeBindings = parent
                .descriptor()
                .type_params()
                .iter()
                .cloned()
                .zip(superclass.args().iter().cloned())
                .collect();

            Some((parent.name().to_string(), bindings))
        })
        .collect();

    parameterization.reverse();
    parameterization
}

// Substitute each level's unresolved bindings against the levels below it.
fn propagate_types(parameterization: &mut [(String, TypeBindings)]) {
    for index in 0..parameterization.len() {
        let (upper, lower) = parameterization.split_at_mut(index + 1);
        let bindings = &mut upper[index].1;

        for (_, lower_bindings) in lower.iter() {
            if bindings.values().all(GenericType::is_concrete) {
                break;
            }
            for bound in bindings.values_mut() {
                if !bound.is_concrete() {
                    *bound = bound.substitute(lower_bindings);
                }
            }
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, GenericType)]) -> TypeBindings {
        pairs
            .iter()
            .map(|(name, ty)| ((*name).to_string(), ty.clone()))
            .collect()
    }

    #[test]
    fn propagation_resolves_variables_through_lower_levels() {
        let mut chain = vec![
            ("Root".to_string(), bindings(&[("X", GenericType::var("Y"))])),
            (
                "Mid".to_string(),
                bindings(&[("Y", GenericType::apply("List", vec![GenericType::var("Z")]))]),
            ),
            ("Low".to_string(), bindings(&[("Z", GenericType::named("Order"))])),
        ];

        propagate_types(&mut chain);

        let expected = GenericType::apply("List", vec![GenericType::named("Order")]);
        assert_eq!(chain[0].1.get("X"), Some(&expected));
        assert_eq!(chain[1].1.get("Y"), Some(&expected));
    }

    #[test]
    fn propagation_leaves_unbound_variables() {
        let mut chain = vec![
            ("Root".to_string(), bindings(&[("X", GenericType::var("Y"))])),
            ("Mid".to_string(), bindings(&[])),
        ];

        propagate_types(&mut chain);

        assert_eq!(chain[0].1.get("X"), Some(&GenericType::var("Y")));
    }
}
