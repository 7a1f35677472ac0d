//! Module: mapper::convention
//! Responsibility: ordered hooks that shape a model before it is frozen.
//! Does not own: validation performed by `EntityModelBuilder::build`.

use crate::{
    error::{MappingError, ModelError},
    mapper::Mapper,
    model::{EntityModelBuilder, MarkerKind, PropertyModelBuilder},
};
use std::sync::Arc;

/// Stored name of identity properties.
pub const ID_KEY: &str = "_id";

///
/// Convention
///
/// Called in registration order by `EntityModelBuilder::build`.
///

pub trait Convention: Send + Sync {
    fn apply(&self, mapper: &Mapper, builder: &mut EntityModelBuilder<'_>) -> Result<(), MappingError>;
}

/// The built-in conventions, in the order they must run.
#[must_use]
pub fn default_conventions() -> Vec<Arc<dyn Convention>> {
    vec![
        Arc::new(PropertyDiscovery),
        Arc::new(ConfigureProperties),
        Arc::new(EntityDefaults),
        Arc::new(ShardKeyValidation),
    ]
}

///
/// PropertyDiscovery
///
/// Adds every declared property of the type and its ancestors, root first.
/// A redeclaration lower in the hierarchy replaces the inherited one.
/// Transient properties are not mapped.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct PropertyDiscovery;

impl Convention for PropertyDiscovery {
    fn apply(&self, _: &Mapper, builder: &mut EntityModelBuilder<'_>) -> Result<(), MappingError> {
        let levels = builder.levels().to_vec();

        for level in levels.iter().rev() {
            for declared in level.descriptor().properties() {
                if declared
                    .markers()
                    .iter()
                    .any(|marker| marker.kind() == MarkerKind::Transient)
                {
                    continue;
                }

                let type_data = builder.get_type_data(level.name(), declared.bound(), declared.ty());
                let mut property = PropertyModelBuilder::new(declared.name());
                property
                    .set_declaring_type(level.name())
                    .set_type_data(type_data)
                    .set_accessor(level.lift(declared.accessor()));
                for marker in declared.markers() {
                    property.marker(marker.clone());
                }

                match builder.property_model_by_name_mut(declared.name()) {
                    Ok(existing) => *existing = property,
                    Err(_) => {
                        builder.add_property(property);
                    }
                }
            }
        }

        Ok(())
    }
}

///
/// ConfigureProperties
///
/// Assigns stored names and picks up identity and version properties.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigureProperties;

impl Convention for ConfigureProperties {
    fn apply(&self, mapper: &Mapper, builder: &mut EntityModelBuilder<'_>) -> Result<(), MappingError> {
        let naming = mapper.config().property_naming;
        let mut id = None;
        let mut version = None;

        for property in builder.property_models_mut() {
            let mapped = if property.has_marker(&MarkerKind::Id) {
                if id.is_none() {
                    id = Some(property.name().to_string());
                }
                ID_KEY.to_string()
            } else if let Some(name) = property.markers().mapped_name() {
                name.to_string()
            } else {
                naming.apply(property.name())
            };
            if property.has_marker(&MarkerKind::Version) && version.is_none() {
                version = Some(property.name().to_string());
            }

            property.set_mapped_name(mapped);
        }

        if builder.id_property_name().is_none()
            && let Some(id) = id
        {
            builder.set_id_property_name(id);
        }
        if builder.version_property_name().is_none()
            && let Some(version) = version
        {
            builder.set_version_property_name(version);
        }

        Ok(())
    }
}

///
/// EntityDefaults
///
/// Collection name and discriminator settings, from the `Entity` marker
/// first and the mapper configuration second. Embedded types get a
/// discriminator too, so polymorphic embedded values stay decodable.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct EntityDefaults;

impl Convention for EntityDefaults {
    fn apply(&self, mapper: &Mapper, builder: &mut EntityModelBuilder<'_>) -> Result<(), MappingError> {
        let config = mapper.config();
        let entity = builder.markers().entity().cloned();
        let type_name = builder.target_type().to_string();
        let simple_name = type_name.rsplit("::").next().unwrap_or(&type_name).to_string();

        if builder.collection_name().is_none() {
            let collection = entity
                .as_ref()
                .and_then(|marker| marker.collection.clone())
                .unwrap_or_else(|| config.collection_naming.apply(&simple_name));
            builder.set_collection_name(collection);
        }

        let use_discriminator = entity.as_ref().map_or_else(
            || builder.has_marker(&MarkerKind::Embedded),
            |marker| marker.use_discriminator,
        );
        if !use_discriminator {
            return Ok(());
        }

        builder.enable_discriminator(true);
        if builder.discriminator_key().is_none() {
            let key = entity
                .as_ref()
                .and_then(|marker| marker.discriminator_key.clone())
                .unwrap_or_else(|| config.discriminator_key.clone());
            builder.set_discriminator_key(key);
        }
        if builder.discriminator().is_none() {
            let value = entity
                .as_ref()
                .and_then(|marker| marker.discriminator.clone())
                .unwrap_or_else(|| config.discriminator.apply(&type_name, &simple_name));
            builder.set_discriminator(value);
        }

        Ok(())
    }
}

///
/// ShardKeyValidation
///

#[derive(Clone, Copy, Debug, Default)]
pub struct ShardKeyValidation;

impl Convention for ShardKeyValidation {
    fn apply(&self, _: &Mapper, builder: &mut EntityModelBuilder<'_>) -> Result<(), MappingError> {
        let Some(keys) = builder.markers().shard_keys() else {
            return Ok(());
        };

        for key in keys {
            if builder.property_model_by_name(key).is_err() {
                return Err(ModelError::UnknownShardKey {
                    type_name: builder.type_name().to_string(),
                    property: key.clone(),
                }
                .into());
            }
        }

        Ok(())
    }
}
