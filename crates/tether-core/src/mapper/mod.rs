//! Module: mapper
//! Responsibility: process-wide registry of descriptors and built models.
//! Does not own: per-operation state (see `db::session`).

mod convention;

pub use convention::{
    ConfigureProperties, Convention, EntityDefaults, ID_KEY, PropertyDiscovery,
    ShardKeyValidation, default_conventions,
};

use crate::{
    error::{DecodeError, MappingError, ModelError},
    model::{Describe, EntityModel, EntityModelBuilder, Instance, TypeDescriptor, TypeRegistry},
    obs::sink::{self, MappingEvent},
};
use parking_lot::RwLock;
use std::{collections::HashMap, fmt, sync::Arc};
use tether_config::MapperConfig;

///
/// Mapper
///
/// Owns type descriptors, the conventions applied to them, and the models
/// built from them. Models are built on first request and cached; no lock
/// is held while a model is being built, so builds may recurse into
/// superclass and interface models.
///

pub struct Mapper {
    config: MapperConfig,
    conventions: Vec<Arc<dyn Convention>>,
    registry: RwLock<TypeRegistry>,
    models: RwLock<HashMap<String, Arc<EntityModel>>>,
    discriminators: RwLock<HashMap<String, String>>,
}

impl Mapper {
    #[must_use]
    pub fn new(config: MapperConfig) -> Self {
        Self::with_conventions(config, default_conventions())
    }

    #[must_use]
    pub fn with_conventions(config: MapperConfig, conventions: Vec<Arc<dyn Convention>>) -> Self {
        Self {
            config,
            conventions,
            registry: RwLock::new(TypeRegistry::new()),
            models: RwLock::new(HashMap::new()),
            discriminators: RwLock::new(HashMap::new()),
        }
    }

    /// Build a mapper from TOML configuration text.
    pub fn from_toml_str(source: &str) -> Result<Self, MappingError> {
        Ok(Self::new(MapperConfig::from_toml_str(source)?))
    }

    #[must_use]
    pub const fn config(&self) -> &MapperConfig {
        &self.config
    }

    #[must_use]
    pub fn conventions(&self) -> &[Arc<dyn Convention>] {
        &self.conventions
    }

    // ------------------------------------------------------------------
    // Descriptors
    // ------------------------------------------------------------------

    pub fn register(&self, descriptor: TypeDescriptor) -> Result<(), MappingError> {
        self.registry.write().register(descriptor).map(|_| ())
    }

    pub(crate) fn register_if_absent(&self, descriptor: TypeDescriptor) -> Arc<TypeDescriptor> {
        self.registry.write().register_if_absent(descriptor)
    }

    pub fn descriptor(&self, type_name: &str) -> Result<Arc<TypeDescriptor>, MappingError> {
        self.registry.read().get(type_name).ok_or_else(|| {
            ModelError::UnknownType {
                type_name: type_name.to_string(),
            }
            .into()
        })
    }

    #[must_use]
    pub fn is_registered(&self, type_name: &str) -> bool {
        self.registry.read().contains(type_name)
    }

    // ------------------------------------------------------------------
    // Models
    // ------------------------------------------------------------------

    /// Register `T` if needed and return its model.
    pub fn map<T: Describe>(&self) -> Result<Arc<EntityModel>, MappingError> {
        if !self.is_registered(T::TYPE_NAME) {
            self.register_if_absent(T::describe());
        }

        self.entity_model(T::TYPE_NAME)
    }

    /// The model of a registered type, building it on first request.
    pub fn entity_model(&self, type_name: &str) -> Result<Arc<EntityModel>, MappingError> {
        if let Some(model) = self.models.read().get(type_name) {
            return Ok(Arc::clone(model));
        }

        let builder = EntityModelBuilder::new(self, type_name)?;
        if !builder.markers().is_mappable() {
            return Err(ModelError::NotMappable {
                type_name: type_name.to_string(),
            }
            .into());
        }
        let built = Arc::new(builder.build()?);

        let model = Arc::clone(
            self.models
                .write()
                .entry(type_name.to_string())
                .or_insert(built),
        );
        if let Some(value) = model.discriminator() {
            self.discriminators
                .write()
                .entry(value.to_string())
                .or_insert_with(|| type_name.to_string());
        }

        sink::record(MappingEvent::ModelBuilt {
            type_name,
            properties: model.properties().len() as u64,
        });

        Ok(model)
    }

    /// A model already built, without building it.
    #[must_use]
    pub fn cached_model(&self, type_name: &str) -> Option<Arc<EntityModel>> {
        self.models.read().get(type_name).cloned()
    }

    /// The model whose discriminator value is `value`. Falls back to a
    /// registered type of that name, so subtypes need not be built first.
    pub fn model_for_discriminator(
        &self,
        value: &str,
    ) -> Result<Option<Arc<EntityModel>>, MappingError> {
        let indexed = self.discriminators.read().get(value).cloned();
        match indexed {
            Some(type_name) => self.entity_model(&type_name).map(Some),
            None if self.is_registered(value) => self.entity_model(value).map(Some),
            None => Ok(None),
        }
    }

    /// The model whose record type `instance` holds: `hint` when it
    /// matches, otherwise the first built model that does.
    pub fn model_for_instance(
        &self,
        hint: &Arc<EntityModel>,
        instance: &Instance,
    ) -> Result<Arc<EntityModel>, MappingError> {
        if hint.is_instance(instance) {
            return Ok(Arc::clone(hint));
        }

        self.models
            .read()
            .values()
            .find(|model| model.is_instance(instance))
            .cloned()
            .ok_or_else(|| {
                DecodeError::InstanceMismatch {
                    expected: "a mapped record",
                    type_name: hint.type_name().to_string(),
                }
                .into()
            })
    }

    /// Every model built so far, in no particular order.
    #[must_use]
    pub fn mapped_models(&self) -> Vec<Arc<EntityModel>> {
        self.models.read().values().cloned().collect()
    }
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new(MapperConfig::default())
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("config", &self.config)
            .field("conventions", &self.conventions.len())
            .field("models", &self.models.read().len())
            .finish_non_exhaustive()
    }
}
