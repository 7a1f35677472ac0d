//! Module: db::session
//! Responsibility: one logical operation's entry point into the store.
//! Does not own: model construction (see `mapper`).

use crate::{
    db::{
        cache::{CacheKey, CacheScope, EntityCache},
        codec,
        cursor::EntityCursor,
        reference::ResolveContext,
        store::Store,
    },
    error::MappingError,
    mapper::Mapper,
    model::{Describe, Entity, EntityModel, Instance},
    obs::sink::{MetricsSink, with_metrics_sink},
    value::{DocId, Document},
};
use std::{fmt, rc::Rc, sync::Arc};

///
/// Session
///
/// Session-scoped store handle. Every session owns one cache scope: caches
/// acquired while another is active in the same session join it.
///

pub struct Session {
    context: ResolveContext,
    metrics: Option<Rc<dyn MetricsSink>>,
}

impl Session {
    #[must_use]
    pub fn new(mapper: Arc<Mapper>, store: Rc<dyn Store>) -> Self {
        Self {
            context: ResolveContext::new(mapper, store, CacheScope::new()),
            metrics: None,
        }
    }

    /// Route this session's mapping events to `sink` instead of the
    /// default counters.
    #[must_use]
    pub fn metrics_sink(mut self, sink: Rc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    fn with_metrics<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.metrics {
            Some(sink) => with_metrics_sink(Rc::clone(sink), f),
            None => f(),
        }
    }

    #[must_use]
    pub const fn mapper(&self) -> &Arc<Mapper> {
        self.context.mapper()
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.context.store()
    }

    #[must_use]
    pub const fn scope(&self) -> &Rc<CacheScope> {
        self.context.scope()
    }

    /// Acquire the session cache. Holding the returned handle keeps every
    /// query and resolution in this session on one identity map.
    #[must_use]
    pub fn cache(&self) -> EntityCache {
        self.context.scope().acquire()
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Query `T`'s collection.
    pub fn find<T: Describe>(
        &self,
        filter: &Document,
    ) -> Result<EntityCursor<Entity<T>>, MappingError> {
        let model = self.with_metrics(|| self.context.mapper().map::<T>())?;

        self.open(model, filter)
    }

    /// Query a registered type's collection without a static type. Items are
    /// decoded into whichever subtype their discriminator names.
    pub fn find_instances(
        &self,
        type_name: &str,
        filter: &Document,
    ) -> Result<EntityCursor<Instance>, MappingError> {
        let model = self.with_metrics(|| self.context.mapper().entity_model(type_name))?;

        self.open(model, filter)
    }

    /// Load one `T` by identifier.
    pub fn get<T: Describe>(
        &self,
        id: impl Into<DocId>,
    ) -> Result<Option<Entity<T>>, MappingError> {
        let id: DocId = id.into();
        let model = self.with_metrics(|| self.context.mapper().map::<T>())?;
        let key = model.id_property()?.mapped_name().to_string();
        let filter = Document::from_iter([(key, id.to_value())]);

        self.open(model, &filter)?.first()
    }

    fn open<E>(
        &self,
        model: Arc<EntityModel>,
        filter: &Document,
    ) -> Result<EntityCursor<E>, MappingError> {
        let documents = self
            .context
            .store()
            .find(model.collection_name(), filter)?;
        let cache = self.context.scope().acquire();

        Ok(EntityCursor::new(self.context.clone(), model, documents, cache)
            .with_metrics(self.metrics.clone()))
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Encode and store `entity`. While a session cache is active the saved
    /// instance is registered in it under its identifier.
    pub fn save<T: Describe>(&self, entity: &Entity<T>) -> Result<(), MappingError> {
        self.with_metrics(|| {
            let mapper = self.context.mapper();
            let model = mapper.map::<T>()?;
            let instance: Instance = Rc::clone(entity) as Instance;

            let document = codec::encode(mapper, &model, &instance)?;
            let id = codec::document_id(&model, &document)?;
            self.context.store().save(model.collection_name(), document)?;

            if self.context.scope().has_active() {
                let cache = self.context.scope().acquire();
                let key = CacheKey::new(model.collection_name(), id);
                cache.register(key.clone(), instance);
                cache.mark_loaded(&key);
            }

            Ok(())
        })
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("context", &self.context)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}
