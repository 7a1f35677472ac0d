//! Module: db::cursor
//! Responsibility: typed iteration over query results, one decode per step.
//! Does not own: the underlying store cursor protocol (see `db::store`).

use crate::{
    db::{
        cache::EntityCache,
        codec,
        reference::ResolveContext,
        store::DocumentCursor,
    },
    error::MappingError,
    model::{Entity, EntityModel, Instance, downcast_entity},
    obs::sink::{self, MappingEvent, MetricsSink, with_metrics_sink},
};
use std::{fmt, marker::PhantomData, rc::Rc, sync::Arc};

///
/// FromInstance
///
/// Item types a cursor can yield.
///

pub trait FromInstance: Sized {
    fn from_instance(instance: Instance) -> Result<Self, MappingError>;
}

impl<T: 'static> FromInstance for Entity<T> {
    fn from_instance(instance: Instance) -> Result<Self, MappingError> {
        downcast_entity(instance)
    }
}

impl FromInstance for Instance {
    fn from_instance(instance: Instance) -> Result<Self, MappingError> {
        Ok(instance)
    }
}

///
/// EntityCursor
///
/// Owns a store cursor and the cache its items decode into. The cache is
/// installed in its scope only while a step runs, so work done between
/// steps never sees it as the active cache.
///

pub struct EntityCursor<E> {
    context: ResolveContext,
    model: Arc<EntityModel>,
    documents: Box<dyn DocumentCursor>,
    cache: EntityCache,
    metrics: Option<Rc<dyn MetricsSink>>,
    rows: u64,
    marker: PhantomData<fn() -> E>,
}

impl<E> EntityCursor<E> {
    /// Take over `cache` for the life of the traversal. The handle is closed
    /// here, so the scope no longer treats it as active.
    #[must_use]
    pub fn new(
        context: ResolveContext,
        model: Arc<EntityModel>,
        documents: Box<dyn DocumentCursor>,
        cache: EntityCache,
    ) -> Self {
        cache.close();

        Self {
            context,
            model,
            documents,
            cache,
            metrics: None,
            rows: 0,
            marker: PhantomData,
        }
    }

    #[must_use]
    pub(crate) fn with_metrics(mut self, sink: Option<Rc<dyn MetricsSink>>) -> Self {
        self.metrics = sink;
        self
    }

    #[must_use]
    pub const fn model(&self) -> &Arc<EntityModel> {
        &self.model
    }

    /// The cache items are decoded into.
    #[must_use]
    pub const fn cache(&self) -> &EntityCache {
        &self.cache
    }

    /// Rows decoded so far.
    #[must_use]
    pub const fn rows(&self) -> u64 {
        self.rows
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.documents.is_closed()
    }

    pub fn close(&mut self) {
        if self.documents.is_closed() {
            return;
        }
        self.documents.close();

        let event = MappingEvent::CursorClosed {
            collection: self.model.collection_name(),
            rows: self.rows,
        };
        match &self.metrics {
            Some(metrics) => metrics.record(event),
            None => sink::record(event),
        }
    }
}

impl<E: FromInstance> EntityCursor<E> {
    /// Drain the remaining items. The store cursor is closed whether or not
    /// every item decodes.
    pub fn to_list(mut self) -> Result<Vec<E>, MappingError> {
        let items = self.by_ref().collect::<Result<Vec<_>, _>>();
        self.close();

        items
    }

    /// The next item, closing the cursor afterwards.
    pub fn first(mut self) -> Result<Option<E>, MappingError> {
        let item = self.next().transpose();
        self.close();

        item
    }

    fn step(&mut self) -> Result<Option<E>, MappingError> {
        let Some(document) = self.documents.next_document()? else {
            self.close();
            return Ok(None);
        };

        let instance = codec::decode(&self.context, &self.cache, &self.model, &document)?;
        self.rows = self.rows.saturating_add(1);

        E::from_instance(instance).map(Some)
    }
}

impl<E: FromInstance> Iterator for EntityCursor<E> {
    type Item = Result<E, MappingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.documents.is_closed() {
            return None;
        }

        let _active = self.cache.activate();
        let step = match self.metrics.clone() {
            Some(sink) => with_metrics_sink(sink, || self.step()),
            None => self.step(),
        };

        step.transpose()
    }
}

impl<E> Drop for EntityCursor<E> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<E> fmt::Debug for EntityCursor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCursor")
            .field("collection", &self.model.collection_name())
            .field("rows", &self.rows)
            .field("closed", &self.documents.is_closed())
            .finish_non_exhaustive()
    }
}
