//! Metrics sink boundary.
//!
//! Mapping code MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MappingEvent and MetricsSink.

use crate::obs::metrics::{self, EventReport};
use std::{cell::RefCell, rc::Rc};
use tracing::{debug, trace};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = RefCell::new(None);
}

///
/// MappingEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MappingEvent<'a> {
    ModelBuilt {
        type_name: &'a str,
        properties: u64,
    },
    CacheAcquired {
        owner: bool,
    },
    CacheHit {
        collection: &'a str,
    },
    Fetch {
        collection: &'a str,
        requested: u64,
        returned: u64,
    },
    Decoded {
        collection: &'a str,
    },
    DecodeFailed {
        collection: &'a str,
    },
    ReferenceResolved {
        collection: &'a str,
        shape: &'static str,
        elements: u64,
    },
    CursorClosed {
        collection: &'a str,
        rows: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MappingEvent<'_>);
}

/// GlobalMetricsSink
/// Default sink: emits a `tracing` event and bumps the process-local
/// counters. Used whenever no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MappingEvent<'_>) {
        match event {
            MappingEvent::ModelBuilt {
                type_name,
                properties,
            } => {
                debug!(target: "tether::model", type_name, properties, "entity model built");
                metrics::with_state_mut(|m| {
                    m.ops.models_built = m.ops.models_built.saturating_add(1);
                });
            }

            MappingEvent::CacheAcquired { owner } => {
                trace!(target: "tether::cache", owner, "entity cache acquired");
                metrics::with_state_mut(|m| {
                    if owner {
                        m.ops.cache_owned = m.ops.cache_owned.saturating_add(1);
                    } else {
                        m.ops.cache_joined = m.ops.cache_joined.saturating_add(1);
                    }
                });
            }

            MappingEvent::CacheHit { collection } => {
                trace!(target: "tether::cache", collection, "entity cache hit");
                metrics::with_state_mut(|m| {
                    m.ops.cache_hits = m.ops.cache_hits.saturating_add(1);
                    let entry = metrics::collection(m, collection);
                    entry.cache_hits = entry.cache_hits.saturating_add(1);
                });
            }

            MappingEvent::Fetch {
                collection,
                requested,
                returned,
            } => {
                debug!(target: "tether::store", collection, requested, returned, "batch fetch");
                metrics::with_state_mut(|m| {
                    m.ops.fetch_calls = m.ops.fetch_calls.saturating_add(1);
                    m.ops.docs_requested = m.ops.docs_requested.saturating_add(requested);
                    m.ops.docs_fetched = m.ops.docs_fetched.saturating_add(returned);
                    let entry = metrics::collection(m, collection);
                    entry.fetch_calls = entry.fetch_calls.saturating_add(1);
                    entry.docs_fetched = entry.docs_fetched.saturating_add(returned);
                });
            }

            MappingEvent::Decoded { collection } => {
                trace!(target: "tether::codec", collection, "document decoded");
                metrics::with_state_mut(|m| {
                    m.ops.decodes = m.ops.decodes.saturating_add(1);
                    let entry = metrics::collection(m, collection);
                    entry.decodes = entry.decodes.saturating_add(1);
                });
            }

            MappingEvent::DecodeFailed { collection } => {
                debug!(target: "tether::codec", collection, "decode failed, cache entry evicted");
                metrics::with_state_mut(|m| {
                    m.ops.decode_failures = m.ops.decode_failures.saturating_add(1);
                });
            }

            MappingEvent::ReferenceResolved {
                collection,
                shape,
                elements,
            } => {
                trace!(target: "tether::reference", collection, shape, elements, "reference resolved");
                metrics::with_state_mut(|m| {
                    m.ops.references_resolved = m.ops.references_resolved.saturating_add(1);
                    let entry = metrics::collection(m, collection);
                    entry.references_resolved = entry.references_resolved.saturating_add(1);
                });
            }

            MappingEvent::CursorClosed { collection, rows } => {
                debug!(target: "tether::cursor", collection, rows, "cursor closed");
                metrics::with_state_mut(|m| {
                    m.ops.cursors_closed = m.ops.cursors_closed.saturating_add(1);
                    m.ops.rows_loaded = m.ops.rows_loaded.saturating_add(rows);
                });
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MappingEvent<'_>) {
    let override_sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match override_sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current metrics state for test and diagnostic plumbing.
#[must_use]
pub fn metrics_report() -> EventReport {
    metrics::report()
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let previous = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = previous;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

///
/// TESTS
///
