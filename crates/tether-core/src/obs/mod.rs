//! Observability: mapping telemetry and the sink boundary.
//!
//! Mapping and resolution code never touches counters directly; every
//! event flows through `sink::record`.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{CollectionCounters, EventOps, EventReport};
pub use sink::{MappingEvent, MetricsSink, metrics_report, metrics_reset_all, with_metrics_sink};
