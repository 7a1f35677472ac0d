use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::BTreeMap};

///
/// EventState
/// Ephemeral, in-memory counters for mapping and resolution work.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct EventState {
    pub ops: EventOps,
    pub collections: BTreeMap<String, CollectionCounters>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventOps {
    // Model construction
    pub models_built: u64,

    // Cache scoping
    pub cache_owned: u64,
    pub cache_joined: u64,
    pub cache_hits: u64,

    // Store access
    pub fetch_calls: u64,
    pub docs_requested: u64,
    pub docs_fetched: u64,

    // Decoding
    pub decodes: u64,
    pub decode_failures: u64,

    // References and cursors
    pub references_resolved: u64,
    pub cursors_closed: u64,
    pub rows_loaded: u64,
}

///
/// CollectionCounters
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CollectionCounters {
    pub cache_hits: u64,
    pub fetch_calls: u64,
    pub docs_fetched: u64,
    pub decodes: u64,
    pub references_resolved: u64,
}

///
/// EventReport
/// Point-in-time snapshot of the counters.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventReport {
    pub ops: EventOps,
    pub collections: BTreeMap<String, CollectionCounters>,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Per-collection counters, created on first use.
pub(crate) fn collection<'a>(state: &'a mut EventState, name: &str) -> &'a mut CollectionCounters {
    state.collections.entry(name.to_string()).or_default()
}

pub(crate) fn report() -> EventReport {
    EVENT_STATE.with(|m| {
        let state = m.borrow();
        EventReport {
            ops: state.ops.clone(),
            collections: state.collections.clone(),
        }
    })
}

/// Reset all counters (useful in tests).
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}
