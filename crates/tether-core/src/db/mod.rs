//! Store-facing runtime: per-operation caches, references, the codec, cursors
//! and sessions.

pub mod cache;
pub mod codec;
pub mod cursor;
pub mod reference;
pub mod session;
pub mod store;

// re-exports
pub use cache::{CacheKey, CacheScope, EntityCache, LoadState};
pub use cursor::{EntityCursor, FromInstance};
pub use reference::{
    EntitySet, LazyReference, Reference, ReferenceField, ReferenceList, ReferenceMap,
    ReferenceSet, ReferenceShape, ResolveContext, Resolved,
};
pub use session::Session;
pub use store::{DocumentCursor, MemoryCursor, MemoryStore, Store, StoreStats};
