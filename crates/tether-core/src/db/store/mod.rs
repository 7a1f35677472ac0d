//! Module: db::store
//! Responsibility: the store-access boundary the mapping layer reads through.
//! Does not own: wire protocols or query languages.

mod memory;

pub use memory::{MemoryCursor, MemoryStore, StoreStats};

use crate::{
    error::MappingError,
    value::{DocId, Document},
};

///
/// Store
///
/// Document store collaborator. Identifiers live under each document's
/// `_id` field.
///

pub trait Store {
    /// Fetch every stored document whose identifier is in `ids`, each at
    /// most once. Identifiers with no document are skipped.
    fn find_by_ids(&self, collection: &str, ids: &[DocId]) -> Result<Vec<Document>, MappingError>;

    /// Open a cursor over the documents matching `filter`.
    fn find(
        &self,
        collection: &str,
        filter: &Document,
    ) -> Result<Box<dyn DocumentCursor>, MappingError>;

    /// Insert or replace a document by identifier.
    fn save(&self, collection: &str, document: Document) -> Result<(), MappingError>;
}

///
/// DocumentCursor
///
/// Raw traversal over query results. `close` is idempotent.
///

pub trait DocumentCursor {
    fn collection(&self) -> &str;

    fn next_document(&mut self) -> Result<Option<Document>, MappingError>;

    fn close(&mut self);

    fn is_closed(&self) -> bool;
}
