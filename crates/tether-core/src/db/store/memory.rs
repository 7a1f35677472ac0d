use crate::{
    db::store::{DocumentCursor, Store},
    error::{DecodeError, MappingError, StoreError},
    mapper::ID_KEY,
    value::{DocId, Document},
};
use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, HashSet, VecDeque},
    rc::Rc,
};

///
/// StoreStats
///
/// Call counters kept by `MemoryStore`.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StoreStats {
    pub find_by_ids_calls: u64,
    pub docs_fetched: u64,
    pub queries: u64,
    pub saves: u64,
    pub open_cursors: u64,
}

#[derive(Default)]
struct Counters {
    find_by_ids_calls: Cell<u64>,
    docs_fetched: Cell<u64>,
    queries: Cell<u64>,
    saves: Cell<u64>,
    open_cursors: Cell<u64>,
}

impl Counters {
    fn bump(cell: &Cell<u64>, by: u64) {
        cell.set(cell.get().saturating_add(by));
    }
}

///
/// MemoryStore
///
/// Single-threaded in-memory store. Documents are kept per collection in
/// identifier order.
///

#[derive(Default)]
pub struct MemoryStore {
    collections: RefCell<BTreeMap<String, BTreeMap<DocId, Document>>>,
    counters: Rc<Counters>,
    fail_next_fetch: RefCell<Option<String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fixture document without touching the counters.
    pub fn insert(&self, collection: &str, document: Document) -> Result<(), MappingError> {
        let id = document_id(collection, &document)?;
        self.collections
            .borrow_mut()
            .entry(collection.to_string())
            .or_default()
            .insert(id, document);

        Ok(())
    }

    #[must_use]
    pub fn get(&self, collection: &str, id: &DocId) -> Option<Document> {
        self.collections
            .borrow()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .borrow()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let c = &self.counters;

        StoreStats {
            find_by_ids_calls: c.find_by_ids_calls.get(),
            docs_fetched: c.docs_fetched.get(),
            queries: c.queries.get(),
            saves: c.saves.get(),
            open_cursors: c.open_cursors.get(),
        }
    }

    /// Make the next `find_by_ids` call fail with `message`.
    pub fn fail_next_fetch(&self, message: impl Into<String>) {
        *self.fail_next_fetch.borrow_mut() = Some(message.into());
    }
}

impl Store for MemoryStore {
    fn find_by_ids(&self, collection: &str, ids: &[DocId]) -> Result<Vec<Document>, MappingError> {
        Counters::bump(&self.counters.find_by_ids_calls, 1);
        if let Some(message) = self.fail_next_fetch.borrow_mut().take() {
            return Err(MappingError::fetch(collection, message));
        }

        let collections = self.collections.borrow();
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut seen = HashSet::new();
        let found: Vec<Document> = ids
            .iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| docs.get(id).cloned())
            .collect();
        Counters::bump(&self.counters.docs_fetched, found.len() as u64);

        Ok(found)
    }

    fn find(
        &self,
        collection: &str,
        filter: &Document,
    ) -> Result<Box<dyn DocumentCursor>, MappingError> {
        Counters::bump(&self.counters.queries, 1);

        let documents: VecDeque<Document> = self
            .collections
            .borrow()
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| doc.matches(filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Counters::bump(&self.counters.open_cursors, 1);

        Ok(Box::new(MemoryCursor {
            collection: collection.to_string(),
            documents,
            counters: Rc::clone(&self.counters),
            closed: false,
        }))
    }

    fn save(&self, collection: &str, document: Document) -> Result<(), MappingError> {
        self.insert(collection, document)?;
        Counters::bump(&self.counters.saves, 1);

        Ok(())
    }
}

fn document_id(collection: &str, document: &Document) -> Result<DocId, MappingError> {
    let value = document.get(ID_KEY).ok_or_else(|| DecodeError::MissingId {
        type_name: collection.to_string(),
        key: ID_KEY.to_string(),
    })?;

    DocId::from_value(value).map_err(|source| {
        DecodeError::Property {
            property: ID_KEY.to_string(),
            source,
        }
        .into()
    })
}

///
/// MemoryCursor
///
/// Snapshot of the matching documents taken when the query ran.
///

pub struct MemoryCursor {
    collection: String,
    documents: VecDeque<Document>,
    counters: Rc<Counters>,
    closed: bool,
}

impl DocumentCursor for MemoryCursor {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn next_document(&mut self) -> Result<Option<Document>, MappingError> {
        if self.closed {
            return Err(StoreError::Closed {
                collection: self.collection.clone(),
            }
            .into());
        }

        Ok(self.documents.pop_front())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.documents.clear();
        let open = &self.counters.open_cursors;
        open.set(open.get().saturating_sub(1));
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.close();
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorClass, value::Value};

    fn doc(id: i64, name: &str) -> Document {
        Document::from_iter([(ID_KEY, Value::Int(id)), ("name", Value::from(name))])
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
            store.insert("users", doc(id, name)).expect("fixture insert");
        }
        store
    }

    #[test]
    fn find_by_ids_skips_missing_and_duplicates() {
        let store = seeded();
        let ids = [DocId::Int(3), DocId::Int(1), DocId::Int(3), DocId::Int(9)];

        let found = store.find_by_ids("users", &ids).expect("fetch should succeed");

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].get(ID_KEY), Some(&Value::Int(3)));
        assert_eq!(store.stats().find_by_ids_calls, 1);
        assert_eq!(store.stats().docs_fetched, 2);
    }

    #[test]
    fn injected_fetch_failure_fires_once() {
        let store = seeded();
        store.fail_next_fetch("connection reset");

        let err = store
            .find_by_ids("users", &[DocId::Int(1)])
            .expect_err("first fetch should fail");
        assert_eq!(err.class, ErrorClass::Fetch);

        assert!(store.find_by_ids("users", &[DocId::Int(1)]).is_ok());
    }

    #[test]
    fn cursor_close_releases_the_open_count() {
        let store = seeded();
        let filter = Document::from_iter([("name", Value::from("b"))]);
        let mut cursor = store.find("users", &filter).expect("query");

        assert_eq!(store.stats().open_cursors, 1);
        let first = cursor.next_document().expect("next").expect("one match");
        assert_eq!(first.get(ID_KEY), Some(&Value::Int(2)));
        assert!(cursor.next_document().expect("next").is_none());

        cursor.close();
        cursor.close();
        assert_eq!(store.stats().open_cursors, 0);
        assert!(cursor.next_document().is_err());
    }

    #[test]
    fn save_requires_an_identifier() {
        let store = MemoryStore::new();
        let err = store
            .save("users", Document::from_iter([("name", Value::from("x"))]))
            .expect_err("documents without _id are rejected");

        assert_eq!(err.class, ErrorClass::Decode);
        assert!(store.is_empty("users"));
    }
}
