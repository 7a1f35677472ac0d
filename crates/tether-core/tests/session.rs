mod common;

use common::{Account, Admin, Author, Book, doc, library, session, session_with};
use serde_json::json;
use std::{cell::RefCell, rc::Rc};
use tether_core::{
    db::MemoryStore,
    error::{DecodeError, ErrorClass, ErrorDetail},
    model::downcast_entity,
    obs::{MappingEvent, MetricsSink},
    prelude::*,
};

#[test]
fn eager_cycle_between_collections_shares_instances() {
    let store = library();
    let session = session(&store);

    let author = session.get::<Author>(1).expect("load").expect("author 1");
    let books = author.borrow().books.get().expect("eager list");

    assert_eq!(books.len(), 2);
    for book in &books {
        let back = book
            .borrow()
            .author
            .get()
            .expect("eager single")
            .expect("author present");
        assert!(Rc::ptr_eq(&author, &back));
    }
    assert_eq!(books[0].borrow().title, "The Dispossessed");
}

#[test]
fn held_cache_keeps_identity_across_queries() {
    let store = library();
    let session = session(&store);
    let cache = session.cache();

    let book = session.get::<Book>(12).expect("load").expect("book 12");
    let author = session.get::<Author>(2).expect("load").expect("author 2");
    let via_book = book.borrow().author.get().expect("resolve").expect("present");

    assert!(cache.is_owner());
    assert!(Rc::ptr_eq(&author, &via_book));
    assert_eq!(
        store.stats().find_by_ids_calls,
        1,
        "the author query is answered from the held cache"
    );
}

#[test]
fn separate_queries_without_a_held_cache_decode_separately() {
    let store = library();
    let session = session(&store);

    let first = session.get::<Author>(2).expect("load").expect("author");
    let second = session.get::<Author>(2).expect("load").expect("author");

    assert!(!Rc::ptr_eq(&first, &second));
}

#[test]
fn find_by_filter_yields_matching_records() {
    let store = library();
    let session = session(&store);

    let filter = doc(json!({ "author": 1 }));
    let titles: Vec<String> = session
        .find::<Book>(&filter)
        .expect("query")
        .to_list()
        .expect("decode")
        .iter()
        .map(|book| book.borrow().title.clone())
        .collect();

    assert_eq!(titles, ["The Dispossessed", "The Lathe of Heaven"]);
}

#[test]
fn drained_and_abandoned_cursors_are_closed() {
    let store = library();
    let session = session(&store);

    let mut cursor = session.find::<Author>(&Document::new()).expect("query");
    assert_eq!(store.stats().open_cursors, 1);
    for item in cursor.by_ref() {
        item.expect("decode");
    }
    assert!(cursor.is_closed());
    assert_eq!(cursor.rows(), 2);
    assert_eq!(store.stats().open_cursors, 0);

    let mut abandoned = session.find::<Book>(&Document::new()).expect("query");
    abandoned.next().expect("one item").expect("decode");
    assert_eq!(store.stats().open_cursors, 1);
    drop(abandoned);
    assert_eq!(store.stats().open_cursors, 0);
}

#[test]
fn cursor_cache_is_installed_only_while_stepping() {
    let store = library();
    let session = session(&store);

    let mut cursor = session.find::<Book>(&Document::new()).expect("query");
    assert!(!session.scope().has_active());

    let book = cursor.next().expect("item").expect("decode");
    assert!(!session.scope().has_active());

    let next = cursor.next().expect("item").expect("decode");
    let (first, second) = (
        book.borrow().author.get().expect("a").expect("present"),
        next.borrow().author.get().expect("a").expect("present"),
    );
    assert!(Rc::ptr_eq(&first, &second), "one cursor, one identity map");
    assert_eq!(cursor.cache().len(), 3);
}

#[test]
fn saved_graph_round_trips_through_the_store() {
    let store = Rc::new(MemoryStore::new());
    let session = session(&store);

    let book: Entity<Book> = Rc::default();
    book.borrow_mut().id = 20;
    book.borrow_mut().title = "Roadside Picnic".to_string();
    let author: Entity<Author> = Rc::default();
    {
        let mut author = author.borrow_mut();
        author.id = 3;
        author.name = "Strugatsky".to_string();
    }
    author.borrow_mut().books = ReferenceList::new(&[Rc::clone(&book)]);
    book.borrow_mut().author = Reference::new(&author);

    session.save(&book).expect("save book");
    session.save(&author).expect("save author");

    let stored = store.get("authors", &DocId::Int(3)).expect("author stored");
    assert_eq!(stored.get("books"), Some(&Value::List(vec![Value::Int(20)])));
    assert_eq!(stored.get("_t"), Some(&Value::from("Author")));
    assert_eq!(
        store.get("books", &DocId::Int(20)).and_then(|d| d.get("t").cloned()),
        Some(Value::from("Roadside Picnic"))
    );

    let loaded = session.get::<Author>(3).expect("load").expect("present");
    let books = loaded.borrow().books.get().expect("resolve");
    assert_eq!(books[0].borrow().title, "Roadside Picnic");
    assert!(!Rc::ptr_eq(&loaded, &author));
}

#[test]
fn save_registers_in_an_active_cache() {
    let store = Rc::new(MemoryStore::new());
    let session = session(&store);
    let _cache = session.cache();

    let book: Entity<Book> = Rc::default();
    book.borrow_mut().id = 7;
    session.save(&book).expect("save");

    let loaded = session.get::<Book>(7).expect("load").expect("present");
    assert!(Rc::ptr_eq(&book, &loaded));
}

fn accounts() -> Rc<MemoryStore> {
    let store = Rc::new(MemoryStore::new());
    for value in [
        json!({ "_id": "u1", "email": "u1@example.com", "_t": "Account" }),
        json!({ "_id": "a1", "email": "root@example.com", "level": 3, "_t": "Admin" }),
    ] {
        store.insert("accounts", doc(value)).expect("insert");
    }

    store
}

#[test]
fn discriminator_selects_the_stored_subtype() {
    let store = accounts();
    let session = session(&store);
    session.mapper().map::<Admin>().expect("admin should map");

    let instances = session
        .find_instances(Account::TYPE_NAME, &Document::new())
        .expect("query")
        .to_list()
        .expect("decode");

    assert_eq!(instances.len(), 2);
    let admin = downcast_entity::<Admin>(Rc::clone(&instances[0])).expect("admin subtype");
    let account = downcast_entity::<Account>(Rc::clone(&instances[1])).expect("plain account");
    assert_eq!(account.borrow().email, "u1@example.com");
    assert_eq!(admin.borrow().level, 3);
    assert_eq!(admin.borrow().account.id, "a1");
}

#[test]
fn typed_query_rejects_a_subtype_instance() {
    let store = accounts();
    let session = session(&store);
    session.mapper().map::<Admin>().expect("admin should map");

    let err = session
        .get::<Account>("a1")
        .expect_err("an Admin is not an Account instance");

    assert_eq!(err.class, ErrorClass::Decode);
}

#[test]
fn unknown_discriminator_fails_the_decode() {
    let store = Rc::new(MemoryStore::new());
    store
        .insert("accounts", doc(json!({ "_id": "x", "_t": "Robot" })))
        .expect("insert");
    let session = session(&store);

    let err = session.get::<Account>("x").expect_err("Robot is not registered");

    assert_eq!(err.class, ErrorClass::Decode);
    assert!(matches!(
        &err.detail,
        Some(ErrorDetail::Decode(DecodeError::UnknownDiscriminator { key, value }))
            if key == "_t" && value == "Robot"
    ));
}

#[test]
fn missing_eager_target_fails_the_query_and_closes_the_cursor() {
    let store = Rc::new(MemoryStore::new());
    let session = session(&store);
    let filter = Document::new();
    store
        .insert("books", doc(json!({ "_id": 1, "author": 99 })))
        .expect("insert");

    let err = session
        .find::<Book>(&filter)
        .expect("query")
        .to_list()
        .expect_err("eager author 99 is missing");

    assert_eq!(err.class, ErrorClass::Fetch);
    assert_eq!(store.stats().open_cursors, 0);
}

///
/// Recorder
///

#[derive(Default)]
struct Recorder {
    events: RefCell<Vec<String>>,
}

impl MetricsSink for Recorder {
    fn record(&self, event: MappingEvent<'_>) {
        let label = match event {
            MappingEvent::ModelBuilt { type_name, .. } => format!("model:{type_name}"),
            MappingEvent::CacheAcquired { .. } => "acquire".to_string(),
            MappingEvent::CacheHit { collection } => format!("hit:{collection}"),
            MappingEvent::Fetch { collection, .. } => format!("fetch:{collection}"),
            MappingEvent::Decoded { collection } => format!("decode:{collection}"),
            MappingEvent::DecodeFailed { collection } => format!("failed:{collection}"),
            MappingEvent::ReferenceResolved { shape, .. } => format!("resolved:{shape}"),
            MappingEvent::CursorClosed { rows, .. } => format!("closed:{rows}"),
        };
        self.events.borrow_mut().push(label);
    }
}

#[test]
fn session_sink_receives_mapping_events() {
    let store = library();
    let recorder = Rc::new(Recorder::default());
    let session =
        session_with(Mapper::default(), &store).metrics_sink(Rc::clone(&recorder) as Rc<dyn MetricsSink>);

    session.get::<Book>(12).expect("load").expect("book");

    let events = recorder.events.borrow();
    assert!(events.contains(&"model:Book".to_string()));
    assert!(events.contains(&"fetch:authors".to_string()));
    assert!(events.contains(&"decode:books".to_string()));
    assert!(events.contains(&"hit:books".to_string()), "author's list reaches the in-progress book");
    assert_eq!(events.last().map(String::as_str), Some("closed:1"));
}
