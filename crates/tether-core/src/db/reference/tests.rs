use super::*;
use crate::{
    db::{Reference, ReferenceField, ReferenceList, ReferenceMap},
    error::ErrorClass,
    test_support::{Person, session, store_with},
};
use serde_json::json;

fn ids(people: &[crate::model::Entity<Person>]) -> Vec<i64> {
    people.iter().map(|p| p.borrow().id).collect()
}

fn crowd() -> Rc<crate::db::MemoryStore> {
    store_with(
        "people",
        vec![
            json!({ "_id": 1, "name": "ann" }),
            json!({ "_id": 2, "name": "ben" }),
            json!({ "_id": 3, "name": "cid" }),
            json!({
                "_id": 10,
                "name": "hub",
                "friends": [1, 2, 2, 3],
                "crew": [1, 2, 2, 3],
                "by_name": { "a": 1, "b": 2 },
                "mentor": 99
            }),
        ],
    )
}

#[test]
fn shape_follows_declared_collection_type() {
    let marker = ReferenceMarker::default().map_key("name");
    let person = TypeData::new("Person");

    assert_eq!(ReferenceShape::of(&person, &marker), ReferenceShape::Single);
    assert_eq!(ReferenceShape::of(&TypeData::list(person.clone()), &marker), ReferenceShape::List);
    assert_eq!(ReferenceShape::of(&TypeData::set(person.clone()), &marker), ReferenceShape::Set);
    assert_eq!(
        ReferenceShape::of(&TypeData::map(TypeData::new("String"), person), &marker),
        ReferenceShape::Map {
            key: Some("name".to_string())
        }
    );
}

#[test]
fn eager_cycle_terminates_with_shared_identity() {
    let store = store_with(
        "people",
        vec![
            json!({ "_id": 1, "name": "bob", "friend": 2 }),
            json!({ "_id": 2, "name": "alice", "friend": 1 }),
        ],
    );
    let session = session(&store);

    let bob = session
        .get::<Person>(1)
        .expect("load should succeed")
        .expect("bob should exist");
    assert!(bob.borrow().friend.is_resolved());

    let alice = bob
        .borrow()
        .friend
        .get()
        .expect("friend should resolve")
        .expect("alice should exist");
    let back = alice
        .borrow()
        .friend
        .get()
        .expect("friend should resolve")
        .expect("bob should exist");

    assert_eq!(alice.borrow().name, "alice");
    assert!(Rc::ptr_eq(&bob, &back));
    assert_eq!(store.stats().find_by_ids_calls, 1);
}

#[test]
fn lazy_cycle_keeps_identity_without_a_held_cache() {
    let store = store_with(
        "people",
        vec![
            json!({ "_id": 1, "name": "bob", "mentor": 2 }),
            json!({ "_id": 2, "name": "alice", "mentor": 1 }),
        ],
    );
    let session = session(&store);

    let bob = session.get::<Person>(1).expect("load").expect("bob");
    assert!(!bob.borrow().mentor.is_resolved());
    assert!(!session.scope().has_active());

    let alice = bob
        .borrow()
        .mentor
        .get()
        .expect("mentor should resolve")
        .expect("alice should exist");
    let back = alice
        .borrow()
        .mentor
        .get()
        .expect("mentor should resolve")
        .expect("bob should exist");

    assert_eq!(alice.borrow().name, "alice");
    assert!(Rc::ptr_eq(&bob, &back));
    assert_eq!(store.stats().find_by_ids_calls, 1);
}

#[test]
fn list_keeps_duplicates_and_set_collapses_them() {
    let store = crowd();
    let session = session(&store);
    let _cache = session.cache();

    let hub = session.get::<Person>(10).expect("load").expect("hub");
    let friends = hub.borrow().friends.get().expect("list should resolve");
    let crew = hub.borrow().crew.get().expect("set should resolve");

    assert_eq!(ids(&friends), vec![1, 2, 2, 3]);
    assert!(Rc::ptr_eq(&friends[1], &friends[2]));
    assert_eq!(ids(&crew), vec![1, 2, 3]);
    assert!(crew.contains(&friends[0]));
    assert_eq!(store.stats().find_by_ids_calls, 1, "set resolution reuses cached targets");
}

#[test]
fn repeat_access_does_not_fetch_again() {
    let store = crowd();
    let session = session(&store);
    let hub = session.get::<Person>(10).expect("load").expect("hub");
    assert!(!hub.borrow().friends.is_resolved());

    let first = hub.borrow().friends.get().expect("first access");
    let second = hub.borrow().friends.get().expect("second access");

    assert!(hub.borrow().friends.is_resolved());
    assert!(Rc::ptr_eq(&first[0], &second[0]));
    assert_eq!(store.stats().find_by_ids_calls, 1);
}

#[test]
fn map_is_keyed_by_the_declared_property() {
    let store = crowd();
    let session = session(&store);
    let hub = session.get::<Person>(10).expect("load").expect("hub");

    let by_name = hub.borrow().by_name.get().expect("map should resolve");

    assert_eq!(by_name.keys().collect::<Vec<_>>(), vec!["ann", "ben"]);
    assert_eq!(by_name["ben"].borrow().id, 2);
}

#[test]
fn unkeyed_map_keeps_its_stored_keys_through_save_and_load() {
    let store = crowd();
    let session = session(&store);
    let ann = session.get::<Person>(1).expect("load").expect("ann");
    let ben = session.get::<Person>(2).expect("load").expect("ben");

    let boat: crate::model::Entity<Person> = Rc::default();
    boat.borrow_mut().id = 20;
    boat.borrow_mut().roster = ReferenceMap::new([("captain", ann), ("mate", ben)]);
    session.save(&boat).expect("save should succeed");

    let stored = store.get("people", &DocId::Int(20)).expect("boat stored");
    assert_eq!(
        stored.get("roster"),
        Some(&Value::Document(Document::from_iter([
            ("captain", Value::Int(1)),
            ("mate", Value::Int(2)),
        ])))
    );

    let loaded = session.get::<Person>(20).expect("load").expect("boat");
    let roster = loaded.borrow().roster.get().expect("map should resolve");

    assert_eq!(roster.keys().collect::<Vec<_>>(), vec!["captain", "mate"]);
    assert_eq!(roster["captain"].borrow().name, "ann");
    assert_eq!(roster["mate"].borrow().id, 2);
}

#[test]
fn missing_target_is_skipped_only_when_ignored() {
    let store = store_with(
        "people",
        vec![
            json!({ "_id": 1, "name": "ann" }),
            json!({ "_id": 10, "name": "hub", "friends": [1, 99], "mentor": 99 }),
        ],
    );
    let session = session(&store);
    let hub = session.get::<Person>(10).expect("load").expect("hub");

    assert!(hub.borrow().mentor.get().expect("ignored miss").is_none());

    let err = hub
        .borrow()
        .friends
        .get()
        .expect_err("unignored miss should fail");
    assert_eq!(err.class, ErrorClass::Fetch);
    assert!(matches!(
        err.store_detail(),
        Some(StoreError::MissingReference { id: DocId::Int(99), .. })
    ));
}

#[test]
fn fetch_failure_leaves_the_reference_unresolved() {
    let store = crowd();
    let session = session(&store);
    let hub = session.get::<Person>(10).expect("load").expect("hub");

    store.fail_next_fetch("connection reset");
    let err = hub.borrow().friends.get().expect_err("fetch should fail");
    assert_eq!(err.class, ErrorClass::Fetch);
    assert!(!hub.borrow().friends.is_resolved());

    assert_eq!(hub.borrow().friends.get().expect("retry").len(), 4);
}

#[test]
fn lazy_reference_outlives_the_cursor() {
    let store = crowd();
    let session = session(&store);
    let hub = session.get::<Person>(10).expect("load").expect("hub");
    assert!(!session.scope().has_active());

    let friends = hub.borrow().friends.get().expect("resolves through the decoding cache");

    assert_eq!(friends.len(), 4);
    assert!(!session.scope().has_active(), "the decoding cache is joined, not installed");
}

#[test]
fn resolved_reference_never_fetches() {
    let ann: crate::model::Entity<Person> = Rc::default();
    ann.borrow_mut().id = 1;

    let reference = Reference::new(&ann);
    let got = reference.get().expect("resolved").expect("present");

    assert!(reference.is_resolved());
    assert!(reference.id().is_none());
    assert!(Rc::ptr_eq(&ann, &got));
}

#[test]
fn views_reject_a_core_of_another_shape() {
    let err = ReferenceList::<Person>::from_lazy(LazyReference::empty(ReferenceShape::Single))
        .expect_err("single core cannot populate a list");

    assert_eq!(err.class, ErrorClass::Configuration);
}
