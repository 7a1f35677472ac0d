//! Shared fixtures for unit tests.

use crate::{
    db::{MemoryStore, Reference, ReferenceList, ReferenceMap, ReferenceSet, Session, Store},
    mapper::Mapper,
    model::{Describe, EntityMarker, Marker, PropertyDescriptor, ReferenceMarker, TypeData, TypeDescriptor},
    value::Document,
};
use std::{rc::Rc, sync::Arc};

///
/// Person
///
/// Self-referencing record covering every reference shape.
///

#[derive(Debug, Default)]
pub(crate) struct Person {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) friend: Reference<Self>,
    pub(crate) friends: ReferenceList<Self>,
    pub(crate) crew: ReferenceSet<Self>,
    pub(crate) by_name: ReferenceMap<Self>,
    pub(crate) roster: ReferenceMap<Self>,
    pub(crate) mentor: Reference<Self>,
}

impl Describe for Person {
    const TYPE_NAME: &'static str = "Person";

    fn describe() -> TypeDescriptor {
        let person = || TypeData::new(Self::TYPE_NAME);

        TypeDescriptor::record::<Self>(Self::TYPE_NAME)
            .marker(EntityMarker::default().collection("people"))
            .property(
                PropertyDescriptor::field::<Self, i64>(
                    "id",
                    TypeData::new("i64"),
                    |p| &p.id,
                    |p| &mut p.id,
                )
                .marker(Marker::Id),
            )
            .property(PropertyDescriptor::field::<Self, String>(
                "name",
                TypeData::new("String"),
                |p| &p.name,
                |p| &mut p.name,
            ))
            .property(
                PropertyDescriptor::reference::<Self, Reference<Self>>(
                    "friend",
                    person(),
                    |p| &p.friend,
                    |p| &mut p.friend,
                )
                .marker(Marker::reference()),
            )
            .property(
                PropertyDescriptor::reference::<Self, ReferenceList<Self>>(
                    "friends",
                    TypeData::list(person()),
                    |p| &p.friends,
                    |p| &mut p.friends,
                )
                .marker(Marker::lazy_reference()),
            )
            .property(
                PropertyDescriptor::reference::<Self, ReferenceSet<Self>>(
                    "crew",
                    TypeData::set(person()),
                    |p| &p.crew,
                    |p| &mut p.crew,
                )
                .marker(Marker::lazy_reference()),
            )
            .property(
                PropertyDescriptor::reference::<Self, ReferenceMap<Self>>(
                    "by_name",
                    TypeData::map(TypeData::new("String"), person()),
                    |p| &p.by_name,
                    |p| &mut p.by_name,
                )
                .marker(ReferenceMarker::default().lazy(true).map_key("name")),
            )
            .property(
                PropertyDescriptor::reference::<Self, ReferenceMap<Self>>(
                    "roster",
                    TypeData::map(TypeData::new("String"), person()),
                    |p| &p.roster,
                    |p| &mut p.roster,
                )
                .marker(Marker::lazy_reference()),
            )
            .property(
                PropertyDescriptor::reference::<Self, Reference<Self>>(
                    "mentor",
                    person(),
                    |p| &p.mentor,
                    |p| &mut p.mentor,
                )
                .marker(ReferenceMarker::default().lazy(true).ignore_missing(true)),
            )
    }
}

pub(crate) fn doc(value: serde_json::Value) -> Document {
    serde_json::from_value(value).expect("fixture document should deserialize")
}

pub(crate) fn store_with(collection: &str, docs: Vec<serde_json::Value>) -> Rc<MemoryStore> {
    let store = Rc::new(MemoryStore::new());
    for value in docs {
        store
            .insert(collection, doc(value))
            .expect("fixture insert should succeed");
    }

    store
}

pub(crate) fn session(store: &Rc<MemoryStore>) -> Session {
    let store: Rc<dyn Store> = Rc::clone(store) as Rc<dyn Store>;

    Session::new(Arc::new(Mapper::default()), store)
}
