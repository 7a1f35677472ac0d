#![allow(dead_code)]

use serde_json::json;
use std::{rc::Rc, sync::Arc};
use tether_core::{
    db::{MemoryStore, Store},
    prelude::*,
};

///
/// Author
///

#[derive(Debug, Default)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub books: ReferenceList<Book>,
}

impl Describe for Author {
    const TYPE_NAME: &'static str = "Author";

    fn describe() -> TypeDescriptor {
        TypeDescriptor::record::<Self>(Self::TYPE_NAME)
            .marker(EntityMarker::default().collection("authors"))
            .property(
                PropertyDescriptor::field::<Self, i64>("id", TypeData::new("i64"), |a| &a.id, |a| {
                    &mut a.id
                })
                .marker(Marker::Id),
            )
            .property(PropertyDescriptor::field::<Self, String>(
                "name",
                TypeData::new("String"),
                |a| &a.name,
                |a| &mut a.name,
            ))
            .property(
                PropertyDescriptor::reference::<Self, ReferenceList<Book>>(
                    "books",
                    TypeData::list(TypeData::new(Book::TYPE_NAME)),
                    |a| &a.books,
                    |a| &mut a.books,
                )
                .marker(Marker::reference()),
            )
    }
}

///
/// Book
///

#[derive(Debug, Default)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: Reference<Author>,
}

impl Describe for Book {
    const TYPE_NAME: &'static str = "Book";

    fn describe() -> TypeDescriptor {
        TypeDescriptor::record::<Self>(Self::TYPE_NAME)
            .marker(EntityMarker::default().collection("books"))
            .property(
                PropertyDescriptor::field::<Self, i64>("id", TypeData::new("i64"), |b| &b.id, |b| {
                    &mut b.id
                })
                .marker(Marker::Id),
            )
            .property(
                PropertyDescriptor::field::<Self, String>(
                    "title",
                    TypeData::new("String"),
                    |b| &b.title,
                    |b| &mut b.title,
                )
                .marker(Marker::property("t")),
            )
            .property(
                PropertyDescriptor::reference::<Self, Reference<Author>>(
                    "author",
                    TypeData::new(Author::TYPE_NAME),
                    |b| &b.author,
                    |b| &mut b.author,
                )
                .marker(Marker::reference()),
            )
    }
}

///
/// Account
///

#[derive(Debug, Default)]
pub struct Account {
    pub id: String,
    pub email: String,
}

impl Describe for Account {
    const TYPE_NAME: &'static str = "Account";

    fn describe() -> TypeDescriptor {
        TypeDescriptor::record::<Self>(Self::TYPE_NAME)
            .marker(EntityMarker::default().collection("accounts"))
            .property(
                PropertyDescriptor::field::<Self, String>(
                    "id",
                    TypeData::new("String"),
                    |a| &a.id,
                    |a| &mut a.id,
                )
                .marker(Marker::Id),
            )
            .property(PropertyDescriptor::field::<Self, String>(
                "email",
                TypeData::new("String"),
                |a| &a.email,
                |a| &mut a.email,
            ))
    }
}

///
/// Admin
///
/// Account subtype stored in the same collection.
///

#[derive(Debug, Default)]
pub struct Admin {
    pub account: Account,
    pub level: i64,
}

impl Describe for Admin {
    const TYPE_NAME: &'static str = "Admin";

    fn describe() -> TypeDescriptor {
        TypeDescriptor::record::<Self>(Self::TYPE_NAME)
            .extends(Superclass::new::<Self, Account>(
                Vec::new(),
                |a| &a.account,
                |a| &mut a.account,
            ))
            .property(PropertyDescriptor::field::<Self, i64>(
                "level",
                TypeData::new("i64"),
                |a| &a.level,
                |a| &mut a.level,
            ))
    }
}

pub fn doc(value: serde_json::Value) -> Document {
    serde_json::from_value(value).expect("fixture document should deserialize")
}

/// Two authors and three books, every book pointing back at its author.
pub fn library() -> Rc<MemoryStore> {
    let store = Rc::new(MemoryStore::new());
    let authors = [
        json!({ "_id": 1, "name": "Le Guin", "books": [10, 11] }),
        json!({ "_id": 2, "name": "Lem", "books": [12] }),
    ];
    let books = [
        json!({ "_id": 10, "t": "The Dispossessed", "author": 1 }),
        json!({ "_id": 11, "t": "The Lathe of Heaven", "author": 1 }),
        json!({ "_id": 12, "t": "Solaris", "author": 2 }),
    ];

    for value in authors {
        store.insert("authors", doc(value)).expect("insert author");
    }
    for value in books {
        store.insert("books", doc(value)).expect("insert book");
    }

    store
}

pub fn session(store: &Rc<MemoryStore>) -> Session {
    session_with(Mapper::default(), store)
}

pub fn session_with(mapper: Mapper, store: &Rc<MemoryStore>) -> Session {
    let store: Rc<dyn Store> = Rc::clone(store) as Rc<dyn Store>;

    Session::new(Arc::new(mapper), store)
}
