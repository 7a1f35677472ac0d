//! Core runtime for Tether: entity models built from type descriptors, the
//! mapper that caches them, and the store-facing layer that decodes documents
//! and resolves references through a per-operation identity map.
#![warn(unreachable_pub)]

pub mod db;
pub mod error;
pub mod mapper;
pub mod model;
pub mod obs;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

pub use tether_config as config;

///
/// Prelude
///
/// Prelude contains the vocabulary needed to describe and load records.
/// Stores, codecs and observability stay behind their modules.
///

pub mod prelude {
    pub use crate::{
        db::{Reference, ReferenceList, ReferenceMap, ReferenceSet, Session},
        error::MappingError,
        mapper::Mapper,
        model::{
            Describe, Entity, EntityMarker, GenericType, Interface, Marker, PropertyDescriptor,
            ReferenceMarker, Superclass, TypeData, TypeDescriptor,
        },
        value::{DocId, Document, Value},
    };
}
