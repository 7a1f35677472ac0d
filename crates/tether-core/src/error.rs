use crate::{model::MarkerKind, value::DocId, value::ValueError};
use std::fmt;
use thiserror::Error as ThisError;

///
/// MappingError
///
/// Structured runtime error with a stable classification.
/// `class` drives caller decisions (fail fast, surface, or propagate);
/// `detail` carries the structured payload when one exists.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct MappingError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    pub detail: Option<ErrorDetail>,
}

impl MappingError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    fn with_detail(class: ErrorClass, origin: ErrorOrigin, detail: ErrorDetail) -> Self {
        Self {
            class,
            origin,
            message: detail.to_string(),
            detail: Some(detail),
        }
    }

    /// Construct a model-origin configuration error without structured detail.
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Configuration, ErrorOrigin::Model, message)
    }

    /// Construct a store-origin fetch failure from a collaborator message.
    pub fn fetch(collection: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Fetch {
            collection: collection.into(),
            message: message.into(),
        }
        .into()
    }

    #[must_use]
    pub const fn model_detail(&self) -> Option<&ModelError> {
        match &self.detail {
            Some(ErrorDetail::Model(err)) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub const fn store_detail(&self) -> Option<&StoreError> {
        match &self.detail {
            Some(ErrorDetail::Store(err)) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_not_mappable(&self) -> bool {
        matches!(self.class, ErrorClass::NotMappable)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorDetail
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Decode(DecodeError),
    #[error("{0}")]
    Model(ModelError),
    #[error("{0}")]
    Store(StoreError),
}

///
/// ModelError
///
/// Failures raised while building or querying entity models.
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum ModelError {
    #[error("duplicate mapped name '{mapped_name}' on {type_name}")]
    DuplicateMappedName {
        type_name: String,
        mapped_name: String,
    },

    #[error("{type_name} marks more than one property with {kind}: {properties:?}")]
    DuplicateMarker {
        type_name: String,
        kind: MarkerKind,
        properties: Vec<String>,
    },

    #[error("type descriptor '{type_name}' is already registered")]
    DuplicateType { type_name: String },

    #[error("{type_name} has no identity property")]
    MissingIdentity { type_name: String },

    #[error("No property found named {name}.  Valid names are: {valid:?}")]
    NoSuchProperty { name: String, valid: Vec<String> },

    #[error("{type_name} cannot be instantiated")]
    NotInstantiable { type_name: String },

    #[error("{type_name} is not a mapped type")]
    NotMappable { type_name: String },

    #[error("required value missing: {field}")]
    RequiredValueMissing { field: &'static str },

    #[error("shard key '{property}' is not a property of {type_name}")]
    UnknownShardKey { type_name: String, property: String },

    #[error("no type descriptor registered for '{type_name}'")]
    UnknownType { type_name: String },
}

impl ModelError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::NoSuchProperty { .. } | Self::UnknownType { .. } => ErrorClass::Lookup,
            Self::NotMappable { .. } => ErrorClass::NotMappable,
            Self::DuplicateMappedName { .. }
            | Self::DuplicateMarker { .. }
            | Self::DuplicateType { .. }
            | Self::MissingIdentity { .. }
            | Self::NotInstantiable { .. }
            | Self::RequiredValueMissing { .. }
            | Self::UnknownShardKey { .. } => ErrorClass::Configuration,
        }
    }
}

impl From<ModelError> for MappingError {
    fn from(err: ModelError) -> Self {
        Self::with_detail(err.class(), ErrorOrigin::Model, ErrorDetail::Model(err))
    }
}

///
/// StoreError
///
/// Store-access failures surfaced through the collaborator boundary.
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum StoreError {
    #[error("cursor over '{collection}' is closed")]
    Closed { collection: String },

    #[error("fetch from '{collection}' failed: {message}")]
    Fetch { collection: String, message: String },

    #[error("referenced document {id} not found in '{collection}'")]
    MissingReference { collection: String, id: DocId },
}

impl From<StoreError> for MappingError {
    fn from(err: StoreError) -> Self {
        Self::with_detail(ErrorClass::Fetch, ErrorOrigin::Store, ErrorDetail::Store(err))
    }
}

///
/// DecodeError
///
/// Failures converting between stored documents and record instances.
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum DecodeError {
    #[error("{type_name} instance is already borrowed")]
    BorrowConflict { type_name: String },

    #[error("expected instance of {expected}, found {type_name}")]
    InstanceMismatch {
        expected: &'static str,
        type_name: String,
    },

    #[error("document for {type_name} has no identifier under '{key}'")]
    MissingId { type_name: String, key: String },

    #[error("property '{property}': {source}")]
    Property {
        property: String,
        source: ValueError,
    },

    #[error("unknown discriminator '{value}' under '{key}'")]
    UnknownDiscriminator { key: String, value: String },
}

impl From<DecodeError> for MappingError {
    fn from(err: DecodeError) -> Self {
        Self::with_detail(ErrorClass::Decode, ErrorOrigin::Codec, ErrorDetail::Decode(err))
    }
}

///
/// ErrorClass
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum ErrorClass {
    Configuration,
    Decode,
    Fetch,
    Lookup,
    NotMappable,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Configuration => "configuration",
            Self::Decode => "decode",
            Self::Fetch => "fetch",
            Self::Lookup => "lookup",
            Self::NotMappable => "not_mappable",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum ErrorOrigin {
    Cache,
    Codec,
    Config,
    Cursor,
    Mapper,
    Model,
    Reference,
    Store,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Cache => "cache",
            Self::Codec => "codec",
            Self::Config => "config",
            Self::Cursor => "cursor",
            Self::Mapper => "mapper",
            Self::Model => "model",
            Self::Reference => "reference",
            Self::Store => "store",
        };
        write!(f, "{label}")
    }
}

impl From<tether_config::ConfigError> for MappingError {
    fn from(err: tether_config::ConfigError) -> Self {
        Self::new(ErrorClass::Configuration, ErrorOrigin::Config, err.to_string())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_errors_are_classified_by_variant() {
        let lookup: MappingError = ModelError::NoSuchProperty {
            name: "missing".to_string(),
            valid: vec!["id".to_string(), "name".to_string()],
        }
        .into();
        assert_eq!(lookup.class, ErrorClass::Lookup);
        assert_eq!(lookup.origin, ErrorOrigin::Model);
        assert!(lookup.message.contains("missing"));
        assert!(lookup.message.contains("[\"id\", \"name\"]"));

        let config: MappingError = ModelError::RequiredValueMissing {
            field: "discriminatorKey",
        }
        .into();
        assert_eq!(config.class, ErrorClass::Configuration);
        assert_eq!(config.message, "required value missing: discriminatorKey");
    }

    #[test]
    fn store_errors_are_fetch_class() {
        let err = MappingError::fetch("users", "connection reset");

        assert_eq!(err.class, ErrorClass::Fetch);
        assert!(matches!(err.store_detail(), Some(StoreError::Fetch { .. })));
        assert_eq!(
            err.display_with_class(),
            "store:fetch: fetch from 'users' failed: connection reset"
        );
    }
}
