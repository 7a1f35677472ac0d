//! Module: model::marker
//! Responsibility: declarative configuration attached to types and properties.
//! Does not own: interpretation of markers (conventions do that).

use derive_more::Display;
use std::collections::BTreeMap;

///
/// Marker
///
/// One piece of declarative configuration. Markers are discovered from
/// type descriptors without executing record code.
///

#[derive(Clone, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum Marker {
    /// Free-form marker for application conventions.
    Custom { kind: String, value: String },
    /// The type is stored inline inside another document.
    Embedded,
    Entity(EntityMarker),
    /// The property is the document identity.
    Id,
    /// Overrides the stored name of a property.
    Property(String),
    Reference(ReferenceMarker),
    /// Property names forming the shard key, in order.
    ShardKeys(Vec<String>),
    /// The property is never stored.
    Transient,
    /// The property carries the optimistic-concurrency version.
    Version,
}

impl Marker {
    #[must_use]
    pub fn kind(&self) -> MarkerKind {
        match self {
            Self::Custom { kind, .. } => MarkerKind::Custom(kind.clone()),
            Self::Embedded => MarkerKind::Embedded,
            Self::Entity(_) => MarkerKind::Entity,
            Self::Id => MarkerKind::Id,
            Self::Property(_) => MarkerKind::Property,
            Self::Reference(_) => MarkerKind::Reference,
            Self::ShardKeys(_) => MarkerKind::ShardKeys,
            Self::Transient => MarkerKind::Transient,
            Self::Version => MarkerKind::Version,
        }
    }

    #[must_use]
    pub fn custom(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Custom {
            kind: kind.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn entity() -> Self {
        Self::Entity(EntityMarker::default())
    }

    #[must_use]
    pub fn property(mapped_name: impl Into<String>) -> Self {
        Self::Property(mapped_name.into())
    }

    /// An eagerly loaded reference.
    #[must_use]
    pub fn reference() -> Self {
        Self::Reference(ReferenceMarker::default())
    }

    #[must_use]
    pub fn lazy_reference() -> Self {
        Self::Reference(ReferenceMarker {
            lazy: true,
            ..ReferenceMarker::default()
        })
    }
}

///
/// MarkerKind
///

#[derive(Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[remain::sorted]
pub enum MarkerKind {
    Custom(String),
    Embedded,
    Entity,
    Id,
    Property,
    Reference,
    ShardKeys,
    Transient,
    Version,
}

///
/// EntityMarker
///
/// Type-level storage configuration. Unset fields fall back to the
/// mapper configuration.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntityMarker {
    pub collection: Option<String>,
    pub discriminator_key: Option<String>,
    pub discriminator: Option<String>,
    pub use_discriminator: bool,
}

impl Default for EntityMarker {
    fn default() -> Self {
        Self {
            collection: None,
            discriminator_key: None,
            discriminator: None,
            use_discriminator: true,
        }
    }
}

impl EntityMarker {
    #[must_use]
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    #[must_use]
    pub fn discriminator(mut self, value: impl Into<String>) -> Self {
        self.discriminator = Some(value.into());
        self
    }

    #[must_use]
    pub fn discriminator_key(mut self, key: impl Into<String>) -> Self {
        self.discriminator_key = Some(key.into());
        self
    }

    #[must_use]
    pub const fn use_discriminator(mut self, enabled: bool) -> Self {
        self.use_discriminator = enabled;
        self
    }
}

impl From<EntityMarker> for Marker {
    fn from(value: EntityMarker) -> Self {
        Self::Entity(value)
    }
}

///
/// ReferenceMarker
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReferenceMarker {
    /// Defer resolution until first access.
    pub lazy: bool,
    /// Skip identifiers with no stored document instead of failing.
    pub ignore_missing: bool,
    /// Target property used as the key of map-shaped references.
    pub map_key: Option<String>,
}

impl ReferenceMarker {
    #[must_use]
    pub const fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    #[must_use]
    pub const fn ignore_missing(mut self, ignore: bool) -> Self {
        self.ignore_missing = ignore;
        self
    }

    #[must_use]
    pub fn map_key(mut self, property: impl Into<String>) -> Self {
        self.map_key = Some(property.into());
        self
    }
}

impl From<ReferenceMarker> for Marker {
    fn from(value: ReferenceMarker) -> Self {
        Self::Reference(value)
    }
}

///
/// Markers
///
/// Markers keyed by kind. The first marker inserted for a kind wins.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Markers {
    by_kind: BTreeMap<MarkerKind, Marker>,
}

impl Markers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless a marker of the same kind is already present.
    /// Returns `true` when the marker was stored.
    pub fn insert_if_absent(&mut self, marker: Marker) -> bool {
        let kind = marker.kind();
        if self.by_kind.contains_key(&kind) {
            return false;
        }
        self.by_kind.insert(kind, marker);

        true
    }

    #[must_use]
    pub fn get(&self, kind: &MarkerKind) -> Option<&Marker> {
        self.by_kind.get(kind)
    }

    #[must_use]
    pub fn contains(&self, kind: &MarkerKind) -> bool {
        self.by_kind.contains_key(kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.by_kind.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }

    #[must_use]
    pub fn entity(&self) -> Option<&EntityMarker> {
        match self.get(&MarkerKind::Entity) {
            Some(Marker::Entity(marker)) => Some(marker),
            _ => None,
        }
    }

    #[must_use]
    pub fn reference(&self) -> Option<&ReferenceMarker> {
        match self.get(&MarkerKind::Reference) {
            Some(Marker::Reference(marker)) => Some(marker),
            _ => None,
        }
    }

    #[must_use]
    pub fn mapped_name(&self) -> Option<&str> {
        match self.get(&MarkerKind::Property) {
            Some(Marker::Property(name)) => Some(name),
            _ => None,
        }
    }

    #[must_use]
    pub fn shard_keys(&self) -> Option<&[String]> {
        match self.get(&MarkerKind::ShardKeys) {
            Some(Marker::ShardKeys(keys)) => Some(keys),
            _ => None,
        }
    }

    #[must_use]
    pub fn custom(&self, kind: &str) -> Option<&str> {
        match self.get(&MarkerKind::Custom(kind.to_string())) {
            Some(Marker::Custom { value, .. }) => Some(value),
            _ => None,
        }
    }

    /// Mappable types carry an `Entity` or `Embedded` marker.
    #[must_use]
    pub fn is_mappable(&self) -> bool {
        self.contains(&MarkerKind::Entity) || self.contains(&MarkerKind::Embedded)
    }
}

impl FromIterator<Marker> for Markers {
    fn from_iter<I: IntoIterator<Item = Marker>>(iter: I) -> Self {
        let mut markers = Self::new();
        for marker in iter {
            markers.insert_if_absent(marker);
        }
        markers
    }
}

///
/// TESTS
///
