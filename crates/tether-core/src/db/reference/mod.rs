//! Module: db::reference
//! Responsibility: lazily resolvable references and the one routine that
//! resolves every reference shape.
//! Does not own: document decoding (see `db::codec`) or cache lifetime
//! (see `db::cache`).
//!
//! A reference built from a stored document records identifiers and keeps
//! the cache of the operation that decoded it alive until it resolves. The
//! first access resolves it: cache hits are reused, including entries still
//! being populated, and misses are fetched in one batch. A reference built
//! from live entities is resolved from the start and never fetches.

mod typed;

#[cfg(test)]
mod tests;

pub use typed::{EntitySet, Reference, ReferenceField, ReferenceList, ReferenceMap, ReferenceSet};

use crate::{
    db::{
        cache::{CacheKey, CacheScope, CacheStore, EntityCache},
        codec,
        store::Store,
    },
    error::{DecodeError, MappingError, StoreError},
    mapper::Mapper,
    model::{EntityModel, Instance, ReferenceMarker, TypeData},
    obs::sink::{self, MappingEvent},
    value::{DocId, Document, Value},
};
use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    rc::Rc,
    sync::Arc,
};

///
/// ReferenceShape
///
/// How the resolved targets of a reference are collected.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReferenceShape {
    Single,
    /// Ordered, duplicates kept.
    List,
    /// One element per distinct identifier, first occurrence order.
    Set,
    /// Keyed by `key` on the target, or by identifier when unset.
    Map { key: Option<String> },
}

impl ReferenceShape {
    /// Shape of a reference property declared with `type_data`.
    #[must_use]
    pub fn of(type_data: &TypeData, marker: &ReferenceMarker) -> Self {
        match type_data.raw() {
            TypeData::LIST => Self::List,
            TypeData::SET => Self::Set,
            TypeData::MAP => Self::Map {
                key: marker.map_key.clone(),
            },
            _ => Self::Single,
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::List => "list",
            Self::Set => "set",
            Self::Map { .. } => "map",
        }
    }
}

///
/// Resolved
///
/// Materialized targets of one reference.
///

#[derive(Clone)]
pub enum Resolved {
    One(Option<Instance>),
    Many(Vec<Instance>),
    Keyed(BTreeMap<String, Instance>),
}

impl Resolved {
    /// The empty value of a shape.
    #[must_use]
    pub const fn empty(shape: &ReferenceShape) -> Self {
        match shape {
            ReferenceShape::Single => Self::One(None),
            ReferenceShape::List | ReferenceShape::Set => Self::Many(Vec::new()),
            ReferenceShape::Map { .. } => Self::Keyed(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::One(one) => usize::from(one.is_some()),
            Self::Many(many) => many.len(),
            Self::Keyed(keyed) => keyed.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn instances(&self) -> Vec<(Option<&str>, &Instance)> {
        match self {
            Self::One(one) => one.iter().map(|instance| (None, instance)).collect(),
            Self::Many(many) => many.iter().map(|instance| (None, instance)).collect(),
            Self::Keyed(keyed) => keyed
                .iter()
                .map(|(key, instance)| (Some(key.as_str()), instance))
                .collect(),
        }
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(one) => write!(f, "One({})", usize::from(one.is_some())),
            Self::Many(many) => write!(f, "Many({})", many.len()),
            Self::Keyed(keyed) => f.debug_tuple("Keyed").field(&keyed.keys()).finish(),
        }
    }
}

///
/// ResolveContext
///
/// What a reference needs to load its targets after decoding has returned:
/// the mapper, the store, and the operation's cache scope.
///

#[derive(Clone)]
pub struct ResolveContext {
    mapper: Arc<Mapper>,
    store: Rc<dyn Store>,
    scope: Rc<CacheScope>,
}

impl ResolveContext {
    #[must_use]
    pub fn new(mapper: Arc<Mapper>, store: Rc<dyn Store>, scope: Rc<CacheScope>) -> Self {
        Self {
            mapper,
            store,
            scope,
        }
    }

    #[must_use]
    pub const fn mapper(&self) -> &Arc<Mapper> {
        &self.mapper
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        &*self.store
    }

    #[must_use]
    pub const fn scope(&self) -> &Rc<CacheScope> {
        &self.scope
    }

    /// Join the cache a reference was bound to, or acquire one from the
    /// scope when the reference holds none.
    pub(crate) fn cache_for(&self, bound: Option<Rc<CacheStore>>) -> EntityCache {
        bound.map_or_else(
            || self.scope.acquire(),
            |store| EntityCache::join(store, Rc::clone(&self.scope)),
        )
    }
}

impl fmt::Debug for ResolveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveContext")
            .field("mapper", &self.mapper)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

///
/// LazyReference
///
/// Shared core of every typed reference view. Clones share state, so
/// resolving one resolves all of them.
///

#[derive(Clone)]
pub struct LazyReference {
    inner: Rc<ReferenceInner>,
}

struct ReferenceInner {
    shape: ReferenceShape,
    stored: Option<Stored>,
    state: RefCell<Option<Resolved>>,
}

struct Stored {
    value: Value,
    ids: Vec<DocId>,
    // Stored map keys, parallel to `ids`; empty for other shapes.
    keys: Vec<String>,
    ignore_missing: bool,
    target: Arc<EntityModel>,
    context: ResolveContext,
    // Released once resolved.
    cache: RefCell<Option<Rc<CacheStore>>>,
}

impl LazyReference {
    /// A reference whose targets are already materialized.
    #[must_use]
    pub fn resolved(shape: ReferenceShape, resolved: Resolved) -> Self {
        Self {
            inner: Rc::new(ReferenceInner {
                shape,
                stored: None,
                state: RefCell::new(Some(resolved)),
            }),
        }
    }

    /// An empty, resolved reference.
    #[must_use]
    pub fn empty(shape: ReferenceShape) -> Self {
        let resolved = Resolved::empty(&shape);

        Self::resolved(shape, resolved)
    }

    /// A reference read from a stored value. Nothing is fetched here.
    pub(crate) fn stored(
        shape: ReferenceShape,
        value: Value,
        marker: &ReferenceMarker,
        target: Arc<EntityModel>,
        context: ResolveContext,
        cache: &EntityCache,
    ) -> Result<Self, MappingError> {
        let (keys, ids): (Vec<Option<String>>, Vec<DocId>) =
            stored_ids(&shape, &value)?.into_iter().unzip();
        let keys = keys.into_iter().flatten().collect();

        Ok(Self {
            inner: Rc::new(ReferenceInner {
                shape,
                stored: Some(Stored {
                    value,
                    ids,
                    keys,
                    ignore_missing: marker.ignore_missing,
                    target,
                    context,
                    cache: RefCell::new(Some(cache.share())),
                }),
                state: RefCell::new(None),
            }),
        })
    }

    #[must_use]
    pub fn shape(&self) -> &ReferenceShape {
        &self.inner.shape
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.inner.state.borrow().is_some()
    }

    /// Stored identifiers, for references read from a document.
    #[must_use]
    pub fn ids(&self) -> Option<&[DocId]> {
        self.inner.stored.as_ref().map(|stored| stored.ids.as_slice())
    }

    /// True when both handles share one reference core.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Resolve on first call; later calls return the stored result.
    pub fn resolve(&self) -> Result<Resolved, MappingError> {
        if let Some(resolved) = self.inner.state.borrow().as_ref() {
            return Ok(resolved.clone());
        }
        let Some(stored) = self.inner.stored.as_ref() else {
            return Ok(Resolved::empty(&self.inner.shape));
        };

        let resolved = resolve_stored(&self.inner.shape, stored)?;
        *self.inner.state.borrow_mut() = Some(resolved.clone());
        stored.cache.borrow_mut().take();

        Ok(resolved)
    }

    /// The stored form of this reference: identifiers laid out by shape.
    pub fn to_stored_value(
        &self,
        mapper: &Mapper,
        target: &Arc<EntityModel>,
    ) -> Result<Value, MappingError> {
        if let Some(stored) = self.inner.stored.as_ref() {
            return Ok(stored.value.clone());
        }

        let state = self.inner.state.borrow();
        let Some(resolved) = state.as_ref() else {
            return Ok(Value::Null);
        };

        let mut ids = Vec::new();
        for (key, instance) in resolved.instances() {
            let model = mapper.model_for_instance(target, instance)?;
            let id = model.read_id(instance)?.ok_or_else(|| {
                MappingError::configuration(format!(
                    "referenced {} instance has no identifier; save it first",
                    model.type_name()
                ))
            })?;
            ids.push((key, id));
        }

        Ok(match resolved {
            Resolved::One(_) => ids.pop().map_or(Value::Null, |(_, id)| id.to_value()),
            Resolved::Many(_) => Value::List(ids.into_iter().map(|(_, id)| id.to_value()).collect()),
            Resolved::Keyed(_) => Value::Document(
                ids.into_iter()
                    .filter_map(|(key, id)| key.map(|key| (key.to_string(), id.to_value())))
                    .collect::<Document>(),
            ),
        })
    }
}

impl fmt::Debug for LazyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyReference")
            .field("shape", &self.inner.shape)
            .field("ids", &self.ids())
            .field("resolved", &*self.inner.state.borrow())
            .finish()
    }
}

// Identifiers of a stored reference value in stored order, each with its
// stored map key when the value is a map.
type StoredEntry = (Option<String>, DocId);

fn stored_ids(shape: &ReferenceShape, value: &Value) -> Result<Vec<StoredEntry>, MappingError> {
    let id = |value: &Value| {
        DocId::from_value(value).map_err(|source| -> MappingError {
            DecodeError::Property {
                property: format!("{} reference", shape.label()),
                source,
            }
            .into()
        })
    };

    match (shape, value) {
        (_, Value::Null) => Ok(Vec::new()),
        (ReferenceShape::Single, value) => Ok(vec![(None, id(value)?)]),
        (ReferenceShape::List | ReferenceShape::Set, Value::List(items)) => items
            .iter()
            .map(|item| id(item).map(|id| (None, id)))
            .collect(),
        (ReferenceShape::Map { .. }, Value::Document(entries)) => entries
            .iter()
            .map(|(key, value)| id(value).map(|id| (Some(key.to_string()), id)))
            .collect(),
        (shape, other) => Err(MappingError::configuration(format!(
            "{} reference cannot be read from a stored {}",
            shape.label(),
            other.kind_name()
        ))),
    }
}

fn resolve_stored(shape: &ReferenceShape, stored: &Stored) -> Result<Resolved, MappingError> {
    let target = &stored.target;
    let context = &stored.context;
    let collection = target.collection_name();

    let ids: Vec<DocId> = match shape {
        ReferenceShape::Set => {
            let mut seen = HashSet::new();
            stored
                .ids
                .iter()
                .filter(|id| seen.insert(*id))
                .cloned()
                .collect()
        }
        _ => stored.ids.clone(),
    };

    // Phase 1: load every target through the bound cache.
    let cache = context.cache_for(stored.cache.borrow().clone());
    let loaded = load(context, &cache, target, &ids)?;

    // Phase 2: collect in stored order.
    let mut found = Vec::with_capacity(ids.len());
    for (index, id) in ids.into_iter().enumerate() {
        match loaded.get(&id) {
            Some(instance) => found.push((index, Rc::clone(instance))),
            None if stored.ignore_missing => {}
            None => {
                return Err(StoreError::MissingReference {
                    collection: collection.to_string(),
                    id,
                }
                .into());
            }
        }
    }

    // Phase 3: shape.
    let resolved = match shape {
        ReferenceShape::Single => Resolved::One(found.into_iter().next().map(|(_, instance)| instance)),
        ReferenceShape::List | ReferenceShape::Set => {
            Resolved::Many(found.into_iter().map(|(_, instance)| instance).collect())
        }
        ReferenceShape::Map { key } => {
            let mut keyed = BTreeMap::new();
            for (index, instance) in found {
                let map_key = match key {
                    Some(property) => map_key(context.mapper(), target, &instance, property)?,
                    None => stored.keys.get(index).cloned().unwrap_or_default(),
                };
                keyed.insert(map_key, instance);
            }
            Resolved::Keyed(keyed)
        }
    };

    sink::record(MappingEvent::ReferenceResolved {
        collection,
        shape: shape.label(),
        elements: resolved.len() as u64,
    });

    Ok(resolved)
}

// Cache hits first, then one batch fetch for the misses.
fn load(
    context: &ResolveContext,
    cache: &EntityCache,
    target: &Arc<EntityModel>,
    ids: &[DocId],
) -> Result<HashMap<DocId, Instance>, MappingError> {
    let collection = target.collection_name();
    let mut loaded = HashMap::with_capacity(ids.len());
    let mut misses = Vec::new();

    for id in ids {
        if loaded.contains_key(id) || misses.contains(id) {
            continue;
        }
        match cache.get(&CacheKey::new(collection, id.clone())) {
            Some(instance) => {
                sink::record(MappingEvent::CacheHit { collection });
                loaded.insert(id.clone(), instance);
            }
            None => misses.push(id.clone()),
        }
    }

    if misses.is_empty() {
        return Ok(loaded);
    }

    let documents = context.store().find_by_ids(collection, &misses)?;
    sink::record(MappingEvent::Fetch {
        collection,
        requested: misses.len() as u64,
        returned: documents.len() as u64,
    });

    for document in &documents {
        let id = codec::document_id(target, document)?;
        let instance = codec::decode(context, cache, target, document)?;
        loaded.insert(id, instance);
    }

    Ok(loaded)
}

fn map_key(
    mapper: &Mapper,
    target: &Arc<EntityModel>,
    instance: &Instance,
    property: &str,
) -> Result<String, MappingError> {
    let model = mapper.model_for_instance(target, instance)?;
    let value = model.read_value(instance, property)?;

    value.as_map_key().ok_or_else(|| {
        MappingError::configuration(format!(
            "map key property '{property}' of {} holds a {}, not a scalar",
            model.type_name(),
            value.kind_name()
        ))
    })
}
