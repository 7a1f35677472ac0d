//! Module: db::cache
//! Responsibility: the per-operation identity map that makes cycles terminate.
//! Does not own: fetching (see `db::reference`) or decoding (see `db::codec`).
//!
//! One logical operation owns one `CacheScope`. The first `acquire` in a
//! scope creates and installs a cache and becomes its owner; acquisitions
//! while it is installed join it. Only the owner detaches the cache, so
//! nested work never tears down an outer operation's identity map.

use crate::{
    model::Instance,
    obs::sink::{self, MappingEvent},
    value::DocId,
};
use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    rc::Rc,
};

///
/// CacheKey
///
/// Identity of one stored document: collection plus identifier. Types that
/// share a collection share identities.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CacheKey {
    pub collection: String,
    pub id: DocId,
}

impl CacheKey {
    #[must_use]
    pub fn new(collection: impl Into<String>, id: DocId) -> Self {
        Self {
            collection: collection.into(),
            id,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

///
/// LoadState
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadState {
    /// Registered, properties still being populated.
    Loading,
    Loaded,
}

struct CacheEntry {
    instance: Instance,
    state: LoadState,
}

///
/// CacheStore
///
/// Backing map shared by every handle joined to one cache.
///

#[derive(Default)]
pub struct CacheStore {
    entries: RefCell<HashMap<CacheKey, CacheEntry>>,
}

///
/// CacheScope
///
/// Slot holding the cache active for one logical operation.
///

#[derive(Default)]
pub struct CacheScope {
    active: RefCell<Option<Rc<CacheStore>>>,
}

impl CacheScope {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Join the active cache, or create, install and own a new one.
    #[must_use]
    pub fn acquire(self: &Rc<Self>) -> EntityCache {
        let active = self.active.borrow().clone();
        let (store, owner) = match active {
            Some(store) => (store, false),
            None => {
                let store = Rc::new(CacheStore::default());
                *self.active.borrow_mut() = Some(Rc::clone(&store));
                (store, true)
            }
        };
        sink::record(MappingEvent::CacheAcquired { owner });

        EntityCache {
            store,
            scope: Rc::clone(self),
            owner,
        }
    }

    #[must_use]
    pub fn has_active(&self) -> bool {
        self.active.borrow().is_some()
    }

    fn is_active(&self, store: &Rc<CacheStore>) -> bool {
        self.active
            .borrow()
            .as_ref()
            .is_some_and(|active| Rc::ptr_eq(active, store))
    }

    fn replace(&self, store: Option<Rc<CacheStore>>) -> Option<Rc<CacheStore>> {
        std::mem::replace(&mut *self.active.borrow_mut(), store)
    }

    fn detach(&self, store: &Rc<CacheStore>) {
        if self.is_active(store) {
            self.replace(None);
        }
    }
}

impl fmt::Debug for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheScope")
            .field("active", &self.has_active())
            .finish()
    }
}

///
/// EntityCache
///
/// Handle to one operation's identity map. Dropping the owning handle
/// closes it.
///

pub struct EntityCache {
    store: Rc<CacheStore>,
    scope: Rc<CacheScope>,
    owner: bool,
}

impl EntityCache {
    /// A non-owning handle onto an existing store.
    pub(crate) fn join(store: Rc<CacheStore>, scope: Rc<CacheScope>) -> Self {
        Self {
            store,
            scope,
            owner: false,
        }
    }

    /// The cached instance for `key`, loaded or still loading. Never fetches.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Instance> {
        self.store
            .entries
            .borrow()
            .get(key)
            .map(|entry| Rc::clone(&entry.instance))
    }

    #[must_use]
    pub fn state(&self, key: &CacheKey) -> Option<LoadState> {
        self.store.entries.borrow().get(key).map(|entry| entry.state)
    }

    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.store.entries.borrow().contains_key(key)
    }

    /// Register an instance before its properties are populated.
    pub fn register(&self, key: CacheKey, instance: Instance) {
        self.store.entries.borrow_mut().insert(
            key,
            CacheEntry {
                instance,
                state: LoadState::Loading,
            },
        );
    }

    pub fn mark_loaded(&self, key: &CacheKey) {
        if let Some(entry) = self.store.entries.borrow_mut().get_mut(key) {
            entry.state = LoadState::Loaded;
        }
    }

    pub fn evict(&self, key: &CacheKey) -> Option<Instance> {
        self.store
            .entries
            .borrow_mut()
            .remove(key)
            .map(|entry| entry.instance)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.entries.borrow().is_empty()
    }

    #[must_use]
    pub const fn is_owner(&self) -> bool {
        self.owner
    }

    /// True when both handles share one backing map.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
    }

    /// True while this handle's store is the scope's active cache.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.scope.is_active(&self.store)
    }

    /// Detach from the scope. A no-op for non-owners, and for owners whose
    /// store is no longer installed.
    pub fn close(&self) {
        if self.owner {
            self.scope.detach(&self.store);
        }
    }

    /// Install for the lifetime of the guard, restoring the previous
    /// active cache when it drops.
    pub(crate) fn activate(&self) -> ActiveCache {
        let previous = self.scope.replace(Some(Rc::clone(&self.store)));

        ActiveCache {
            scope: Rc::clone(&self.scope),
            previous,
        }
    }

    /// A strong handle on the backing map, for references bound to it.
    pub(crate) fn share(&self) -> Rc<CacheStore> {
        Rc::clone(&self.store)
    }
}

impl Drop for EntityCache {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCache")
            .field("owner", &self.owner)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

///
/// ActiveCache
/// RAII guard for one cursor step's cache installation.
///

pub(crate) struct ActiveCache {
    scope: Rc<CacheScope>,
    previous: Option<Rc<CacheStore>>,
}

impl Drop for ActiveCache {
    fn drop(&mut self) {
        self.scope.replace(self.previous.take());
    }
}

///
/// TESTS
///
