use crate::{
    db::reference::{LazyReference, ReferenceShape, Resolved},
    error::MappingError,
    model::{Entity, Instance, downcast_entity},
    value::DocId,
};
use derive_more::Deref;
use std::{collections::BTreeMap, fmt, marker::PhantomData, rc::Rc};

///
/// ReferenceField
///
/// A record field holding a reference. Accessors move the shared
/// `LazyReference` core in and out of the field.
///

pub trait ReferenceField: Sized {
    fn lazy(&self) -> &LazyReference;

    fn from_lazy(lazy: LazyReference) -> Result<Self, MappingError>;
}

fn check_shape(
    lazy: &LazyReference,
    expected: &ReferenceShape,
    view: &str,
) -> Result<(), MappingError> {
    let matches = match (lazy.shape(), expected) {
        (ReferenceShape::Map { .. }, ReferenceShape::Map { .. }) => true,
        (actual, expected) => actual == expected,
    };
    if matches {
        Ok(())
    } else {
        Err(MappingError::configuration(format!(
            "{} reference cannot populate a {view}",
            lazy.shape().label()
        )))
    }
}

fn erase<T: 'static>(entity: &Entity<T>) -> Instance {
    Rc::clone(entity) as Instance
}

///
/// Reference
///
/// Single-valued reference to an entity of type `T`.
///

pub struct Reference<T> {
    lazy: LazyReference,
    marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Reference<T> {
    #[must_use]
    pub fn new(entity: &Entity<T>) -> Self {
        Self::wrap(LazyReference::resolved(
            ReferenceShape::Single,
            Resolved::One(Some(erase(entity))),
        ))
    }

    const fn wrap(lazy: LazyReference) -> Self {
        Self {
            lazy,
            marker: PhantomData,
        }
    }

    /// The target, resolving on first access.
    pub fn get(&self) -> Result<Option<Entity<T>>, MappingError> {
        self.get_instance()?.map(downcast_entity).transpose()
    }

    /// The target without downcasting; subtypes of `T` resolve here too.
    pub fn get_instance(&self) -> Result<Option<Instance>, MappingError> {
        match self.lazy.resolve()? {
            Resolved::One(one) => Ok(one),
            Resolved::Many(many) => Ok(many.into_iter().next()),
            Resolved::Keyed(keyed) => Ok(keyed.into_values().next()),
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<&DocId> {
        self.lazy.ids().and_then(<[DocId]>::first)
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.lazy.is_resolved()
    }
}

///
/// ReferenceList
///
/// Ordered references; duplicates resolve to the same instance.
///

pub struct ReferenceList<T> {
    lazy: LazyReference,
    marker: PhantomData<fn() -> T>,
}

impl<T: 'static> ReferenceList<T> {
    #[must_use]
    pub fn new(entities: &[Entity<T>]) -> Self {
        Self::wrap(LazyReference::resolved(
            ReferenceShape::List,
            Resolved::Many(entities.iter().map(erase).collect()),
        ))
    }

    const fn wrap(lazy: LazyReference) -> Self {
        Self {
            lazy,
            marker: PhantomData,
        }
    }

    pub fn get(&self) -> Result<Vec<Entity<T>>, MappingError> {
        many(&self.lazy)?.into_iter().map(downcast_entity).collect()
    }

    pub fn get_instances(&self) -> Result<Vec<Instance>, MappingError> {
        many(&self.lazy)
    }

    #[must_use]
    pub fn ids(&self) -> Option<&[DocId]> {
        self.lazy.ids()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.lazy.is_resolved()
    }
}

///
/// EntitySet
///
/// Entities distinct by identity, in first-insertion order.
///

#[derive(Deref)]
pub struct EntitySet<T>(Vec<Entity<T>>);

impl<T> EntitySet<T> {
    #[must_use]
    pub fn contains(&self, entity: &Entity<T>) -> bool {
        self.0.iter().any(|member| Rc::ptr_eq(member, entity))
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Entity<T>> {
        self.0
    }
}

impl<T> FromIterator<Entity<T>> for EntitySet<T> {
    fn from_iter<I: IntoIterator<Item = Entity<T>>>(iter: I) -> Self {
        let mut members: Vec<Entity<T>> = Vec::new();
        for entity in iter {
            if !members.iter().any(|member| Rc::ptr_eq(member, &entity)) {
                members.push(entity);
            }
        }

        Self(members)
    }
}

impl<T: fmt::Debug> fmt::Debug for EntitySet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

///
/// ReferenceSet
///
/// References deduplicated by identifier.
///

pub struct ReferenceSet<T> {
    lazy: LazyReference,
    marker: PhantomData<fn() -> T>,
}

impl<T: 'static> ReferenceSet<T> {
    #[must_use]
    pub fn new(entities: &[Entity<T>]) -> Self {
        let members: EntitySet<T> = entities.iter().cloned().collect();

        Self::wrap(LazyReference::resolved(
            ReferenceShape::Set,
            Resolved::Many(members.iter().map(erase).collect()),
        ))
    }

    const fn wrap(lazy: LazyReference) -> Self {
        Self {
            lazy,
            marker: PhantomData,
        }
    }

    pub fn get(&self) -> Result<EntitySet<T>, MappingError> {
        many(&self.lazy)?.into_iter().map(downcast_entity).collect()
    }

    pub fn get_instances(&self) -> Result<Vec<Instance>, MappingError> {
        many(&self.lazy)
    }

    #[must_use]
    pub fn ids(&self) -> Option<&[DocId]> {
        self.lazy.ids()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.lazy.is_resolved()
    }
}

///
/// ReferenceMap
///
/// References keyed by a target property, or by identifier.
///

pub struct ReferenceMap<T> {
    lazy: LazyReference,
    marker: PhantomData<fn() -> T>,
}

impl<T: 'static> ReferenceMap<T> {
    #[must_use]
    pub fn new<K: Into<String>>(entries: impl IntoIterator<Item = (K, Entity<T>)>) -> Self {
        let keyed = entries
            .into_iter()
            .map(|(key, entity)| (key.into(), erase(&entity)))
            .collect();

        Self::wrap(LazyReference::resolved(
            ReferenceShape::Map { key: None },
            Resolved::Keyed(keyed),
        ))
    }

    const fn wrap(lazy: LazyReference) -> Self {
        Self {
            lazy,
            marker: PhantomData,
        }
    }

    pub fn get(&self) -> Result<BTreeMap<String, Entity<T>>, MappingError> {
        self.get_instances()?
            .into_iter()
            .map(|(key, instance)| downcast_entity(instance).map(|entity| (key, entity)))
            .collect()
    }

    pub fn get_instances(&self) -> Result<BTreeMap<String, Instance>, MappingError> {
        match self.lazy.resolve()? {
            Resolved::Keyed(keyed) => Ok(keyed),
            Resolved::One(one) => Ok(one.into_iter().map(|i| (String::new(), i)).collect()),
            Resolved::Many(many) => Ok(many
                .into_iter()
                .enumerate()
                .map(|(i, instance)| (i.to_string(), instance))
                .collect()),
        }
    }

    #[must_use]
    pub fn ids(&self) -> Option<&[DocId]> {
        self.lazy.ids()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.lazy.is_resolved()
    }
}

fn many(lazy: &LazyReference) -> Result<Vec<Instance>, MappingError> {
    match lazy.resolve()? {
        Resolved::One(one) => Ok(one.into_iter().collect()),
        Resolved::Many(many) => Ok(many),
        Resolved::Keyed(keyed) => Ok(keyed.into_values().collect()),
    }
}

// Every view shares the same plumbing; only the shape differs.
macro_rules! reference_view {
    ($view:ident, $shape:expr, $label:literal) => {
        impl<T: 'static> ReferenceField for $view<T> {
            fn lazy(&self) -> &LazyReference {
                &self.lazy
            }

            fn from_lazy(lazy: LazyReference) -> Result<Self, MappingError> {
                check_shape(&lazy, &$shape, $label)?;

                Ok(Self::wrap(lazy))
            }
        }

        impl<T: 'static> Default for $view<T> {
            fn default() -> Self {
                Self::wrap(LazyReference::empty($shape))
            }
        }

        impl<T> Clone for $view<T> {
            fn clone(&self) -> Self {
                Self {
                    lazy: self.lazy.clone(),
                    marker: PhantomData,
                }
            }
        }

        impl<T> fmt::Debug for $view<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($view)).field(&self.lazy).finish()
            }
        }
    };
}

reference_view!(Reference, ReferenceShape::Single, "single reference");
reference_view!(ReferenceList, ReferenceShape::List, "reference list");
reference_view!(ReferenceSet, ReferenceShape::Set, "reference set");
reference_view!(ReferenceMap, ReferenceShape::Map { key: None }, "reference map");
