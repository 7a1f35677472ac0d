//! Module: model::descriptor
//! Responsibility: the explicit type-description facility records plug into.
//! Does not own: model construction (see `model::builder`).
//!
//! A `TypeDescriptor` states everything the model builder needs about one
//! record type: its type parameters, superclass and interfaces (with the type
//! arguments it supplies to them), declarative markers, and its declared
//! properties with their accessor pairs. Descriptors are hand-written or
//! generated; nothing here inspects live types.

use crate::{
    db::reference::{LazyReference, ReferenceField},
    error::{DecodeError, MappingError, ModelError},
    model::{GenericType, Marker, TypeData},
    value::{FieldValue, Value},
};
use std::{
    any::Any,
    cell::{Ref, RefCell, RefMut},
    collections::HashMap,
    fmt,
    rc::Rc,
    sync::Arc,
};

/// Type-erased record instance. Always an `Rc<RefCell<T>>` for the
/// record type `T` of the model that created it.
pub type Instance = Rc<dyn Any>;

/// Typed handle to a materialized record.
pub type Entity<T> = Rc<RefCell<T>>;

///
/// Describe
///
/// Implemented by record types (and contract types used as interfaces) to
/// expose their descriptor.
///

pub trait Describe: Any {
    const TYPE_NAME: &'static str;

    fn describe() -> TypeDescriptor;
}

/// Downcast an erased instance to its typed handle.
pub fn downcast_entity<T: 'static>(instance: Instance) -> Result<Entity<T>, MappingError> {
    instance.downcast::<RefCell<T>>().map_err(|_| {
        DecodeError::InstanceMismatch {
            expected: std::any::type_name::<T>(),
            type_name: "record instance".to_string(),
        }
        .into()
    })
}

///
/// PropertyValue
///
/// What flows through an accessor: a stored value, or a reference handle.
///

#[derive(Clone, Debug)]
pub enum PropertyValue {
    Value(Value),
    Reference(LazyReference),
}

type ReadFn = dyn Fn(&dyn Any) -> Result<PropertyValue, MappingError> + Send + Sync;
type WriteFn = dyn Fn(&mut dyn Any, PropertyValue) -> Result<(), MappingError> + Send + Sync;

///
/// Accessor
///
/// Get/set pair for one property, applied to a borrowed record.
///

#[derive(Clone)]
pub struct Accessor {
    property: Arc<str>,
    read: Arc<ReadFn>,
    write: Arc<WriteFn>,
}

impl Accessor {
    /// Accessor for a plain stored value.
    pub fn field<T, V>(property: &str, get: fn(&T) -> &V, get_mut: fn(&mut T) -> &mut V) -> Self
    where
        T: 'static,
        V: FieldValue + 'static,
    {
        let property: Arc<str> = Arc::from(property);
        let write_property = Arc::clone(&property);

        Self {
            read: Arc::new(move |record: &dyn Any| {
                let record = downcast_record::<T>(record)?;
                Ok(PropertyValue::Value(get(record).to_value()))
            }),
            write: Arc::new(move |record: &mut dyn Any, value: PropertyValue| {
                let record = downcast_record_mut::<T>(record)?;
                let PropertyValue::Value(value) = value else {
                    return Err(MappingError::configuration(format!(
                        "property '{write_property}' stores a value but was given a reference"
                    )));
                };
                *get_mut(record) =
                    V::from_value(value).map_err(|source| DecodeError::Property {
                        property: write_property.to_string(),
                        source,
                    })?;

                Ok(())
            }),
            property,
        }
    }

    /// Accessor for a reference-typed property.
    pub fn reference<T, R>(property: &str, get: fn(&T) -> &R, get_mut: fn(&mut T) -> &mut R) -> Self
    where
        T: 'static,
        R: ReferenceField + 'static,
    {
        let property: Arc<str> = Arc::from(property);
        let write_property = Arc::clone(&property);

        Self {
            read: Arc::new(move |record: &dyn Any| {
                let record = downcast_record::<T>(record)?;
                Ok(PropertyValue::Reference(get(record).lazy().clone()))
            }),
            write: Arc::new(move |record: &mut dyn Any, value: PropertyValue| {
                let record = downcast_record_mut::<T>(record)?;
                let PropertyValue::Reference(lazy) = value else {
                    return Err(MappingError::configuration(format!(
                        "property '{write_property}' is a reference but was given a value"
                    )));
                };
                *get_mut(record) = R::from_lazy(lazy)?;

                Ok(())
            }),
            property,
        }
    }

    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn read(&self, record: &dyn Any) -> Result<PropertyValue, MappingError> {
        (*self.read)(record)
    }

    pub fn write(&self, record: &mut dyn Any, value: PropertyValue) -> Result<(), MappingError> {
        (*self.write)(record, value)
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("property", &self.property)
            .finish_non_exhaustive()
    }
}

fn downcast_record<T: 'static>(record: &dyn Any) -> Result<&T, MappingError> {
    record.downcast_ref::<T>().ok_or_else(|| mismatch::<T>())
}

fn downcast_record_mut<T: 'static>(record: &mut dyn Any) -> Result<&mut T, MappingError> {
    record.downcast_mut::<T>().ok_or_else(|| mismatch::<T>())
}

fn mismatch<T>() -> MappingError {
    DecodeError::InstanceMismatch {
        expected: std::any::type_name::<T>(),
        type_name: "record".to_string(),
    }
    .into()
}

///
/// Projection
///
/// Views a subtype record as its embedded supertype record, so accessors
/// declared on the supertype apply to subtype instances.
///

pub trait Projection: Send + Sync {
    fn lift(&self, accessor: &Accessor) -> Accessor;
}

struct Embed<S, B> {
    get: fn(&S) -> &B,
    get_mut: fn(&mut S) -> &mut B,
}

impl<S: 'static, B: 'static> Projection for Embed<S, B> {
    fn lift(&self, accessor: &Accessor) -> Accessor {
        let (get, get_mut) = (self.get, self.get_mut);
        let read = Arc::clone(&accessor.read);
        let write = Arc::clone(&accessor.write);

        Accessor {
            property: Arc::clone(&accessor.property),
            read: Arc::new(move |record: &dyn Any| {
                let outer = downcast_record::<S>(record)?;
                (*read)(get(outer))
            }),
            write: Arc::new(move |record: &mut dyn Any, value: PropertyValue| {
                let outer = downcast_record_mut::<S>(record)?;
                (*write)(get_mut(outer), value)
            }),
        }
    }
}

///
/// Superclass
///
/// The supertype a record extends, the type arguments it supplies, and
/// where the supertype's state lives inside the record.
///

#[derive(Clone)]
pub struct Superclass {
    ty: GenericType,
    describe: fn() -> TypeDescriptor,
    projection: Arc<dyn Projection>,
}

impl Superclass {
    /// `S` extends `B`, with `B`'s state embedded in `S`.
    pub fn new<S, B>(args: Vec<GenericType>, get: fn(&S) -> &B, get_mut: fn(&mut S) -> &mut B) -> Self
    where
        S: 'static,
        B: Describe,
    {
        Self {
            ty: GenericType::apply(B::TYPE_NAME, args),
            describe: B::describe,
            projection: Arc::new(Embed { get, get_mut }),
        }
    }

    #[must_use]
    pub const fn ty(&self) -> &GenericType {
        &self.ty
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match &self.ty {
            GenericType::Type { raw, .. } => raw,
            GenericType::Var(name) => name,
        }
    }

    /// Type arguments supplied to the supertype's parameters, in order.
    #[must_use]
    pub fn args(&self) -> &[GenericType] {
        match &self.ty {
            GenericType::Type { args, .. } => args,
            GenericType::Var(_) => &[],
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> TypeDescriptor {
        (self.describe)()
    }

    #[must_use]
    pub fn projection(&self) -> Arc<dyn Projection> {
        Arc::clone(&self.projection)
    }
}

///
/// Interface
///
/// A contract type a record implements. Contracts contribute markers and,
/// when mapped, their own entity model.
///

#[derive(Clone)]
pub struct Interface {
    name: &'static str,
    describe: fn() -> TypeDescriptor,
}

impl Interface {
    #[must_use]
    pub fn of<I: Describe>() -> Self {
        Self {
            name: I::TYPE_NAME,
            describe: I::describe,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn descriptor(&self) -> TypeDescriptor {
        (self.describe)()
    }
}

/// Shared borrow of a type-erased record.
pub type RecordRef<'a> = Ref<'a, dyn Any>;

/// Exclusive borrow of a type-erased record.
pub type RecordMut<'a> = RefMut<'a, dyn Any>;

///
/// InstanceOps
///
/// Monomorphized construction and borrow operations for one record type.
///

#[derive(Clone, Copy)]
pub struct InstanceOps {
    type_name: &'static str,
    create: fn() -> Instance,
    matches: fn(&Instance) -> bool,
    borrow: for<'a> fn(&'a Instance) -> Result<RecordRef<'a>, MappingError>,
    borrow_mut: for<'a> fn(&'a Instance) -> Result<RecordMut<'a>, MappingError>,
}

impl InstanceOps {
    #[must_use]
    pub fn of<T: Default + 'static>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            create: create_instance::<T>,
            matches: instance_matches::<T>,
            borrow: borrow_instance::<T>,
            borrow_mut: borrow_instance_mut::<T>,
        }
    }

    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn create(&self) -> Instance {
        (self.create)()
    }

    #[must_use]
    pub fn matches(&self, instance: &Instance) -> bool {
        (self.matches)(instance)
    }

    /// Borrow the record; fails instead of panicking while it is
    /// mutably borrowed.
    pub fn borrow<'a>(&self, instance: &'a Instance) -> Result<RecordRef<'a>, MappingError> {
        (self.borrow)(instance)
    }

    pub fn borrow_mut<'a>(&self, instance: &'a Instance) -> Result<RecordMut<'a>, MappingError> {
        (self.borrow_mut)(instance)
    }
}

impl fmt::Debug for InstanceOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InstanceOps").field(&self.type_name).finish()
    }
}

fn create_instance<T: Default + 'static>() -> Instance {
    Rc::new(RefCell::new(T::default()))
}

fn instance_matches<T: 'static>(instance: &Instance) -> bool {
    instance.is::<RefCell<T>>()
}

fn instance_cell<T: 'static>(instance: &Instance) -> Result<&RefCell<T>, MappingError> {
    instance
        .downcast_ref::<RefCell<T>>()
        .ok_or_else(|| mismatch::<T>())
}

fn borrow_instance<T: 'static>(instance: &Instance) -> Result<RecordRef<'_>, MappingError> {
    let record = instance_cell::<T>(instance)?
        .try_borrow()
        .map_err(|_| borrow_conflict::<T>())?;

    Ok(Ref::map(record, |record| record as &dyn Any))
}

fn borrow_instance_mut<T: 'static>(instance: &Instance) -> Result<RecordMut<'_>, MappingError> {
    let record = instance_cell::<T>(instance)?
        .try_borrow_mut()
        .map_err(|_| borrow_conflict::<T>())?;

    Ok(RefMut::map(record, |record| record as &mut dyn Any))
}

fn borrow_conflict<T>() -> MappingError {
    DecodeError::BorrowConflict {
        type_name: std::any::type_name::<T>().to_string(),
    }
    .into()
}

///
/// PropertyDescriptor
///

#[derive(Clone, Debug)]
pub struct PropertyDescriptor {
    name: String,
    ty: GenericType,
    bound: TypeData,
    markers: Vec<Marker>,
    accessor: Accessor,
}

impl PropertyDescriptor {
    /// A property with a concrete declared type.
    pub fn field<T, V>(
        name: &str,
        ty: TypeData,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self
    where
        T: 'static,
        V: FieldValue + 'static,
    {
        Self::with_accessor(name, ty.clone().into(), ty, Accessor::field(name, get, get_mut))
    }

    /// A property whose declared type mentions type variables; `bound` is
    /// used when no binding resolves them.
    pub fn generic<T, V>(
        name: &str,
        ty: GenericType,
        bound: TypeData,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self
    where
        T: 'static,
        V: FieldValue + 'static,
    {
        Self::with_accessor(name, ty, bound, Accessor::field(name, get, get_mut))
    }

    /// A reference property. `ty` is the target type, wrapped in
    /// `List`/`Set`/`Map` for collection references.
    pub fn reference<T, R>(
        name: &str,
        ty: TypeData,
        get: fn(&T) -> &R,
        get_mut: fn(&mut T) -> &mut R,
    ) -> Self
    where
        T: 'static,
        R: ReferenceField + 'static,
    {
        Self::with_accessor(name, ty.clone().into(), ty, Accessor::reference(name, get, get_mut))
    }

    #[must_use]
    pub fn with_accessor(name: &str, ty: GenericType, bound: TypeData, accessor: Accessor) -> Self {
        Self {
            name: name.to_string(),
            ty,
            bound,
            markers: Vec::new(),
            accessor,
        }
    }

    #[must_use]
    pub fn marker(mut self, marker: impl Into<Marker>) -> Self {
        self.markers.push(marker.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn ty(&self) -> &GenericType {
        &self.ty
    }

    #[must_use]
    pub const fn bound(&self) -> &TypeData {
        &self.bound
    }

    #[must_use]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    #[must_use]
    pub const fn accessor(&self) -> &Accessor {
        &self.accessor
    }
}

///
/// DescriptorKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DescriptorKind {
    Record,
    Interface,
}

///
/// TypeDescriptor
///

#[derive(Clone)]
pub struct TypeDescriptor {
    name: String,
    kind: DescriptorKind,
    type_params: Vec<String>,
    superclass: Option<Superclass>,
    interfaces: Vec<Interface>,
    markers: Vec<Marker>,
    properties: Vec<PropertyDescriptor>,
    ops: Option<InstanceOps>,
}

impl TypeDescriptor {
    /// An instantiable record type.
    #[must_use]
    pub fn record<T: Default + 'static>(name: &str) -> Self {
        let mut descriptor = Self::new(name, DescriptorKind::Record);
        descriptor.ops = Some(InstanceOps::of::<T>());
        descriptor
    }

    /// A record type that is never constructed directly.
    #[must_use]
    pub fn abstract_record(name: &str) -> Self {
        Self::new(name, DescriptorKind::Record)
    }

    #[must_use]
    pub fn interface(name: &str) -> Self {
        Self::new(name, DescriptorKind::Interface)
    }

    fn new(name: &str, kind: DescriptorKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            type_params: Vec::new(),
            superclass: None,
            interfaces: Vec::new(),
            markers: Vec::new(),
            properties: Vec::new(),
            ops: None,
        }
    }

    #[must_use]
    pub fn type_param(mut self, name: &str) -> Self {
        self.type_params.push(name.to_string());
        self
    }

    #[must_use]
    pub fn extends(mut self, superclass: Superclass) -> Self {
        self.superclass = Some(superclass);
        self
    }

    #[must_use]
    pub fn implements(mut self, interface: Interface) -> Self {
        self.interfaces.push(interface);
        self
    }

    #[must_use]
    pub fn marker(mut self, marker: impl Into<Marker>) -> Self {
        self.markers.push(marker.into());
        self
    }

    #[must_use]
    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last `::`-separated segment of the name.
    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.name.rsplit("::").next().unwrap_or(&self.name)
    }

    #[must_use]
    pub const fn kind(&self) -> DescriptorKind {
        self.kind
    }

    #[must_use]
    pub fn type_params(&self) -> &[String] {
        &self.type_params
    }

    #[must_use]
    pub const fn superclass(&self) -> Option<&Superclass> {
        self.superclass.as_ref()
    }

    #[must_use]
    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    #[must_use]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    #[must_use]
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    #[must_use]
    pub const fn ops(&self) -> Option<InstanceOps> {
        self.ops
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("type_params", &self.type_params)
            .field("superclass", &self.superclass.as_ref().map(Superclass::ty))
            .field(
                "interfaces",
                &self.interfaces.iter().map(Interface::name).collect::<Vec<_>>(),
            )
            .field("properties", &self.properties.len())
            .finish_non_exhaustive()
    }
}

///
/// TypeRegistry
///
/// Descriptors by type name. Registration is explicit and happens once per
/// type; ancestors discovered through a registered type are added on demand.
///

#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<Arc<TypeDescriptor>, MappingError> {
        if self.types.contains_key(descriptor.name()) {
            return Err(ModelError::DuplicateType {
                type_name: descriptor.name().to_string(),
            }
            .into());
        }

        let descriptor = Arc::new(descriptor);
        self.types
            .insert(descriptor.name().to_string(), Arc::clone(&descriptor));

        Ok(descriptor)
    }

    /// Register unless the name is taken; returns whichever descriptor is stored.
    pub fn register_if_absent(&mut self, descriptor: TypeDescriptor) -> Arc<TypeDescriptor> {
        Arc::clone(
            self.types
                .entry(descriptor.name().to_string())
                .or_insert_with(|| Arc::new(descriptor)),
        )
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Base {
        label: String,
    }

    #[derive(Default)]
    struct Derived {
        base: Base,
        count: i64,
    }

    #[test]
    fn field_accessor_reads_and_writes_through_erased_record() {
        let accessor = Accessor::field::<Derived, i64>("count", |d| &d.count, |d| &mut d.count);
        let mut record = Derived::default();

        accessor
            .write(&mut record, PropertyValue::Value(Value::Int(9)))
            .expect("write should succeed");
        assert_eq!(record.count, 9);

        let read = accessor.read(&record).expect("read should succeed");
        assert!(matches!(read, PropertyValue::Value(Value::Int(9))));
    }

    #[test]
    fn field_accessor_reports_property_on_conversion_failure() {
        let accessor = Accessor::field::<Derived, i64>("count", |d| &d.count, |d| &mut d.count);
        let mut record = Derived::default();

        let err = accessor
            .write(&mut record, PropertyValue::Value(Value::from("nine")))
            .expect_err("text cannot populate an integer");

        assert!(err.message.contains("property 'count'"), "{}", err.message);
    }

    #[test]
    fn projection_lifts_supertype_accessor_onto_subtype() {
        let base = Accessor::field::<Base, String>("label", |b| &b.label, |b| &mut b.label);
        let embed = Embed::<Derived, Base> {
            get: |d| &d.base,
            get_mut: |d| &mut d.base,
        };
        let lifted = embed.lift(&base);
        let mut record = Derived::default();

        lifted
            .write(&mut record, PropertyValue::Value(Value::from("x")))
            .expect("lifted write should reach the embedded base");

        assert_eq!(record.base.label, "x");
        assert!(base.read(&record).is_err(), "unlifted accessor must reject the subtype");
    }

    #[test]
    fn instance_ops_construct_and_borrow() {
        let ops = InstanceOps::of::<Derived>();
        let instance = ops.create();

        assert!(ops.matches(&instance));
        ops.borrow_mut(&instance)
            .expect("mutable borrow should succeed")
            .downcast_mut::<Derived>()
            .expect("instance should hold Derived")
            .count = 3;

        let typed = downcast_entity::<Derived>(instance).expect("typed handle");
        assert_eq!(typed.borrow().count, 3);
    }

    #[test]
    fn conflicting_borrow_is_reported_not_panicked() {
        let ops = InstanceOps::of::<Derived>();
        let instance = ops.create();
        let _held = ops.borrow(&instance).expect("shared borrow");

        let err = ops
            .borrow_mut(&instance)
            .expect_err("exclusive borrow must fail while shared");

        assert!(err.message.contains("already borrowed"));
    }

    #[test]
    fn registry_rejects_duplicate_names() {
        let mut registry = TypeRegistry::new();

        registry
            .register(TypeDescriptor::record::<Derived>("Derived"))
            .expect("first registration should succeed");
        let err = registry
            .register(TypeDescriptor::record::<Derived>("Derived"))
            .expect_err("second registration must fail");

        assert!(matches!(err.model_detail(), Some(ModelError::DuplicateType { .. })));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn simple_name_is_last_path_segment() {
        assert_eq!(TypeDescriptor::abstract_record("app::model::User").simple_name(), "User");
        assert_eq!(TypeDescriptor::abstract_record("User").simple_name(), "User");
    }
}
