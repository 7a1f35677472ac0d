//! Entity models: frozen mapping metadata derived from type descriptors.

mod builder;
mod descriptor;
mod entity;
mod marker;
mod property;
mod type_data;

pub use builder::{EntityModelBuilder, HierarchyLevel};
pub use descriptor::{
    Accessor, Describe, DescriptorKind, Entity, Instance, InstanceOps, Interface, Projection,
    PropertyDescriptor, PropertyValue, RecordMut, RecordRef, Superclass, TypeDescriptor,
    TypeRegistry, downcast_entity,
};
pub use entity::EntityModel;
pub use marker::{EntityMarker, Marker, MarkerKind, Markers, ReferenceMarker};
pub use property::{PropertyModel, PropertyModelBuilder};
pub use type_data::{GenericType, TypeBindings, TypeData};
