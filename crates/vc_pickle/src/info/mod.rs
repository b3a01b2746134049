//! The type descriptor model.
//!
//! A [`TypeDescriptor`] is derived once per type and cached for the life of
//! the process. Records list their [`FieldDescriptor`]s in a stable order,
//! which is the order used on the wire.

mod cell;
mod descriptor;
mod field;
mod primitive;
mod record;
mod typed;

pub use cell::{DescriptorCell, GenericDescriptorCell};
pub use descriptor::{
    Alternative, Factory, Hierarchy, InstanceOps, NullableInfo, SequenceInfo, SharedInfo,
    SingletonInfo, TypeDescriptor, TypeKind, Upcast,
};
pub use field::{Accessibility, FieldDescriptor, Getter, Setter};
pub use primitive::{
    LENGTH_PREFIX_SIZE, Primitive, PrimitiveArray, PrimitiveKind, PrimitiveSlice, PrimitiveType,
};
pub use record::{Constructor, FieldBag, RecordBuilder, RecordInfo};
pub use typed::Typed;
