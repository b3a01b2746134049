//! Per-type encode/decode procedures.
//!
//! A [`Codec`] is generated once per concrete type from its descriptor and
//! never changes afterwards. User code can replace the generated codec of a
//! type with a [`CustomCodec`].

mod de;
mod layout;
mod ser;

use core::any::Any;
use std::rc::Rc;
use std::sync::Arc;

use crate::dispatch::{ReadContext, WriteContext};
use crate::error::PickleError;
use crate::format::{Builder, Entry, Reader};
use crate::identity::ObjectId;
use crate::info::{PrimitiveKind, Setter, TypeDescriptor, TypeKind};
use crate::reflect::{Reflect, ReflectRef};

pub use layout::{FieldGroup, FieldPlan, RecordLayout};

use de::RecordReader;
use ser::RecordWriter;

/// Fixed allowance added to every size hint for the entry header.
pub const HEADER_ALLOWANCE: usize = 4;

/// The field holding the content of an `Option` written as a present value,
/// e.g. the inner option of `Option<Option<T>>`.
pub const SOME_FIELD: &str = "some";

// -----------------------------------------------------------------------------
// CustomCodec

/// A user-supplied codec.
///
/// Registered with [`CodecRegistry::register_custom`](crate::CodecRegistry::register_custom),
/// it takes priority over the generated codec. Registered for a trait object
/// type, it handles every value reached through that type.
pub trait CustomCodec: Send + Sync + 'static {
    /// Writes a complete entry, from `begin_entry` to `end_entry`.
    ///
    /// Type and identity hints have already been given to `builder`.
    fn write(
        &self,
        cx: &mut WriteContext<'_>,
        builder: &mut dyn Builder,
        value: &dyn Reflect,
    ) -> Result<(), PickleError>;

    /// Reads the content of an entry. `begin_entry` and `end_entry` are
    /// handled by the caller.
    fn read(
        &self,
        cx: &mut ReadContext<'_>,
        reader: &mut dyn Reader,
    ) -> Result<Box<dyn Reflect>, PickleError>;
}

// -----------------------------------------------------------------------------
// Codec

/// Where a codec comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecOrigin {
    Generated,
    Custom,
}

/// The encode/decode pair of one type.
pub struct Codec {
    descriptor: &'static TypeDescriptor,
    body: CodecBody,
}

enum CodecBody {
    Primitive(PrimitiveKind),
    Str,
    PrimitiveArray(PrimitiveKind),
    Singleton,
    Sequence,
    /// An `Option` in a position that is already known to be present.
    Nullable,
    Record {
        writer: RecordWriter,
        reader: RecordReader,
    },
    Custom(Arc<dyn CustomCodec>),
}

/// A decoded value, owned or already moved into a shared cell.
pub enum Instance {
    Owned(Box<dyn Reflect>),
    Shared {
        object: Rc<dyn Any>,
        descriptor: &'static TypeDescriptor,
    },
}

impl Codec {
    /// Generates the codec of a concrete type.
    pub fn generate(descriptor: &'static TypeDescriptor) -> Result<Self, PickleError> {
        let body = match descriptor.kind() {
            TypeKind::Never => {
                return Err(PickleError::UnsupportedType(descriptor.tag().into()));
            }
            TypeKind::Primitive(kind) => CodecBody::Primitive(*kind),
            TypeKind::Str => CodecBody::Str,
            TypeKind::PrimitiveArray(kind) => CodecBody::PrimitiveArray(*kind),
            TypeKind::Singleton(_) => CodecBody::Singleton,
            TypeKind::Sequence(_) => CodecBody::Sequence,
            TypeKind::Nullable(_) => CodecBody::Nullable,
            TypeKind::Record(info) => {
                let layout = RecordLayout::plan(descriptor, info)?;
                CodecBody::Record {
                    writer: RecordWriter::new(descriptor, &layout),
                    reader: RecordReader::new(descriptor, layout),
                }
            }
            TypeKind::Shared(_) | TypeKind::Abstract => {
                return Err(PickleError::NoCodec(descriptor.tag().into()));
            }
        };
        Ok(Self { descriptor, body })
    }

    /// Wraps a custom codec.
    pub fn custom(descriptor: &'static TypeDescriptor, codec: Arc<dyn CustomCodec>) -> Self {
        Self {
            descriptor,
            body: CodecBody::Custom(codec),
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &'static TypeDescriptor {
        self.descriptor
    }

    #[inline]
    pub fn origin(&self) -> CodecOrigin {
        match self.body {
            CodecBody::Custom(_) => CodecOrigin::Custom,
            _ => CodecOrigin::Generated,
        }
    }

    #[inline]
    pub fn is_custom(&self) -> bool {
        self.origin() == CodecOrigin::Custom
    }

    /// The size hint this codec would give for `value`, if any.
    pub fn size_hint(&self, value: &dyn Reflect) -> Option<usize> {
        match &self.body {
            CodecBody::Record { writer, .. } => writer.size_hint(value),
            _ => None,
        }
    }

    /// Writes one complete entry for `value`.
    pub fn write(
        &self,
        cx: &mut WriteContext<'_>,
        builder: &mut dyn Builder,
        value: &dyn Reflect,
    ) -> Result<(), PickleError> {
        match &self.body {
            CodecBody::Primitive(_) => {
                let ReflectRef::Primitive(primitive) = value.reflect_ref() else {
                    return Err(self.mismatch(value));
                };
                builder.begin_entry(Entry::Primitive(primitive))?;
                builder.end_entry()
            }
            CodecBody::Str => {
                let ReflectRef::Str(text) = value.reflect_ref() else {
                    return Err(self.mismatch(value));
                };
                builder.begin_entry(Entry::Str(text))?;
                builder.end_entry()
            }
            CodecBody::PrimitiveArray(_) => {
                let ReflectRef::PrimitiveArray(items) = value.reflect_ref() else {
                    return Err(self.mismatch(value));
                };
                builder.begin_entry(Entry::PrimitiveArray(items))?;
                builder.end_entry()
            }
            CodecBody::Singleton => {
                builder.begin_entry(Entry::Object)?;
                builder.end_entry()
            }
            CodecBody::Sequence => ser::write_sequence(cx, builder, self.descriptor, value),
            CodecBody::Nullable => {
                builder.begin_entry(Entry::Object)?;
                builder.put_field(SOME_FIELD, &mut |builder: &mut dyn Builder| {
                    cx.write_value(builder, self.descriptor, value)
                })?;
                builder.end_entry()
            }
            CodecBody::Record { writer, .. } => writer.write(cx, builder, value),
            CodecBody::Custom(codec) => codec.write(cx, builder, value),
        }
    }

    /// Reads the content of an entry.
    ///
    /// `slot` is the id preregistered for the value, if it is shared.
    pub fn read(
        &self,
        cx: &mut ReadContext<'_>,
        reader: &mut dyn Reader,
        slot: Option<ObjectId>,
    ) -> Result<Instance, PickleError> {
        let value = match &self.body {
            CodecBody::Primitive(kind) => {
                let primitive = reader.read_primitive(*kind)?;
                if primitive.kind() != *kind {
                    return Err(PickleError::mismatch(kind.name(), primitive.kind().name()));
                }
                primitive.into_reflect()
            }
            CodecBody::Str => Box::new(reader.read_str()?),
            CodecBody::PrimitiveArray(kind) => {
                let items = reader.read_primitive_array(*kind)?;
                if items.kind() != *kind {
                    return Err(PickleError::mismatch(kind.name(), items.kind().name()));
                }
                items.into_reflect()
            }
            CodecBody::Singleton => match self.descriptor.kind() {
                TypeKind::Singleton(info) => info.instance(),
                _ => return Err(PickleError::NoCodec(self.descriptor.tag().into())),
            },
            CodecBody::Sequence => de::read_sequence(cx, reader, self.descriptor)?,
            CodecBody::Nullable => {
                let mut scoped = reader.read_field(SOME_FIELD)?;
                cx.read_value(&mut *scoped, self.descriptor)?
            }
            CodecBody::Record { reader: plan, .. } => return plan.read(cx, reader, slot),
            CodecBody::Custom(codec) => codec.read(cx, reader)?,
        };
        Ok(Instance::Owned(value))
    }

    fn mismatch(&self, value: &dyn Reflect) -> PickleError {
        PickleError::mismatch(self.descriptor.tag(), value.represented_descriptor().tag())
    }
}

impl Instance {
    /// Assigns a field through its setter.
    pub fn assign(&mut self, setter: &Setter, value: Box<dyn Reflect>) -> Result<(), PickleError> {
        match self {
            Self::Owned(target) => setter(target.as_any_mut(), value),
            Self::Shared { object, descriptor } => {
                let mut value = Some(value);
                descriptor.instance_or_err()?.patch(object, &mut |target| {
                    match value.take() {
                        Some(value) => setter(target.as_any_mut(), value),
                        None => Ok(()),
                    }
                })
            }
        }
    }

    /// The owned value.
    pub fn into_owned(self) -> Result<Box<dyn Reflect>, PickleError> {
        match self {
            Self::Owned(value) => Ok(value),
            Self::Shared { descriptor, .. } => Err(PickleError::mismatch(
                descriptor.tag(),
                "<shared object>",
            )),
        }
    }
}
