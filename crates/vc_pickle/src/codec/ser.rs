use crate::codec::{HEADER_ALLOWANCE, RecordLayout};
use crate::dispatch::WriteContext;
use crate::error::PickleError;
use crate::format::{Builder, Entry};
use crate::info::{Getter, LENGTH_PREFIX_SIZE, TypeDescriptor, TypeKind};
use crate::reflect::{Reflect, ReflectRef};

// -----------------------------------------------------------------------------
// RecordWriter

/// Contribution of one field to the size hint.
#[derive(Clone, Copy)]
enum SizeTerm {
    Fixed(usize),
    /// A primitive array field with the given element size.
    Array(usize),
    /// A nullable primitive array field with the given element size.
    NullableArray(usize),
}

struct FieldWriter {
    name: &'static str,
    declared: &'static TypeDescriptor,
    getter: Getter,
    size: Option<SizeTerm>,
}

/// Writes the fields of one record type in layout order.
pub(crate) struct RecordWriter {
    descriptor: &'static TypeDescriptor,
    fields: Box<[FieldWriter]>,
    sized: bool,
}

impl RecordWriter {
    pub(crate) fn new(descriptor: &'static TypeDescriptor, layout: &RecordLayout) -> Self {
        let fields: Box<[FieldWriter]> = layout
            .fields()
            .iter()
            .filter_map(|plan| {
                let getter = plan.field().getter()?.clone();
                Some(FieldWriter {
                    name: plan.name(),
                    declared: plan.declared(),
                    getter,
                    size: size_term(plan.declared()),
                })
            })
            .collect();
        let sized = fields.iter().all(|field| field.size.is_some());
        Self {
            descriptor,
            fields,
            sized,
        }
    }

    /// The encoded size of `value`, when every field has a known size.
    ///
    /// Fixed-size fields count their byte width, primitive arrays count
    /// their elements plus a length prefix. An absent nullable array makes
    /// the size unknown.
    pub(crate) fn size_hint(&self, value: &dyn Reflect) -> Option<usize> {
        if !self.sized {
            return None;
        }
        let owner = value.as_any();
        let mut size = self.descriptor.tag().len() + HEADER_ALLOWANCE;
        for field in &self.fields {
            size += match field.size? {
                SizeTerm::Fixed(width) => width,
                SizeTerm::Array(width) => array_size((field.getter)(owner)?, width)?,
                SizeTerm::NullableArray(width) => match (field.getter)(owner)?.reflect_ref() {
                    ReflectRef::Nullable(Some(items)) => array_size(items, width)?,
                    _ => return None,
                },
            };
        }
        Some(size)
    }

    pub(crate) fn write(
        &self,
        cx: &mut WriteContext<'_>,
        builder: &mut dyn Builder,
        value: &dyn Reflect,
    ) -> Result<(), PickleError> {
        if let Some(size) = self.size_hint(value) {
            builder.hint_known_size(size);
        }
        builder.begin_entry(Entry::Object)?;
        let owner = value.as_any();
        for field in &self.fields {
            let Some(item) = (field.getter)(owner) else {
                return Err(PickleError::mismatch(
                    self.descriptor.tag(),
                    value.represented_descriptor().tag(),
                ));
            };
            builder.put_field(field.name, &mut |builder: &mut dyn Builder| {
                cx.write_value(builder, field.declared, item)
            })?;
        }
        builder.end_entry()
    }
}

fn size_term(declared: &TypeDescriptor) -> Option<SizeTerm> {
    match declared.kind() {
        TypeKind::Primitive(kind) => Some(SizeTerm::Fixed(kind.size())),
        TypeKind::PrimitiveArray(kind) => Some(SizeTerm::Array(kind.size())),
        TypeKind::Nullable(info) => match info.inner().kind() {
            TypeKind::PrimitiveArray(kind) => Some(SizeTerm::NullableArray(kind.size())),
            _ => None,
        },
        _ => None,
    }
}

fn array_size(value: &dyn Reflect, width: usize) -> Option<usize> {
    match value.reflect_ref() {
        ReflectRef::PrimitiveArray(items) => Some(items.len() * width + LENGTH_PREFIX_SIZE),
        _ => None,
    }
}

// -----------------------------------------------------------------------------
// Sequences

pub(crate) fn write_sequence(
    cx: &mut WriteContext<'_>,
    builder: &mut dyn Builder,
    descriptor: &'static TypeDescriptor,
    value: &dyn Reflect,
) -> Result<(), PickleError> {
    let (TypeKind::Sequence(info), ReflectRef::Sequence(items)) =
        (descriptor.kind(), value.reflect_ref())
    else {
        return Err(PickleError::mismatch(
            descriptor.tag(),
            value.represented_descriptor().tag(),
        ));
    };
    let element = info.element();

    builder.begin_entry(Entry::Sequence)?;
    builder.begin_collection(items.len())?;
    for index in 0..items.len() {
        let item = items.element(index).ok_or_else(|| {
            PickleError::Encode(format!(
                "sequence changed while writing `{}`",
                descriptor.tag()
            ))
        })?;
        builder.put_element(&mut |builder: &mut dyn Builder| {
            cx.write_value(builder, element, item)
        })?;
    }
    builder.end_collection()?;
    builder.end_entry()
}
