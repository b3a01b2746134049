//! Runtime codec selection.
//!
//! Every value goes through [`WriteContext::write_value`] or
//! [`ReadContext::read_value`] with its declared type. The declared type
//! decides how the concrete codec is found:
//!
//! - final types use their own codec,
//! - open hierarchies try a custom codec for the abstract type, then the
//!   closed list of alternatives in order, then the runtime type,
//! - `dyn Reflect` uses the runtime type.
//!
//! Null is checked before anything else, and shared references are checked
//! against the identity registry before a codec is involved.
//!
//! A custom codec of an abstract type owns every value reached through that
//! type, so the identity of such values follows the abstract type on both
//! sides, whatever their runtime type.

use core::any::{Any, TypeId};
use std::rc::Rc;
use std::sync::Arc;

use crate::codec::{Codec, Instance};
use crate::error::PickleError;
use crate::format::{Builder, Entry, NULL_TAG, REF_TAG, Reader};
use crate::identity::{ObjectId, ReadRegistry, WriteRegistry};
use crate::info::{Hierarchy, PrimitiveKind, TypeDescriptor, TypeKind, Upcast};
use crate::pickler::PickleOptions;
use crate::reflect::{Reflect, ReflectRef};
use crate::registry::CodecRegistry;

/// How the type of a present value may be left out of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Elision {
    /// The position has a fixed declared type.
    Static,
    /// The position is nullable. The runtime type may still equal the declared one.
    Dynamic,
}

// -----------------------------------------------------------------------------
// DispatchTable

/// One statically known subtype of an open hierarchy.
#[derive(Clone, Copy)]
pub struct DispatchCase {
    descriptor: &'static TypeDescriptor,
    upcast: Upcast,
}

impl DispatchCase {
    #[inline]
    pub fn descriptor(&self) -> &'static TypeDescriptor {
        self.descriptor
    }

    #[inline]
    pub fn upcast(&self) -> Upcast {
        self.upcast
    }
}

/// The closed list of subtypes of an abstract type, in declaration order.
pub struct DispatchTable {
    base: &'static TypeDescriptor,
    cases: Box<[DispatchCase]>,
}

impl DispatchTable {
    pub fn build(base: &'static TypeDescriptor) -> Self {
        let cases = match base.hierarchy() {
            Hierarchy::Open(alternatives) => alternatives
                .iter()
                .map(|alternative| DispatchCase {
                    descriptor: alternative.descriptor(),
                    upcast: alternative.upcast(),
                })
                .collect(),
            Hierarchy::Final | Hierarchy::Unbounded => Box::default(),
        };
        Self { base, cases }
    }

    #[inline]
    pub fn base(&self) -> &'static TypeDescriptor {
        self.base
    }

    #[inline]
    pub fn cases(&self) -> &[DispatchCase] {
        &self.cases
    }

    /// The first case whose type is `type_id`.
    pub fn case_for_type(&self, type_id: TypeId) -> Option<&DispatchCase> {
        self.cases
            .iter()
            .find(|case| case.descriptor.type_id() == type_id)
    }

    /// The first case whose tag is `tag`.
    pub fn case_for_tag(&self, tag: &str) -> Option<&DispatchCase> {
        self.cases.iter().find(|case| case.descriptor.tag() == tag)
    }
}

// -----------------------------------------------------------------------------
// WriteContext

/// State of one top-level write.
pub struct WriteContext<'r> {
    registry: &'r CodecRegistry,
    options: PickleOptions,
    identity: WriteRegistry,
    depth: usize,
}

impl<'r> WriteContext<'r> {
    pub fn new(registry: &'r CodecRegistry, options: PickleOptions) -> Self {
        Self {
            registry,
            options,
            identity: WriteRegistry::new(),
            depth: 0,
        }
    }

    #[inline]
    pub fn registry(&self) -> &'r CodecRegistry {
        self.registry
    }

    #[inline]
    pub fn options(&self) -> &PickleOptions {
        &self.options
    }

    #[inline]
    pub fn identity(&self) -> &WriteRegistry {
        &self.identity
    }

    /// Writes `value` at a position of type `declared`.
    pub fn write_value(
        &mut self,
        builder: &mut dyn Builder,
        declared: &'static TypeDescriptor,
        value: &dyn Reflect,
    ) -> Result<(), PickleError> {
        if self.depth >= self.options.max_depth {
            return Err(PickleError::DepthLimit(self.options.max_depth));
        }
        self.depth += 1;
        let result = self.write_declared(builder, declared, value);
        self.depth -= 1;
        result
    }

    fn write_declared(
        &mut self,
        builder: &mut dyn Builder,
        declared: &'static TypeDescriptor,
        value: &dyn Reflect,
    ) -> Result<(), PickleError> {
        match declared.kind() {
            TypeKind::Never => Err(PickleError::UnsupportedType(declared.tag().into())),
            TypeKind::Nullable(info) => match value.reflect_ref() {
                ReflectRef::Nullable(None) => {
                    builder.hint_tag(NULL_TAG);
                    builder.begin_entry(Entry::Null)?;
                    builder.end_entry()
                }
                ReflectRef::Nullable(Some(inner)) => {
                    self.write_present(builder, info.inner(), inner, Elision::Dynamic)
                }
                _ => Err(mismatch(declared, value)),
            },
            _ => self.write_present(builder, declared, value, Elision::Static),
        }
    }

    fn write_present(
        &mut self,
        builder: &mut dyn Builder,
        declared: &'static TypeDescriptor,
        value: &dyn Reflect,
        elision: Elision,
    ) -> Result<(), PickleError> {
        match declared.kind() {
            TypeKind::Shared(info) => self.write_shared(builder, info.target(), value, elision),
            TypeKind::Never => Err(PickleError::UnsupportedType(declared.tag().into())),
            _ => {
                let runtime = value.represented_descriptor();
                if runtime.type_id() != declared.type_id() {
                    return Err(mismatch(declared, value));
                }
                let codec = self.registry.codec(declared)?;
                hint_type(builder, declared, runtime, elision);
                codec.write(self, builder, value)
            }
        }
    }

    fn write_shared(
        &mut self,
        builder: &mut dyn Builder,
        target: &'static TypeDescriptor,
        value: &dyn Reflect,
        elision: Elision,
    ) -> Result<(), PickleError> {
        let ReflectRef::Shared(handle) = value.reflect_ref() else {
            return Err(mismatch(target, value));
        };
        let sharing = self.options.sharing.is_enabled();
        let address = handle.address();
        if sharing && let Some(id) = self.identity.lookup(address) {
            builder.hint_tag(REF_TAG);
            builder.begin_entry(Entry::BackRef(id))?;
            return builder.end_entry();
        }

        handle.with_target(&mut |object: &dyn Reflect| {
            let runtime = object.represented_descriptor();
            let (codec, owner) = self.write_codec(target, runtime)?;
            if sharing && owner.shares_identity() {
                let id = self.identity.assign(address, handle.anchor())?;
                builder.hint_oid(id);
            }
            hint_type(builder, target, runtime, elision);
            codec.write(self, builder, object)
        })
    }

    /// The codec for `runtime` at a `target` position, and the type whose
    /// sharing flag decides if the value gets an id.
    fn write_codec(
        &self,
        target: &'static TypeDescriptor,
        runtime: &'static TypeDescriptor,
    ) -> Result<(Arc<Codec>, &'static TypeDescriptor), PickleError> {
        if let Some(codec) = abstract_codec(self.registry, target) {
            return Ok((codec, target));
        }
        let concrete = match target.hierarchy() {
            Hierarchy::Final => {
                if runtime.type_id() != target.type_id() {
                    return Err(PickleError::mismatch(target.tag(), runtime.tag()));
                }
                runtime
            }
            Hierarchy::Open(_) => self
                .registry
                .dispatch_table(target)
                .case_for_type(runtime.type_id())
                .map_or(runtime, DispatchCase::descriptor),
            Hierarchy::Unbounded => runtime,
        };
        Ok((self.registry.codec(concrete)?, runtime))
    }
}

/// The custom codec registered for an abstract type, if any.
fn abstract_codec(registry: &CodecRegistry, target: &TypeDescriptor) -> Option<Arc<Codec>> {
    if target.is_final() {
        return None;
    }
    registry.custom_codec(target)
}

fn hint_type(
    builder: &mut dyn Builder,
    declared: &TypeDescriptor,
    runtime: &TypeDescriptor,
    elision: Elision,
) {
    builder.hint_tag(runtime.tag());
    if runtime.type_id() != declared.type_id() {
        return;
    }
    match elision {
        Elision::Static => builder.hint_statically_elided_type(),
        Elision::Dynamic => builder.hint_dynamically_elided_type(),
    }
}

fn mismatch(declared: &TypeDescriptor, value: &dyn Reflect) -> PickleError {
    PickleError::mismatch(declared.tag(), value.represented_descriptor().tag())
}

// -----------------------------------------------------------------------------
// ReadContext

/// State of one top-level read.
pub struct ReadContext<'r> {
    registry: &'r CodecRegistry,
    options: PickleOptions,
    identity: ReadRegistry,
    depth: usize,
}

impl<'r> ReadContext<'r> {
    pub fn new(registry: &'r CodecRegistry, options: PickleOptions) -> Self {
        Self {
            registry,
            options,
            identity: ReadRegistry::new(),
            depth: 0,
        }
    }

    #[inline]
    pub fn registry(&self) -> &'r CodecRegistry {
        self.registry
    }

    #[inline]
    pub fn options(&self) -> &PickleOptions {
        &self.options
    }

    #[inline]
    pub fn identity(&self) -> &ReadRegistry {
        &self.identity
    }

    #[inline]
    pub(crate) fn identity_mut(&mut self) -> &mut ReadRegistry {
        &mut self.identity
    }

    /// Reads a value at a position of type `declared`.
    pub fn read_value(
        &mut self,
        reader: &mut dyn Reader,
        declared: &'static TypeDescriptor,
    ) -> Result<Box<dyn Reflect>, PickleError> {
        if self.depth >= self.options.max_depth {
            return Err(PickleError::DepthLimit(self.options.max_depth));
        }
        self.depth += 1;
        let result = self.read_declared(reader, declared);
        self.depth -= 1;
        result
    }

    fn read_declared(
        &mut self,
        reader: &mut dyn Reader,
        declared: &'static TypeDescriptor,
    ) -> Result<Box<dyn Reflect>, PickleError> {
        match declared.kind() {
            TypeKind::Never => Err(PickleError::UnsupportedType(declared.tag().into())),
            TypeKind::Nullable(info) => {
                let inner = info.inner();
                let tag = begin_entry(reader, inner, Elision::Dynamic)?;
                if tag == NULL_TAG {
                    reader.end_entry()?;
                    return Ok(info.none());
                }
                let value = self.read_present(reader, inner, &tag)?;
                info.some(value)
            }
            _ => {
                let tag = begin_entry(reader, declared, Elision::Static)?;
                if tag == NULL_TAG {
                    return Err(PickleError::Decode(format!(
                        "null found for non-nullable `{}`",
                        declared.tag()
                    )));
                }
                self.read_present(reader, declared, &tag)
            }
        }
    }

    fn read_present(
        &mut self,
        reader: &mut dyn Reader,
        declared: &'static TypeDescriptor,
        tag: &str,
    ) -> Result<Box<dyn Reflect>, PickleError> {
        match declared.kind() {
            TypeKind::Shared(info) => self.read_shared(reader, declared, info.target(), tag),
            TypeKind::Never => Err(PickleError::UnsupportedType(declared.tag().into())),
            _ => {
                if tag != declared.tag() {
                    return Err(PickleError::mismatch(declared.tag(), tag));
                }
                let codec = self.registry.codec(declared)?;
                let value = codec.read(self, reader, None)?.into_owned()?;
                reader.end_entry()?;
                Ok(value)
            }
        }
    }

    fn read_shared(
        &mut self,
        reader: &mut dyn Reader,
        declared: &'static TypeDescriptor,
        target: &'static TypeDescriptor,
        tag: &str,
    ) -> Result<Box<dyn Reflect>, PickleError> {
        if tag == REF_TAG {
            let id = read_object_id(reader)?;
            reader.end_entry()?;
            let (object, concrete) = self.identity.resolve(id)?;
            return self.upcast(target, object, concrete);
        }
        if let Some(codec) = abstract_codec(self.registry, target) {
            return self.read_through_abstract(reader, declared, target, &codec);
        }

        let concrete = self.resolve_tag(target, tag)?;
        let codec = self.registry.codec(concrete)?;
        let slot = if self.options.sharing.is_enabled() && concrete.shares_identity() {
            Some(self.identity.preregister()?)
        } else {
            None
        };
        let instance = codec.read(self, reader, slot)?;
        let (object, concrete) = self.settle(slot, instance)?;
        reader.end_entry()?;
        self.upcast(target, object, concrete)
    }

    /// The concrete descriptor named by a decoded tag.
    fn resolve_tag(
        &self,
        target: &'static TypeDescriptor,
        tag: &str,
    ) -> Result<&'static TypeDescriptor, PickleError> {
        match target.hierarchy() {
            Hierarchy::Final if tag == target.tag() => Ok(target),
            Hierarchy::Final => Err(PickleError::mismatch(target.tag(), tag)),
            Hierarchy::Open(_) => {
                let table = self.registry.dispatch_table(target);
                if let Some(case) = table.case_for_tag(tag) {
                    return Ok(case.descriptor());
                }
                self.registry
                    .descriptor_by_tag(tag)
                    .ok_or_else(|| PickleError::UnknownType(tag.into()))
            }
            Hierarchy::Unbounded => self
                .registry
                .descriptor_by_tag(tag)
                .ok_or_else(|| PickleError::UnknownType(tag.into())),
        }
    }

    /// Reads a value with the custom codec of its abstract type.
    ///
    /// The codec may return a concrete value with a known upcast, or a
    /// reference of the declared type. The tag is not consulted.
    fn read_through_abstract(
        &mut self,
        reader: &mut dyn Reader,
        declared: &'static TypeDescriptor,
        target: &'static TypeDescriptor,
        codec: &Codec,
    ) -> Result<Box<dyn Reflect>, PickleError> {
        let slot = if self.options.sharing.is_enabled() && target.shares_identity() {
            Some(self.identity.preregister()?)
        } else {
            None
        };
        let value = codec.read(self, reader, slot)?.into_owned()?;
        reader.end_entry()?;

        if value.represented_descriptor().type_id() != declared.type_id() {
            let (object, concrete) = self.settle(slot, Instance::Owned(value))?;
            return self.upcast(target, object, concrete);
        }
        let Some(id) = slot else {
            return Ok(value);
        };
        let object: Rc<dyn Any> = Rc::from(value.into_any());
        self.identity.register(id, Rc::clone(&object), declared)?;
        self.upcast(target, object, declared)
    }

    /// Moves a decoded value into a shared cell and registers it.
    fn settle(
        &mut self,
        slot: Option<ObjectId>,
        instance: Instance,
    ) -> Result<(Rc<dyn Any>, &'static TypeDescriptor), PickleError> {
        let (object, descriptor) = match instance {
            Instance::Shared { object, descriptor } => (object, descriptor),
            Instance::Owned(value) => {
                let descriptor = value.represented_descriptor();
                let object = descriptor.instance_or_err()?.share(value)?;
                (object, descriptor)
            }
        };
        if let Some(id) = slot {
            self.identity.register(id, Rc::clone(&object), descriptor)?;
        }
        Ok((object, descriptor))
    }

    /// Wraps a shared object into a reference of the declared target type.
    fn upcast(
        &self,
        target: &'static TypeDescriptor,
        object: Rc<dyn Any>,
        concrete: &'static TypeDescriptor,
    ) -> Result<Box<dyn Reflect>, PickleError> {
        if let TypeKind::Shared(info) = concrete.kind() {
            // A reference built by a custom codec, kept as is.
            if info.target().type_id() != target.type_id() {
                return Err(PickleError::mismatch(target.tag(), info.target().tag()));
            }
            return info
                .clone_ref(&*object)
                .ok_or_else(|| PickleError::mismatch(target.tag(), concrete.tag()));
        }
        let upcast = match target.hierarchy() {
            Hierarchy::Final => {
                if concrete.type_id() != target.type_id() {
                    return Err(PickleError::mismatch(target.tag(), concrete.tag()));
                }
                concrete.instance_or_err()?.to_ref(object)
            }
            Hierarchy::Open(_) => {
                let table = self.registry.dispatch_table(target);
                match table.case_for_type(concrete.type_id()) {
                    Some(case) => (case.upcast())(object),
                    None => self
                        .registry
                        .subtype(target.type_id(), concrete.type_id())
                        .and_then(|upcast| upcast(object)),
                }
            }
            Hierarchy::Unbounded => concrete
                .instance_or_err()?
                .to_dyn_ref(object)
                .map(|object| Box::new(object) as Box<dyn Reflect>),
        };
        upcast.ok_or_else(|| PickleError::mismatch(target.tag(), concrete.tag()))
    }
}

fn begin_entry(
    reader: &mut dyn Reader,
    declared: &'static TypeDescriptor,
    elision: Elision,
) -> Result<String, PickleError> {
    let expected = match declared.kind() {
        TypeKind::Shared(info) => info.target(),
        _ => declared,
    };
    reader.hint_tag(expected.tag());
    if expected.is_final() {
        match elision {
            Elision::Static => reader.hint_statically_elided_type(),
            Elision::Dynamic => reader.hint_dynamically_elided_type(),
        }
    }
    reader.begin_entry()
}

fn read_object_id(reader: &mut dyn Reader) -> Result<ObjectId, PickleError> {
    reader
        .read_primitive(PrimitiveKind::U32)?
        .as_u32()
        .map(ObjectId::new)
        .ok_or_else(|| PickleError::Decode("malformed back-reference".into()))
}

#[cfg(test)]
mod tests {
    use super::DispatchTable;
    use crate::info::Typed;

    #[test]
    fn final_types_have_no_cases() {
        let table = DispatchTable::build(<u8 as Typed>::descriptor());
        assert!(table.cases().is_empty());
        assert!(table.case_for_tag("u8").is_none());
    }
}
