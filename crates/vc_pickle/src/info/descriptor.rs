use core::any::{Any, TypeId, type_name};
use core::fmt;
use std::rc::Rc;

use crate::error::PickleError;
use crate::info::{PrimitiveArray, PrimitiveKind, PrimitiveType, RecordInfo, Typed};
use crate::reflect::{Ref, Reflect};

/// Produces a fresh value, e.g. a shell or a singleton instance.
pub type Factory = fn() -> Box<dyn Reflect>;

/// Turns a shared concrete object into a reference of some abstract type.
///
/// The input is the `Rc<RefCell<Concrete>>` as `Rc<dyn Any>`, the output is a
/// boxed `Ref<dyn Abstract>`. `None` means the object is not of the expected
/// concrete type.
pub type Upcast = fn(Rc<dyn Any>) -> Option<Box<dyn Reflect>>;

// -----------------------------------------------------------------------------
// TypeDescriptor

/// Everything the engine knows about one type.
///
/// Descriptors are built once per type and kept for the life of the process,
/// see [`Typed`] and [`DescriptorCell`](crate::info::DescriptorCell).
pub struct TypeDescriptor {
    type_id: TypeId,
    tag: &'static str,
    kind: TypeKind,
    hierarchy: Hierarchy,
    sharing: bool,
    instance: Option<InstanceOps>,
}

/// The structural kind of a type.
pub enum TypeKind {
    /// The uninhabited type.
    Never,
    Primitive(PrimitiveKind),
    Str,
    /// `Vec<T>` of a primitive `T`.
    PrimitiveArray(PrimitiveKind),
    Sequence(SequenceInfo),
    Nullable(NullableInfo),
    Shared(SharedInfo),
    Record(RecordInfo),
    Singleton(SingletonInfo),
    /// A trait object. Values are only reachable through [`Ref`].
    Abstract,
}

/// Whether, and how, a type can have subtypes.
pub enum Hierarchy {
    /// No subtypes exist.
    Final,
    /// Subtypes exist. The listed alternatives are tried in order before the
    /// runtime fallback.
    Open(Box<[Alternative]>),
    /// Any reflected type. Only used by `dyn Reflect`.
    Unbounded,
}

/// One statically known subtype of an open hierarchy.
#[derive(Clone, Copy)]
pub struct Alternative {
    descriptor: fn() -> &'static TypeDescriptor,
    upcast: Upcast,
}

impl Alternative {
    #[inline]
    pub const fn new(descriptor: fn() -> &'static TypeDescriptor, upcast: Upcast) -> Self {
        Self { descriptor, upcast }
    }

    #[inline]
    pub fn descriptor(&self) -> &'static TypeDescriptor {
        (self.descriptor)()
    }

    #[inline]
    pub fn upcast(&self) -> Upcast {
        self.upcast
    }
}

pub struct SequenceInfo {
    element: fn() -> &'static TypeDescriptor,
    collect: fn(Vec<Box<dyn Reflect>>) -> Result<Box<dyn Reflect>, PickleError>,
}

impl SequenceInfo {
    #[inline]
    pub fn element(&self) -> &'static TypeDescriptor {
        (self.element)()
    }

    /// Builds the collection from decoded elements.
    #[inline]
    pub fn collect(&self, items: Vec<Box<dyn Reflect>>) -> Result<Box<dyn Reflect>, PickleError> {
        (self.collect)(items)
    }
}

pub struct NullableInfo {
    inner: fn() -> &'static TypeDescriptor,
    none: Factory,
    some: fn(Box<dyn Reflect>) -> Result<Box<dyn Reflect>, PickleError>,
}

impl NullableInfo {
    #[inline]
    pub fn inner(&self) -> &'static TypeDescriptor {
        (self.inner)()
    }

    #[inline]
    pub fn none(&self) -> Box<dyn Reflect> {
        (self.none)()
    }

    #[inline]
    pub fn some(&self, value: Box<dyn Reflect>) -> Result<Box<dyn Reflect>, PickleError> {
        (self.some)(value)
    }
}

pub struct SharedInfo {
    target: fn() -> &'static TypeDescriptor,
    clone_ref: fn(&dyn Any) -> Option<Box<dyn Reflect>>,
}

impl SharedInfo {
    /// The descriptor of the referenced type, possibly abstract.
    #[inline]
    pub fn target(&self) -> &'static TypeDescriptor {
        (self.target)()
    }

    /// Clones a `Ref<T>` held in `object` into a new handle.
    #[inline]
    pub fn clone_ref(&self, object: &dyn Any) -> Option<Box<dyn Reflect>> {
        (self.clone_ref)(object)
    }
}

pub struct SingletonInfo {
    instance: Factory,
}

impl SingletonInfo {
    #[inline]
    pub fn instance(&self) -> Box<dyn Reflect> {
        (self.instance)()
    }
}

impl TypeDescriptor {
    /// Creates a final descriptor for a concrete type.
    ///
    /// Records and sequences share identity by default, value-like kinds do not.
    pub fn new<T: Reflect + Typed>(kind: TypeKind) -> Self {
        Self::concrete::<T>(kind, Some(InstanceOps::of::<T>()))
    }

    fn concrete<T: ?Sized + 'static>(kind: TypeKind, instance: Option<InstanceOps>) -> Self {
        let sharing = matches!(
            kind,
            TypeKind::Record(_) | TypeKind::Sequence(_) | TypeKind::PrimitiveArray(_)
        );
        Self {
            type_id: TypeId::of::<T>(),
            tag: type_name::<T>(),
            kind,
            hierarchy: Hierarchy::Final,
            sharing,
            instance,
        }
    }

    /// Creates the descriptor of a trait object type.
    pub fn abstract_type<T: ?Sized + 'static>(hierarchy: Hierarchy) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            tag: type_name::<T>(),
            kind: TypeKind::Abstract,
            hierarchy,
            sharing: true,
            instance: None,
        }
    }

    /// An open hierarchy with the given closed alternatives.
    #[inline]
    pub fn open<T: ?Sized + 'static>(alternatives: Vec<Alternative>) -> Self {
        Self::abstract_type::<T>(Hierarchy::Open(alternatives.into_boxed_slice()))
    }

    pub fn primitive<T: PrimitiveType + Reflect + Typed>() -> Self {
        Self::new::<T>(TypeKind::Primitive(T::KIND))
    }

    /// The descriptor of `Vec<T>`.
    ///
    /// Primitive elements produce a [`TypeKind::PrimitiveArray`].
    pub fn vec<T: Reflect + Typed>() -> Self {
        let kind = match T::descriptor().kind() {
            TypeKind::Primitive(kind) => TypeKind::PrimitiveArray(*kind),
            _ => TypeKind::Sequence(SequenceInfo {
                element: T::descriptor,
                collect: collect_vec::<T>,
            }),
        };
        Self::new::<Vec<T>>(kind)
    }

    /// The descriptor of `Option<T>`.
    pub fn nullable<T: Reflect + Typed>() -> Self {
        Self::new::<Option<T>>(TypeKind::Nullable(NullableInfo {
            inner: T::descriptor,
            none: none::<T>,
            some: some::<T>,
        }))
    }

    /// The descriptor of [`Ref<T>`].
    ///
    /// Carries no [`InstanceOps`]: instances of `Ref<Ref<T>>` are never built,
    /// so a `Ref` cannot itself be the target of a shared reference.
    pub fn shared<T: ?Sized + Reflect + Typed>() -> Self {
        Self::concrete::<Ref<T>>(
            TypeKind::Shared(SharedInfo {
                target: T::descriptor,
                clone_ref: clone_ref::<T>,
            }),
            None,
        )
    }

    pub fn singleton<T: Reflect + Typed>(instance: Factory) -> Self {
        Self::new::<T>(TypeKind::Singleton(SingletonInfo { instance }))
    }

    /// Overrides the type tag.
    #[inline]
    pub fn with_tag(mut self, tag: &'static str) -> Self {
        self.tag = tag;
        self
    }

    /// Enables or disables identity sharing for values of this type.
    #[inline]
    pub fn with_sharing(mut self, sharing: bool) -> Self {
        self.sharing = sharing;
        self
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The tag written to the stream when the type is not elided.
    #[inline]
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    #[inline]
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    #[inline]
    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Returns `true` if no subtype of this type can exist.
    #[inline]
    pub fn is_final(&self) -> bool {
        matches!(self.hierarchy, Hierarchy::Final)
    }

    /// Returns `true` if shared values of this type are deduplicated.
    #[inline]
    pub fn shares_identity(&self) -> bool {
        self.sharing
    }

    #[inline]
    pub fn instance(&self) -> Option<&InstanceOps> {
        self.instance.as_ref()
    }

    pub(crate) fn instance_or_err(&self) -> Result<&InstanceOps, PickleError> {
        self.instance
            .as_ref()
            .ok_or_else(|| PickleError::NoCodec(self.tag.into()))
    }

    #[inline]
    pub fn as_record(&self) -> Option<&RecordInfo> {
        match &self.kind {
            TypeKind::Record(info) => Some(info),
            _ => None,
        }
    }

    #[inline]
    pub fn is_never(&self) -> bool {
        matches!(self.kind, TypeKind::Never)
    }

    /// Returns `true` if a value of this type can never reach a shared reference.
    pub fn is_leaf(&self) -> bool {
        match &self.kind {
            TypeKind::Never
            | TypeKind::Primitive(_)
            | TypeKind::Str
            | TypeKind::PrimitiveArray(_)
            | TypeKind::Singleton(_) => true,
            TypeKind::Nullable(info) => info.inner().is_leaf(),
            TypeKind::Sequence(_)
            | TypeKind::Shared(_)
            | TypeKind::Record(_)
            | TypeKind::Abstract => false,
        }
    }

    /// Returns `true` if a value of this type may be part of a reference cycle.
    #[inline]
    pub fn may_participate_in_cycle(&self) -> bool {
        !self.is_leaf()
    }

    /// A value that can stand in until the real one is read.
    ///
    /// Available for nullable values, collections, singletons and records
    /// with a shell.
    pub fn placeholder(&self) -> Option<Box<dyn Reflect>> {
        match &self.kind {
            TypeKind::Nullable(info) => Some(info.none()),
            TypeKind::Sequence(info) => info.collect(Vec::new()).ok(),
            TypeKind::PrimitiveArray(kind) => Some(PrimitiveArray::empty(*kind).into_reflect()),
            TypeKind::Record(info) => info.shell().map(|shell| shell()),
            TypeKind::Singleton(info) => Some(info.instance()),
            _ => None,
        }
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("tag", &self.tag)
            .field("kind", &self.kind.name())
            .field("final", &self.is_final())
            .field("sharing", &self.sharing)
            .finish()
    }
}

impl TypeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Primitive(_) => "primitive",
            Self::Str => "string",
            Self::PrimitiveArray(_) => "primitive array",
            Self::Sequence(_) => "sequence",
            Self::Nullable(_) => "nullable",
            Self::Shared(_) => "shared",
            Self::Record(_) => "record",
            Self::Singleton(_) => "singleton",
            Self::Abstract => "abstract",
        }
    }
}

fn collect_vec<T: Reflect + Typed>(
    items: Vec<Box<dyn Reflect>>,
) -> Result<Box<dyn Reflect>, PickleError> {
    let items = items
        .into_iter()
        .map(|item| item.take::<T>())
        .collect::<Result<Vec<T>, _>>()?;
    Ok(Box::new(items))
}

fn none<T: Reflect + Typed>() -> Box<dyn Reflect> {
    Box::new(None::<T>)
}

fn some<T: Reflect + Typed>(value: Box<dyn Reflect>) -> Result<Box<dyn Reflect>, PickleError> {
    Ok(Box::new(Some(value.take::<T>()?)))
}

fn clone_ref<T: ?Sized + Reflect + Typed>(object: &dyn Any) -> Option<Box<dyn Reflect>> {
    let object = object.downcast_ref::<Ref<T>>()?;
    Some(Box::new(Rc::clone(object)))
}

// -----------------------------------------------------------------------------
// InstanceOps

/// Type-erased operations on owned and shared instances of one concrete type.
#[derive(Clone, Copy)]
pub struct InstanceOps {
    share: fn(Box<dyn Reflect>) -> Result<Rc<dyn Any>, PickleError>,
    to_ref: fn(Rc<dyn Any>) -> Option<Box<dyn Reflect>>,
    to_dyn_ref: fn(Rc<dyn Any>) -> Option<Ref<dyn Reflect>>,
    patch: fn(
        &Rc<dyn Any>,
        &mut dyn FnMut(&mut dyn Reflect) -> Result<(), PickleError>,
    ) -> Result<(), PickleError>,
}

impl InstanceOps {
    pub fn of<T: Reflect + Typed>() -> Self {
        Self {
            share: share::<T>,
            to_ref: to_ref::<T>,
            to_dyn_ref: to_dyn_ref::<T>,
            patch: patch::<T>,
        }
    }

    /// Moves an owned value into a new `Rc<RefCell<T>>`.
    #[inline]
    pub fn share(&self, value: Box<dyn Reflect>) -> Result<Rc<dyn Any>, PickleError> {
        (self.share)(value)
    }

    /// Recovers the boxed `Ref<T>` of a shared object.
    #[inline]
    pub fn to_ref(&self, object: Rc<dyn Any>) -> Option<Box<dyn Reflect>> {
        (self.to_ref)(object)
    }

    #[inline]
    pub fn to_dyn_ref(&self, object: Rc<dyn Any>) -> Option<Ref<dyn Reflect>> {
        (self.to_dyn_ref)(object)
    }

    /// Mutably borrows a shared object.
    #[inline]
    pub fn patch(
        &self,
        object: &Rc<dyn Any>,
        f: &mut dyn FnMut(&mut dyn Reflect) -> Result<(), PickleError>,
    ) -> Result<(), PickleError> {
        (self.patch)(object, f)
    }
}

fn share<T: Reflect + Typed>(value: Box<dyn Reflect>) -> Result<Rc<dyn Any>, PickleError> {
    let value = value.take::<T>()?;
    Ok(crate::reflect::shared(value))
}

fn to_ref<T: Reflect + Typed>(object: Rc<dyn Any>) -> Option<Box<dyn Reflect>> {
    let object: Ref<T> = object.downcast().ok()?;
    Some(Box::new(object))
}

fn to_dyn_ref<T: Reflect + Typed>(object: Rc<dyn Any>) -> Option<Ref<dyn Reflect>> {
    let object: Ref<T> = object.downcast().ok()?;
    let object: Ref<dyn Reflect> = object;
    Some(object)
}

fn patch<T: Reflect + Typed>(
    object: &Rc<dyn Any>,
    f: &mut dyn FnMut(&mut dyn Reflect) -> Result<(), PickleError>,
) -> Result<(), PickleError> {
    let Some(cell) = object.downcast_ref::<core::cell::RefCell<T>>() else {
        return Err(PickleError::mismatch(type_name::<T>(), "<shared object>"));
    };
    let mut guard = cell
        .try_borrow_mut()
        .map_err(|_| PickleError::Borrowed(type_name::<T>().into()))?;
    f(&mut *guard)
}
