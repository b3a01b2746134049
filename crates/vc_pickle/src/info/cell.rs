//! Containers for static storage of [`TypeDescriptor`]s.
//!
//! These are used to implement [`Typed`](crate::info::Typed).
//!
//! - [`DescriptorCell`]: for non-generic types, a plain [`OnceLock`].
//! - [`GenericDescriptorCell`]: for generic types. The `static CELL` inside a
//!   generic function is shared by every instantiation, so the cell keeps one
//!   descriptor per [`TypeId`].

use core::any::{Any, TypeId};
use std::sync::{OnceLock, PoisonError, RwLock};

use crate::hash::{TypeIdMap, type_id_map};
use crate::info::TypeDescriptor;

// -----------------------------------------------------------------------------
// DescriptorCell

/// Static storage of the descriptor of a non-generic type.
///
/// # Examples
///
/// ```
/// use vc_pickle::info::{DescriptorCell, TypeDescriptor};
///
/// struct Marker;
///
/// fn marker_descriptor() -> &'static TypeDescriptor {
///     static CELL: DescriptorCell = DescriptorCell::new();
///     CELL.get_or_init(|| TypeDescriptor::abstract_type::<Marker>(
///         vc_pickle::info::Hierarchy::Unbounded,
///     ))
/// }
///
/// assert!(core::ptr::eq(marker_descriptor(), marker_descriptor()));
/// ```
pub struct DescriptorCell(OnceLock<TypeDescriptor>);

impl DescriptorCell {
    #[inline]
    pub const fn new() -> Self {
        Self(OnceLock::new())
    }

    /// Returns the stored descriptor, building it with `f` on first use.
    ///
    /// `f` must not request the descriptor of the same type.
    #[inline]
    pub fn get_or_init(&self, f: impl FnOnce() -> TypeDescriptor) -> &TypeDescriptor {
        self.0.get_or_init(f)
    }
}

// -----------------------------------------------------------------------------
// GenericDescriptorCell

/// Static storage of the descriptors of a generic type.
///
/// # Examples
///
/// ```
/// use vc_pickle::info::{GenericDescriptorCell, TypeDescriptor, Hierarchy};
///
/// struct Wrapper<T>(T);
///
/// fn wrapper_descriptor<T: 'static>() -> &'static TypeDescriptor {
///     static CELL: GenericDescriptorCell = GenericDescriptorCell::new();
///     CELL.get_or_insert::<Wrapper<T>>(|| {
///         TypeDescriptor::abstract_type::<Wrapper<T>>(Hierarchy::Unbounded)
///     })
/// }
///
/// assert_ne!(wrapper_descriptor::<u8>().tag(), wrapper_descriptor::<u16>().tag());
/// ```
pub struct GenericDescriptorCell(RwLock<TypeIdMap<&'static TypeDescriptor>>);

impl GenericDescriptorCell {
    #[inline]
    pub const fn new() -> Self {
        Self(RwLock::new(type_id_map()))
    }

    /// Returns the descriptor stored for `G`, building it with `f` on first use.
    ///
    /// `f` runs outside the lock, so it may request descriptors of other
    /// instantiations of the same generic type. Concurrent first requests may
    /// both run `f`; only the first insertion is kept.
    #[inline(always)]
    pub fn get_or_insert<G: Any + ?Sized>(
        &self,
        f: impl FnOnce() -> TypeDescriptor,
    ) -> &'static TypeDescriptor {
        let type_id = TypeId::of::<G>();
        match self.get_by_type_id(type_id) {
            Some(descriptor) => descriptor,
            None => self.insert_by_type_id(type_id, f()),
        }
    }

    #[inline(never)]
    fn get_by_type_id(&self, type_id: TypeId) -> Option<&'static TypeDescriptor> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
            .copied()
    }

    #[inline(never)]
    fn insert_by_type_id(&self, type_id: TypeId, value: TypeDescriptor) -> &'static TypeDescriptor {
        *self
            .0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(type_id)
            .or_insert_with(|| Box::leak(Box::new(value)))
    }
}
