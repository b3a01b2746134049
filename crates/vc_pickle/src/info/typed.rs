use crate::info::TypeDescriptor;
use crate::reflect::{Reflect, ReflectRef};

// -----------------------------------------------------------------------------
// Typed

/// Static access to the [`TypeDescriptor`] of a type.
///
/// Implemented for built-in types, for trait objects through
/// [`impl_hierarchy!`](crate::impl_hierarchy), and for user records through
/// [`impl_record!`](crate::impl_record).
///
/// # Manually Impl
///
/// Use [`DescriptorCell`](crate::info::DescriptorCell) for non-generic types
/// and [`GenericDescriptorCell`](crate::info::GenericDescriptorCell) for
/// generic ones, so the descriptor is built once.
///
/// # Examples
///
/// ```
/// use vc_pickle::info::{TypeKind, Typed};
///
/// assert!(matches!(<Vec<u16> as Typed>::descriptor().kind(), TypeKind::PrimitiveArray(_)));
/// assert!(matches!(<Vec<String> as Typed>::descriptor().kind(), TypeKind::Sequence(_)));
/// assert_eq!(<i32 as Typed>::descriptor().tag(), "i32");
/// ```
pub trait Typed {
    fn descriptor() -> &'static TypeDescriptor;

    /// The shape of a `Vec<Self>`. Primitives report a primitive array.
    #[doc(hidden)]
    #[allow(clippy::ptr_arg)]
    fn vec_ref(items: &Vec<Self>) -> ReflectRef<'_>
    where
        Self: Sized + Reflect,
    {
        ReflectRef::Sequence(items)
    }
}
