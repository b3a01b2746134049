//! Runtime view of picklable values.
//!
//! [`Reflect`] is the object-safe half: every value exposes its descriptor and
//! a [`ReflectRef`] describing its shape. [`Typed`](crate::info::Typed) is the
//! static half, used where the declared type of a position is known.

use core::any::{Any, type_name};
use core::cell::RefCell;
use std::rc::Rc;

use crate::error::PickleError;
use crate::info::{Primitive, PrimitiveSlice, TypeDescriptor};

mod impls;

/// Shared, mutable ownership: the only shape that carries object identity.
pub type Ref<T> = Rc<RefCell<T>>;

/// Wraps a value in a new [`Ref`].
///
/// # Examples
///
/// ```
/// let shared = vc_pickle::shared(5_i32);
/// *shared.borrow_mut() += 1;
/// assert_eq!(*shared.borrow(), 6);
/// ```
#[inline]
pub fn shared<T>(value: T) -> Ref<T> {
    Rc::new(RefCell::new(value))
}

// -----------------------------------------------------------------------------
// Reflect

/// A value whose shape can be inspected at runtime.
///
/// Implemented for primitives, `String`, `Vec<T>`, `Option<T>`, [`Ref<T>`]
/// and by [`impl_record!`](crate::impl_record) or
/// [`impl_singleton!`](crate::impl_singleton) for user types.
///
/// Manual implementations can use [`reflect_casts!`](crate::reflect_casts)
/// for the conversion methods.
pub trait Reflect: Any {
    /// The descriptor of the value's runtime type.
    fn represented_descriptor(&self) -> &'static TypeDescriptor;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    fn as_reflect(&self) -> &dyn Reflect;

    fn as_reflect_mut(&mut self) -> &mut dyn Reflect;

    fn reflect_ref(&self) -> ReflectRef<'_>;
}

/// Implements the conversion methods of [`Reflect`] for a sized type.
#[macro_export]
macro_rules! reflect_casts {
    () => {
        #[inline]
        fn as_any(&self) -> &dyn ::core::any::Any {
            self
        }

        #[inline]
        fn as_any_mut(&mut self) -> &mut dyn ::core::any::Any {
            self
        }

        #[inline]
        fn into_any(
            self: ::std::boxed::Box<Self>,
        ) -> ::std::boxed::Box<dyn ::core::any::Any> {
            self
        }

        #[inline]
        fn as_reflect(&self) -> &dyn $crate::Reflect {
            self
        }

        #[inline]
        fn as_reflect_mut(&mut self) -> &mut dyn $crate::Reflect {
            self
        }
    };
}

impl dyn Reflect {
    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }

    #[inline]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    #[inline]
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }

    /// Moves the concrete value out of the box.
    ///
    /// # Examples
    ///
    /// ```
    /// use vc_pickle::Reflect;
    ///
    /// let boxed: Box<dyn Reflect> = Box::new(String::from("text"));
    /// assert!(boxed.is::<String>());
    /// assert_eq!(boxed.take::<String>().unwrap(), "text");
    /// ```
    pub fn take<T: Any>(self: Box<Self>) -> Result<T, PickleError> {
        let found = self.represented_descriptor().tag();
        match self.into_any().downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(_) => Err(PickleError::mismatch(type_name::<T>(), found)),
        }
    }
}

// -----------------------------------------------------------------------------
// ReflectRef

/// The shape of a value, borrowed.
pub enum ReflectRef<'a> {
    Primitive(Primitive),
    Str(&'a str),
    PrimitiveArray(PrimitiveSlice<'a>),
    Sequence(&'a dyn Sequence),
    /// `None` for an absent value.
    Nullable(Option<&'a dyn Reflect>),
    Shared(&'a dyn SharedRef),
    /// Fields are reached through the record's field descriptors.
    Record,
    Singleton,
}

/// An ordered collection of reflected elements.
pub trait Sequence {
    fn len(&self) -> usize;

    fn element(&self, index: usize) -> Option<&dyn Reflect>;
}

/// A handle with reference identity.
pub trait SharedRef {
    /// The address of the shared allocation, stable while any handle is alive.
    fn address(&self) -> usize;

    /// A clone of the handle, kept alive so that `address` is not reused.
    fn anchor(&self) -> Box<dyn Any>;

    /// Borrows the target and hands it to `f`.
    fn with_target(
        &self,
        f: &mut dyn FnMut(&dyn Reflect) -> Result<(), PickleError>,
    ) -> Result<(), PickleError>;
}
