use core::any::{Any, type_name};
use core::convert::Infallible;

use crate::error::PickleError;
use crate::info::{
    DescriptorCell, GenericDescriptorCell, Hierarchy, PrimitiveType, TypeDescriptor, TypeKind,
    Typed,
};
use crate::reflect::{Ref, Reflect, ReflectRef, Sequence, SharedRef};

// -----------------------------------------------------------------------------
// Primitives

macro_rules! impl_primitive {
    ($($ty:ty),* $(,)?) => {$(
        impl Reflect for $ty {
            #[inline]
            fn represented_descriptor(&self) -> &'static TypeDescriptor {
                <Self as Typed>::descriptor()
            }

            #[inline]
            fn reflect_ref(&self) -> ReflectRef<'_> {
                ReflectRef::Primitive(PrimitiveType::into_primitive(*self))
            }

            crate::reflect_casts!();
        }

        impl Typed for $ty {
            fn descriptor() -> &'static TypeDescriptor {
                static CELL: DescriptorCell = DescriptorCell::new();
                CELL.get_or_init(TypeDescriptor::primitive::<$ty>)
            }

            #[inline]
            fn vec_ref(items: &Vec<Self>) -> ReflectRef<'_> {
                ReflectRef::PrimitiveArray(<$ty as PrimitiveType>::slice(items))
            }
        }
    )*};
}

impl_primitive!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, char);

// -----------------------------------------------------------------------------
// String and unit

impl Reflect for String {
    #[inline]
    fn represented_descriptor(&self) -> &'static TypeDescriptor {
        <Self as Typed>::descriptor()
    }

    #[inline]
    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Str(self)
    }

    crate::reflect_casts!();
}

impl Typed for String {
    fn descriptor() -> &'static TypeDescriptor {
        static CELL: DescriptorCell = DescriptorCell::new();
        CELL.get_or_init(|| TypeDescriptor::new::<String>(TypeKind::Str))
    }
}

impl Reflect for () {
    #[inline]
    fn represented_descriptor(&self) -> &'static TypeDescriptor {
        <Self as Typed>::descriptor()
    }

    #[inline]
    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Singleton
    }

    crate::reflect_casts!();
}

impl Typed for () {
    fn descriptor() -> &'static TypeDescriptor {
        static CELL: DescriptorCell = DescriptorCell::new();
        CELL.get_or_init(|| {
            TypeDescriptor::singleton::<()>(|| -> Box<dyn Reflect> { Box::new(()) })
        })
    }
}

// -----------------------------------------------------------------------------
// Never

impl Reflect for Infallible {
    #[inline]
    fn represented_descriptor(&self) -> &'static TypeDescriptor {
        <Self as Typed>::descriptor()
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        match *self {}
    }

    crate::reflect_casts!();
}

impl Typed for Infallible {
    fn descriptor() -> &'static TypeDescriptor {
        static CELL: DescriptorCell = DescriptorCell::new();
        CELL.get_or_init(|| TypeDescriptor::new::<Infallible>(TypeKind::Never))
    }
}

// -----------------------------------------------------------------------------
// Vec

impl<T: Reflect + Typed> Reflect for Vec<T> {
    #[inline]
    fn represented_descriptor(&self) -> &'static TypeDescriptor {
        <Self as Typed>::descriptor()
    }

    #[inline]
    fn reflect_ref(&self) -> ReflectRef<'_> {
        T::vec_ref(self)
    }

    crate::reflect_casts!();
}

impl<T: Reflect + Typed> Typed for Vec<T> {
    fn descriptor() -> &'static TypeDescriptor {
        static CELL: GenericDescriptorCell = GenericDescriptorCell::new();
        CELL.get_or_insert::<Self>(TypeDescriptor::vec::<T>)
    }
}

impl<T: Reflect + Typed> Sequence for Vec<T> {
    #[inline]
    fn len(&self) -> usize {
        Vec::len(self)
    }

    #[inline]
    fn element(&self, index: usize) -> Option<&dyn Reflect> {
        self.get(index).map(|item| item as &dyn Reflect)
    }
}

// -----------------------------------------------------------------------------
// Option

impl<T: Reflect + Typed> Reflect for Option<T> {
    #[inline]
    fn represented_descriptor(&self) -> &'static TypeDescriptor {
        <Self as Typed>::descriptor()
    }

    #[inline]
    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Nullable(self.as_ref().map(|value| value as &dyn Reflect))
    }

    crate::reflect_casts!();
}

impl<T: Reflect + Typed> Typed for Option<T> {
    fn descriptor() -> &'static TypeDescriptor {
        static CELL: GenericDescriptorCell = GenericDescriptorCell::new();
        CELL.get_or_insert::<Self>(TypeDescriptor::nullable::<T>)
    }
}

// -----------------------------------------------------------------------------
// Shared references

impl<T: ?Sized + Reflect + Typed> Reflect for Ref<T> {
    #[inline]
    fn represented_descriptor(&self) -> &'static TypeDescriptor {
        <Self as Typed>::descriptor()
    }

    #[inline]
    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Shared(self)
    }

    crate::reflect_casts!();
}

impl<T: ?Sized + Reflect + Typed> Typed for Ref<T> {
    fn descriptor() -> &'static TypeDescriptor {
        static CELL: GenericDescriptorCell = GenericDescriptorCell::new();
        CELL.get_or_insert::<Self>(TypeDescriptor::shared::<T>)
    }
}

impl<T: ?Sized + Reflect + Typed> SharedRef for Ref<T> {
    #[inline]
    fn address(&self) -> usize {
        std::rc::Rc::as_ptr(self) as *const () as usize
    }

    #[inline]
    fn anchor(&self) -> Box<dyn Any> {
        Box::new(self.clone())
    }

    fn with_target(
        &self,
        f: &mut dyn FnMut(&dyn Reflect) -> Result<(), PickleError>,
    ) -> Result<(), PickleError> {
        let target = self
            .try_borrow()
            .map_err(|_| PickleError::Borrowed(type_name::<T>().into()))?;
        f(target.as_reflect())
    }
}

// -----------------------------------------------------------------------------
// dyn Reflect

impl Typed for dyn Reflect {
    fn descriptor() -> &'static TypeDescriptor {
        static CELL: DescriptorCell = DescriptorCell::new();
        CELL.get_or_init(|| TypeDescriptor::abstract_type::<dyn Reflect>(Hierarchy::Unbounded))
    }
}
