//! Declarative implementations of [`Reflect`](crate::Reflect) and
//! [`Typed`](crate::info::Typed) for user types.

/// Implements [`Reflect`](crate::Reflect) and [`Typed`](crate::info::Typed)
/// for a record with public fields.
///
/// Without a marker, every field of the struct must be listed and the
/// struct literal is used as the primary constructor. With `: Default`,
/// [`Default`] is used as the shell and the listed fields are assigned
/// after construction. An optional `as "tag"` overrides the type tag.
///
/// # Examples
///
/// ```
/// use vc_pickle::{Ref, impl_record};
///
/// pub struct Point {
///     pub x: i32,
///     pub y: i32,
/// }
///
/// impl_record!(Point { x, y });
///
/// #[derive(Default)]
/// pub struct Node {
///     pub value: u32,
///     pub next: Option<Ref<Node>>,
/// }
///
/// impl_record!(Node: Default as "node" { value, next });
///
/// use vc_pickle::info::Typed;
/// assert_eq!(<Node as Typed>::descriptor().tag(), "node");
/// assert!(<Point as Typed>::descriptor().as_record().unwrap().constructor().is_some());
/// ```
#[macro_export]
macro_rules! impl_record {
    ($ty:ident $(as $tag:literal)? { $($field:ident),* $(,)? }) => {
        $crate::impl_record!(@reflect $ty);

        impl $crate::info::Typed for $ty {
            fn descriptor() -> &'static $crate::info::TypeDescriptor {
                static CELL: $crate::info::DescriptorCell = $crate::info::DescriptorCell::new();
                CELL.get_or_init(|| {
                    $crate::info::RecordBuilder::<$ty>::new()
                        $(.tag($tag))?
                        $(.public_field(
                            ::core::stringify!($field),
                            |value| &value.$field,
                            |value| &mut value.$field,
                        ))*
                        .constructor(
                            &[$(::core::stringify!($field)),*],
                            |bag| ::core::result::Result::Ok($ty {
                                $($field: bag.take(::core::stringify!($field))?),*
                            }),
                        )
                        .build()
                })
            }
        }
    };
    ($ty:ident: Default $(as $tag:literal)? { $($field:ident),* $(,)? }) => {
        $crate::impl_record!(@reflect $ty);

        impl $crate::info::Typed for $ty {
            fn descriptor() -> &'static $crate::info::TypeDescriptor {
                static CELL: $crate::info::DescriptorCell = $crate::info::DescriptorCell::new();
                CELL.get_or_init(|| {
                    $crate::info::RecordBuilder::<$ty>::new()
                        $(.tag($tag))?
                        $(.public_field(
                            ::core::stringify!($field),
                            |value| &value.$field,
                            |value| &mut value.$field,
                        ))*
                        .default_shell()
                        .build()
                })
            }
        }
    };
    (@reflect $ty:ident) => {
        impl $crate::Reflect for $ty {
            #[inline]
            fn represented_descriptor(&self) -> &'static $crate::info::TypeDescriptor {
                <Self as $crate::info::Typed>::descriptor()
            }

            #[inline]
            fn reflect_ref(&self) -> $crate::ReflectRef<'_> {
                $crate::ReflectRef::Record
            }

            $crate::reflect_casts!();
        }
    };
}

/// Implements [`Reflect`](crate::Reflect) and [`Typed`](crate::info::Typed)
/// for a unit struct with exactly one value.
///
/// # Examples
///
/// ```
/// use vc_pickle::info::{TypeKind, Typed};
///
/// pub struct Nothing;
/// vc_pickle::impl_singleton!(Nothing);
///
/// assert!(matches!(<Nothing as Typed>::descriptor().kind(), TypeKind::Singleton(_)));
/// ```
#[macro_export]
macro_rules! impl_singleton {
    ($ty:ident $(as $tag:literal)?) => {
        impl $crate::Reflect for $ty {
            #[inline]
            fn represented_descriptor(&self) -> &'static $crate::info::TypeDescriptor {
                <Self as $crate::info::Typed>::descriptor()
            }

            #[inline]
            fn reflect_ref(&self) -> $crate::ReflectRef<'_> {
                $crate::ReflectRef::Singleton
            }

            $crate::reflect_casts!();
        }

        impl $crate::info::Typed for $ty {
            fn descriptor() -> &'static $crate::info::TypeDescriptor {
                static CELL: $crate::info::DescriptorCell = $crate::info::DescriptorCell::new();
                CELL.get_or_init(|| {
                    $crate::info::TypeDescriptor::singleton::<$ty>(
                        || -> ::std::boxed::Box<dyn $crate::Reflect> { ::std::boxed::Box::new($ty) },
                    )
                    $(.with_tag($tag))?
                })
            }
        }
    };
}

/// Implements [`Typed`](crate::info::Typed) for a trait object type.
///
/// The trait must have [`Reflect`](crate::Reflect) as a supertrait. The
/// listed types are the closed alternatives, tried in order. Other
/// implementors are reached through [`register_subtype!`](crate::register_subtype).
///
/// # Examples
///
/// ```
/// use vc_pickle::{Reflect, Ref, impl_hierarchy, impl_record, shared};
///
/// pub trait Shape: Reflect {
///     fn area(&self) -> f64;
/// }
///
/// pub struct Square {
///     pub side: f64,
/// }
/// impl_record!(Square { side });
///
/// impl Shape for Square {
///     fn area(&self) -> f64 {
///         self.side * self.side
///     }
/// }
///
/// impl_hierarchy!(dyn Shape { Square });
///
/// let shape: Ref<dyn Shape> = shared(Square { side: 2.0 });
/// assert_eq!(shape.borrow().area(), 4.0);
/// ```
#[macro_export]
macro_rules! impl_hierarchy {
    ($base:ty { $($alt:ty),* $(,)? }) => {
        impl $crate::info::Typed for $base {
            fn descriptor() -> &'static $crate::info::TypeDescriptor {
                static CELL: $crate::info::DescriptorCell = $crate::info::DescriptorCell::new();
                CELL.get_or_init(|| {
                    $crate::info::TypeDescriptor::open::<$base>(::std::vec![$(
                        $crate::info::Alternative::new(
                            <$alt as $crate::info::Typed>::descriptor,
                            $crate::__upcast!($base => $alt),
                        )
                    ),*])
                })
            }
        }
    };
}

/// Registers a runtime subtype of an open hierarchy with a
/// [`CodecRegistry`](crate::CodecRegistry).
///
/// # Examples
///
/// ```ignore
/// register_subtype!(registry, dyn Shape => Triangle);
/// ```
#[macro_export]
macro_rules! register_subtype {
    ($registry:expr, $base:ty => $ty:ty) => {
        $registry.register_subtype(
            <$base as $crate::info::Typed>::descriptor(),
            <$ty as $crate::info::Typed>::descriptor(),
            $crate::__upcast!($base => $ty),
        )
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __upcast {
    ($base:ty => $ty:ty) => {
        |object: ::std::rc::Rc<dyn ::core::any::Any>|
         -> ::core::option::Option<::std::boxed::Box<dyn $crate::Reflect>> {
            let concrete: $crate::Ref<$ty> = object.downcast().ok()?;
            let upcast: $crate::Ref<$base> = concrete;
            ::core::option::Option::Some(::std::boxed::Box::new(upcast))
        }
    };
}

/// Declares a registration applied by [`CodecRegistry::auto_register`](crate::CodecRegistry::auto_register).
///
/// `auto_register!(T)` registers the tag of `T`, `auto_register!(dyn Base => T)`
/// registers `T` as a runtime subtype of `dyn Base`. Does nothing when the
/// `auto_register` feature is disabled.
///
/// # Examples
///
/// ```ignore
/// auto_register!(Point);
/// auto_register!(dyn Shape => Triangle);
/// ```
#[cfg(feature = "auto_register")]
#[macro_export]
macro_rules! auto_register {
    ($base:ty => $ty:ty) => {
        $crate::__macro_exports::inventory::submit! {
            $crate::__macro_exports::AutoRegistration {
                register: |registry| {
                    $crate::register_subtype!(registry, $base => $ty);
                },
            }
        }
    };
    ($ty:ty) => {
        $crate::__macro_exports::inventory::submit! {
            $crate::__macro_exports::AutoRegistration {
                register: |registry| registry.register::<$ty>(),
            }
        }
    };
}

/// Declares a registration applied by [`CodecRegistry::auto_register`](crate::CodecRegistry::auto_register).
#[cfg(not(feature = "auto_register"))]
#[macro_export]
macro_rules! auto_register {
    ($base:ty => $ty:ty) => {};
    ($ty:ty) => {};
}
