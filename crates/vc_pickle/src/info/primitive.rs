use core::fmt;

use crate::error::PickleError;
use crate::reflect::Reflect;

/// Size of the length prefix written before arrays and strings.
pub const LENGTH_PREFIX_SIZE: usize = 4;

macro_rules! define_primitives {
    ($($variant:ident => $ty:ty, $size:literal;)*) => {
        /// The closed set of primitive scalar kinds.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum PrimitiveKind {
            $($variant,)*
        }

        impl PrimitiveKind {
            /// The fixed encoded size of one value of this kind, in bytes.
            ///
            /// # Examples
            ///
            /// ```
            /// use vc_pickle::info::PrimitiveKind;
            ///
            /// assert_eq!(PrimitiveKind::I32.size(), 4);
            /// assert_eq!(PrimitiveKind::U16.size(), 2);
            /// assert_eq!(PrimitiveKind::Bool.size(), 1);
            /// ```
            #[inline]
            pub const fn size(self) -> usize {
                match self {
                    $(Self::$variant => $size,)*
                }
            }

            /// The Rust name of the kind, e.g. `"i32"`.
            #[inline]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($ty),)*
                }
            }
        }

        /// A single primitive value.
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub enum Primitive {
            $($variant($ty),)*
        }

        impl Primitive {
            #[inline]
            pub const fn kind(&self) -> PrimitiveKind {
                match self {
                    $(Self::$variant(_) => PrimitiveKind::$variant,)*
                }
            }

            /// Boxes the value as its Rust type.
            pub fn into_reflect(self) -> Box<dyn Reflect> {
                match self {
                    $(Self::$variant(value) => Box::new(value),)*
                }
            }
        }

        /// A borrowed slice of primitives, as seen through a `Vec<T>`.
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub enum PrimitiveSlice<'a> {
            $($variant(&'a [$ty]),)*
        }

        impl<'a> PrimitiveSlice<'a> {
            #[inline]
            pub const fn kind(&self) -> PrimitiveKind {
                match self {
                    $(Self::$variant(_) => PrimitiveKind::$variant,)*
                }
            }

            #[inline]
            pub const fn len(&self) -> usize {
                match self {
                    $(Self::$variant(items) => items.len(),)*
                }
            }

            #[inline]
            pub const fn is_empty(&self) -> bool {
                self.len() == 0
            }

            pub fn get(&self, index: usize) -> Option<Primitive> {
                match self {
                    $(Self::$variant(items) => items.get(index).copied().map(Primitive::$variant),)*
                }
            }

            pub fn iter(self) -> impl Iterator<Item = Primitive> + 'a {
                (0..self.len()).filter_map(move |index| self.get(index))
            }
        }

        /// An owned array of primitives, produced while decoding.
        #[derive(Debug, Clone, PartialEq)]
        pub enum PrimitiveArray {
            $($variant(Vec<$ty>),)*
        }

        impl PrimitiveArray {
            pub fn with_capacity(kind: PrimitiveKind, capacity: usize) -> Self {
                match kind {
                    $(PrimitiveKind::$variant => Self::$variant(Vec::with_capacity(capacity)),)*
                }
            }

            #[inline]
            pub fn empty(kind: PrimitiveKind) -> Self {
                Self::with_capacity(kind, 0)
            }

            #[inline]
            pub const fn kind(&self) -> PrimitiveKind {
                match self {
                    $(Self::$variant(_) => PrimitiveKind::$variant,)*
                }
            }

            pub fn as_slice(&self) -> PrimitiveSlice<'_> {
                match self {
                    $(Self::$variant(items) => PrimitiveSlice::$variant(items),)*
                }
            }

            /// Appends a value, failing when its kind differs from the array's.
            pub fn push(&mut self, value: Primitive) -> Result<(), PickleError> {
                match (self, value) {
                    $((Self::$variant(items), Primitive::$variant(value)) => {
                        items.push(value);
                        Ok(())
                    })*
                    (this, value) => Err(PickleError::mismatch(
                        this.kind().name(),
                        value.kind().name(),
                    )),
                }
            }

            /// Boxes the array as `Vec<T>`.
            pub fn into_reflect(self) -> Box<dyn Reflect> {
                match self {
                    $(Self::$variant(items) => Box::new(items),)*
                }
            }
        }

        $(
            impl PrimitiveType for $ty {
                const KIND: PrimitiveKind = PrimitiveKind::$variant;

                #[inline]
                fn into_primitive(self) -> Primitive {
                    Primitive::$variant(self)
                }

                #[inline]
                fn slice(items: &[Self]) -> PrimitiveSlice<'_> {
                    PrimitiveSlice::$variant(items)
                }
            }
        )*
    };
}

define_primitives! {
    Bool => bool, 1;
    I8 => i8, 1;
    I16 => i16, 2;
    I32 => i32, 4;
    I64 => i64, 8;
    U8 => u8, 1;
    U16 => u16, 2;
    U32 => u32, 4;
    U64 => u64, 8;
    F32 => f32, 4;
    F64 => f64, 8;
    Char => char, 4;
}

/// Rust types that map onto a [`PrimitiveKind`].
pub trait PrimitiveType: Copy + 'static {
    const KIND: PrimitiveKind;

    fn into_primitive(self) -> Primitive;

    fn slice(items: &[Self]) -> PrimitiveSlice<'_>;
}

impl fmt::Display for PrimitiveKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Primitive {
    /// Reads the value as an object id or collection length.
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Self::U32(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_follow_widths() {
        assert_eq!(PrimitiveKind::Bool.size(), 1);
        assert_eq!(PrimitiveKind::I8.size(), 1);
        assert_eq!(PrimitiveKind::U16.size(), 2);
        assert_eq!(PrimitiveKind::F32.size(), 4);
        assert_eq!(PrimitiveKind::Char.size(), 4);
        assert_eq!(PrimitiveKind::I64.size(), 8);
        assert_eq!(PrimitiveKind::F64.size(), 8);
    }

    #[test]
    fn array_rejects_foreign_kind() {
        let mut array = PrimitiveArray::empty(PrimitiveKind::U16);
        array.push(Primitive::U16(7)).unwrap();
        assert!(array.push(Primitive::I32(7)).is_err());
        assert_eq!(array.as_slice().len(), 1);
        assert_eq!(array.as_slice().get(0), Some(Primitive::U16(7)));
    }
}
