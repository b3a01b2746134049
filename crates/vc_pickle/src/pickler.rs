//! Top-level entry points.

use crate::dispatch::{ReadContext, WriteContext};
use crate::error::PickleError;
use crate::format::{Builder, Format, Reader};
use crate::info::Typed;
use crate::reflect::Reflect;
use crate::registry::CodecRegistry;

/// Whether shared references are deduplicated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SharingMode {
    /// Every [`Ref`](crate::Ref) is written once, repeats become
    /// back-references.
    #[default]
    Auto,
    /// Every [`Ref`](crate::Ref) is written in full. Cycles hit the depth
    /// limit.
    Disabled,
}

impl SharingMode {
    #[inline]
    pub fn is_enabled(self) -> bool {
        self == Self::Auto
    }
}

/// Options of one top-level call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PickleOptions {
    pub sharing: SharingMode,
    /// Maximum nesting of values. Exceeding it fails with
    /// [`PickleError::DepthLimit`].
    ///
    /// Every level is a native recursion, so this also bounds stack use.
    pub max_depth: usize,
}

impl PickleOptions {
    pub const DEFAULT_MAX_DEPTH: usize = 1024;

    #[inline]
    pub fn with_sharing(mut self, sharing: SharingMode) -> Self {
        self.sharing = sharing;
        self
    }

    #[inline]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Default for PickleOptions {
    fn default() -> Self {
        Self {
            sharing: SharingMode::Auto,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }
}

// -----------------------------------------------------------------------------
// Pickler

/// Serializes and deserializes object graphs against one registry.
///
/// Every call owns a fresh identity registry, so object ids never leak from
/// one call into the next.
#[derive(Clone, Copy)]
pub struct Pickler<'r> {
    registry: &'r CodecRegistry,
    options: PickleOptions,
}

impl Default for Pickler<'static> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Pickler<'static> {
    /// A pickler over the [global](CodecRegistry::global) registry.
    #[inline]
    pub fn new() -> Self {
        Self::with_registry(CodecRegistry::global())
    }
}

impl<'r> Pickler<'r> {
    #[inline]
    pub fn with_registry(registry: &'r CodecRegistry) -> Self {
        Self {
            registry,
            options: PickleOptions::default(),
        }
    }

    #[inline]
    pub fn with_options(mut self, options: PickleOptions) -> Self {
        self.options = options;
        self
    }

    #[inline]
    pub fn options(&self) -> &PickleOptions {
        &self.options
    }

    #[inline]
    pub fn registry(&self) -> &'r CodecRegistry {
        self.registry
    }

    /// Writes `value` as the top-level object of a new encoding.
    pub fn serialize<T, F>(&self, format: &F, value: &T) -> Result<F::Output, PickleError>
    where
        T: Reflect + Typed,
        F: Format,
    {
        let mut builder = format.builder();
        self.serialize_into(&mut builder, value)?;
        format.result(builder)
    }

    /// Writes `value` into an existing builder.
    pub fn serialize_into<T>(&self, builder: &mut dyn Builder, value: &T) -> Result<(), PickleError>
    where
        T: Reflect + Typed,
    {
        let declared = T::descriptor();
        self.registry.register_descriptor(declared);
        let mut cx = WriteContext::new(self.registry, self.options);
        cx.write_value(builder, declared, value)
    }

    /// Reads the top-level object of an encoding as a `T`.
    pub fn deserialize<T, F>(&self, format: &F, input: &F::Input) -> Result<T, PickleError>
    where
        T: Reflect + Typed,
        F: Format,
    {
        format.read(input, |reader| self.deserialize_top_level(reader))
    }

    /// Reads one top-level `T` from an existing reader.
    ///
    /// The counterpart of [`serialize_into`](Self::serialize_into). Input
    /// left after the object is not checked. With `T` set to
    /// [`Ref<dyn Reflect>`](crate::Ref) the type is taken from the tag, which
    /// must be known to the registry.
    pub fn deserialize_top_level<T>(&self, reader: &mut dyn Reader) -> Result<T, PickleError>
    where
        T: Reflect + Typed,
    {
        let declared = T::descriptor();
        self.registry.register_descriptor(declared);
        let mut cx = ReadContext::new(self.registry, self.options);
        cx.read_value(reader, declared)?.take::<T>()
    }
}

// -----------------------------------------------------------------------------
// Free functions

/// Serializes `value` with the global registry and default options.
///
/// # Examples
///
/// ```
/// use vc_pickle::{Ref, shared};
/// use vc_pickle_format::JsonFormat;
///
/// let list: Vec<Ref<String>> = {
///     let item = shared(String::from("same"));
///     vec![item.clone(), item]
/// };
/// let json = vc_pickle::serialize(&JsonFormat, &list).unwrap();
/// let back: Vec<Ref<String>> = vc_pickle::deserialize(&JsonFormat, &json).unwrap();
/// assert_eq!(*back[0].borrow(), "same");
/// ```
#[inline]
pub fn serialize<T, F>(format: &F, value: &T) -> Result<F::Output, PickleError>
where
    T: Reflect + Typed,
    F: Format,
{
    Pickler::new().serialize(format, value)
}

/// Serializes `value` into `builder` with the global registry.
#[inline]
pub fn serialize_into<T>(builder: &mut dyn Builder, value: &T) -> Result<(), PickleError>
where
    T: Reflect + Typed,
{
    Pickler::new().serialize_into(builder, value)
}

/// Deserializes a `T` with the global registry and default options.
#[inline]
pub fn deserialize<T, F>(format: &F, input: &F::Input) -> Result<T, PickleError>
where
    T: Reflect + Typed,
    F: Format,
{
    Pickler::new().deserialize(format, input)
}

/// Deserializes a `T` from `reader` with the global registry.
///
/// # Examples
///
/// ```
/// use vc_pickle_format::{BinaryBuilder, BinaryReader};
///
/// let mut builder = BinaryBuilder::new();
/// vc_pickle::serialize_into(&mut builder, &7_u8).unwrap();
/// vc_pickle::serialize_into(&mut builder, &String::from("next")).unwrap();
/// let bytes = builder.into_bytes();
///
/// let mut reader = BinaryReader::new(&bytes);
/// let first: u8 = vc_pickle::deserialize_top_level(&mut reader).unwrap();
/// let second: String = vc_pickle::deserialize_top_level(&mut reader).unwrap();
/// assert_eq!((first, second.as_str()), (7, "next"));
/// assert_eq!(reader.remaining(), 0);
/// ```
#[inline]
pub fn deserialize_top_level<T>(reader: &mut dyn Reader) -> Result<T, PickleError>
where
    T: Reflect + Typed,
{
    Pickler::new().deserialize_top_level(reader)
}
