//! The boundary between the engine and a wire format.
//!
//! A format supplies a [`Builder`] for writing and a [`Reader`] for reading.
//! The engine drives both with one call sequence per entry:
//!
//! ```text
//! hints*  begin_entry  (put_field* | collection | nothing)  end_entry
//! ```
//!
//! Hints apply to the next `begin_entry` only.

use crate::error::PickleError;
use crate::identity::ObjectId;
use crate::info::{Primitive, PrimitiveArray, PrimitiveKind, PrimitiveSlice};

/// Tag reported by [`Reader::begin_entry`] for an absent value.
pub const NULL_TAG: &str = "$null";

/// Tag reported by [`Reader::begin_entry`] for a back-reference.
///
/// The object id follows as a [`PrimitiveKind::U32`] read from the same entry.
pub const REF_TAG: &str = "$ref";

/// The payload of one entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Entry<'a> {
    Null,
    /// Same object as the one registered under the id.
    BackRef(ObjectId),
    Primitive(Primitive),
    Str(&'a str),
    PrimitiveArray(PrimitiveSlice<'a>),
    /// Followed by one `put_field` per field.
    Object,
    /// Followed by a collection.
    Sequence,
}

/// Body of a field or collection element.
pub type WriteBody<'a> = dyn FnMut(&mut dyn Builder) -> Result<(), PickleError> + 'a;

// -----------------------------------------------------------------------------
// Builder

/// The write half of a format.
pub trait Builder {
    /// The encoded size of the next entry, when known in advance.
    fn hint_known_size(&mut self, size: usize);

    /// The type tag of the next entry.
    fn hint_tag(&mut self, tag: &str);

    /// The reader knows the type statically, the tag may be omitted.
    fn hint_statically_elided_type(&mut self);

    /// The runtime type equals the declared type, the tag may be omitted.
    fn hint_dynamically_elided_type(&mut self);

    /// The object id assigned to the next entry.
    fn hint_oid(&mut self, oid: ObjectId);

    fn begin_entry(&mut self, entry: Entry<'_>) -> Result<(), PickleError>;

    /// Writes one field of the current object entry.
    fn put_field(&mut self, name: &str, body: &mut WriteBody<'_>) -> Result<(), PickleError>;

    fn begin_collection(&mut self, len: usize) -> Result<(), PickleError>;

    fn put_element(&mut self, body: &mut WriteBody<'_>) -> Result<(), PickleError>;

    fn end_collection(&mut self) -> Result<(), PickleError>;

    fn end_entry(&mut self) -> Result<(), PickleError>;
}

// -----------------------------------------------------------------------------
// Reader

/// The read half of a format.
pub trait Reader {
    /// The declared type tag of the next entry.
    fn hint_tag(&mut self, tag: &str);

    fn hint_statically_elided_type(&mut self);

    fn hint_dynamically_elided_type(&mut self);

    /// Starts the next entry and returns its tag.
    ///
    /// Returns [`NULL_TAG`] and [`REF_TAG`] for null and back-reference
    /// entries, and the hinted tag when the tag was elided.
    fn begin_entry(&mut self) -> Result<String, PickleError>;

    fn read_primitive(&mut self, kind: PrimitiveKind) -> Result<Primitive, PickleError>;

    fn read_str(&mut self) -> Result<String, PickleError>;

    fn read_primitive_array(&mut self, kind: PrimitiveKind) -> Result<PrimitiveArray, PickleError>;

    /// A reader scoped to one field of the current object entry.
    fn read_field(&mut self, name: &str) -> Result<Box<dyn Reader + '_>, PickleError>;

    /// Starts a collection and returns its length.
    fn begin_collection(&mut self) -> Result<usize, PickleError>;

    fn read_element(&mut self) -> Result<Box<dyn Reader + '_>, PickleError>;

    fn end_collection(&mut self) -> Result<(), PickleError>;

    fn end_entry(&mut self) -> Result<(), PickleError>;
}

impl<R: Reader + ?Sized> Reader for &mut R {
    #[inline]
    fn hint_tag(&mut self, tag: &str) {
        (**self).hint_tag(tag);
    }

    #[inline]
    fn hint_statically_elided_type(&mut self) {
        (**self).hint_statically_elided_type();
    }

    #[inline]
    fn hint_dynamically_elided_type(&mut self) {
        (**self).hint_dynamically_elided_type();
    }

    #[inline]
    fn begin_entry(&mut self) -> Result<String, PickleError> {
        (**self).begin_entry()
    }

    #[inline]
    fn read_primitive(&mut self, kind: PrimitiveKind) -> Result<Primitive, PickleError> {
        (**self).read_primitive(kind)
    }

    #[inline]
    fn read_str(&mut self) -> Result<String, PickleError> {
        (**self).read_str()
    }

    #[inline]
    fn read_primitive_array(&mut self, kind: PrimitiveKind) -> Result<PrimitiveArray, PickleError> {
        (**self).read_primitive_array(kind)
    }

    #[inline]
    fn read_field(&mut self, name: &str) -> Result<Box<dyn Reader + '_>, PickleError> {
        (**self).read_field(name)
    }

    #[inline]
    fn begin_collection(&mut self) -> Result<usize, PickleError> {
        (**self).begin_collection()
    }

    #[inline]
    fn read_element(&mut self) -> Result<Box<dyn Reader + '_>, PickleError> {
        (**self).read_element()
    }

    #[inline]
    fn end_collection(&mut self) -> Result<(), PickleError> {
        (**self).end_collection()
    }

    #[inline]
    fn end_entry(&mut self) -> Result<(), PickleError> {
        (**self).end_entry()
    }
}

// -----------------------------------------------------------------------------
// Format

/// A concrete wire format.
pub trait Format {
    type Builder: Builder;
    /// The encoded form produced by a finished builder.
    type Output;
    /// The encoded form consumed by a reader.
    type Input: ?Sized;

    fn builder(&self) -> Self::Builder;

    /// Finishes a builder. Corresponds to `result()` of the write protocol.
    fn result(&self, builder: Self::Builder) -> Result<Self::Output, PickleError>;

    /// Runs `f` over a reader of `input`.
    fn read<R>(
        &self,
        input: &Self::Input,
        f: impl FnOnce(&mut dyn Reader) -> Result<R, PickleError>,
    ) -> Result<R, PickleError>;
}
