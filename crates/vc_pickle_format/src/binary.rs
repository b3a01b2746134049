//! A compact little-endian binary format.
//!
//! Every entry starts with a one byte [`marker`]:
//!
//! ```text
//! NULL                          absent value
//! BACK_REF  u32                 object id
//! TAGGED    u32 len, utf8 tag   payload
//! ELIDED                        payload, the reader knows the type
//! ```
//!
//! Payloads are fixed-width primitives, length-prefixed strings and arrays,
//! the fields of a record in order, or a length-prefixed element list.
//! Object ids are not written: both sides number shared objects in
//! discovery order.

use vc_pickle::PickleError;
use vc_pickle::format::{Builder, Entry, Format, NULL_TAG, REF_TAG, Reader, WriteBody};
use vc_pickle::identity::ObjectId;
use vc_pickle::info::{Primitive, PrimitiveArray, PrimitiveKind};

/// Entry markers.
pub mod marker {
    pub const NULL: u8 = 0;
    pub const BACK_REF: u8 = 1;
    pub const TAGGED: u8 = 2;
    pub const ELIDED: u8 = 3;
}

fn length(len: usize) -> Result<u32, PickleError> {
    u32::try_from(len).map_err(|_| PickleError::Encode(format!("length {len} exceeds u32")))
}

// -----------------------------------------------------------------------------
// BinaryBuilder

/// Writes entries into a byte buffer.
#[derive(Debug, Default)]
pub struct BinaryBuilder {
    out: Vec<u8>,
    tag: Option<String>,
    elided: bool,
    size: Option<usize>,
    hinted_sizes: Vec<usize>,
}

impl BinaryBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// The bytes written so far.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.out
    }

    /// Every size hint received, in order.
    #[inline]
    pub fn hinted_sizes(&self) -> &[usize] {
        &self.hinted_sizes
    }

    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    fn put_u32(&mut self, value: u32) {
        self.out.extend_from_slice(&value.to_le_bytes());
    }

    fn put_str(&mut self, text: &str) -> Result<(), PickleError> {
        self.put_u32(length(text.len())?);
        self.out.extend_from_slice(text.as_bytes());
        Ok(())
    }

    fn put_primitive(&mut self, value: Primitive) {
        match value {
            Primitive::Bool(v) => self.out.push(u8::from(v)),
            Primitive::I8(v) => self.out.extend_from_slice(&v.to_le_bytes()),
            Primitive::I16(v) => self.out.extend_from_slice(&v.to_le_bytes()),
            Primitive::I32(v) => self.out.extend_from_slice(&v.to_le_bytes()),
            Primitive::I64(v) => self.out.extend_from_slice(&v.to_le_bytes()),
            Primitive::U8(v) => self.out.push(v),
            Primitive::U16(v) => self.out.extend_from_slice(&v.to_le_bytes()),
            Primitive::U32(v) => self.put_u32(v),
            Primitive::U64(v) => self.out.extend_from_slice(&v.to_le_bytes()),
            Primitive::F32(v) => self.out.extend_from_slice(&v.to_le_bytes()),
            Primitive::F64(v) => self.out.extend_from_slice(&v.to_le_bytes()),
            Primitive::Char(v) => self.put_u32(u32::from(v)),
        }
    }

    fn put_header(&mut self) -> Result<(), PickleError> {
        if let Some(size) = self.size.take() {
            self.out.reserve(size);
            self.hinted_sizes.push(size);
        }
        let tag = self.tag.take();
        if core::mem::take(&mut self.elided) {
            self.out.push(marker::ELIDED);
            return Ok(());
        }
        let tag = tag.ok_or_else(|| PickleError::Encode("entry without a type tag".into()))?;
        self.out.push(marker::TAGGED);
        self.put_str(&tag)
    }

    fn clear_hints(&mut self) {
        self.tag = None;
        self.elided = false;
        self.size = None;
    }
}

impl Builder for BinaryBuilder {
    #[inline]
    fn hint_known_size(&mut self, size: usize) {
        self.size = Some(size);
    }

    #[inline]
    fn hint_tag(&mut self, tag: &str) {
        self.tag = Some(tag.into());
    }

    #[inline]
    fn hint_statically_elided_type(&mut self) {
        self.elided = true;
    }

    #[inline]
    fn hint_dynamically_elided_type(&mut self) {
        self.elided = true;
    }

    // Ids are implicit in discovery order.
    #[inline]
    fn hint_oid(&mut self, _oid: ObjectId) {}

    fn begin_entry(&mut self, entry: Entry<'_>) -> Result<(), PickleError> {
        match entry {
            Entry::Null => {
                self.clear_hints();
                self.out.push(marker::NULL);
            }
            Entry::BackRef(id) => {
                self.clear_hints();
                self.out.push(marker::BACK_REF);
                self.put_u32(id.get());
            }
            Entry::Primitive(value) => {
                self.put_header()?;
                self.put_primitive(value);
            }
            Entry::Str(text) => {
                self.put_header()?;
                self.put_str(text)?;
            }
            Entry::PrimitiveArray(items) => {
                self.put_header()?;
                self.put_u32(length(items.len())?);
                for item in items.iter() {
                    self.put_primitive(item);
                }
            }
            Entry::Object | Entry::Sequence => self.put_header()?,
        }
        Ok(())
    }

    #[inline]
    fn put_field(&mut self, _name: &str, body: &mut WriteBody<'_>) -> Result<(), PickleError> {
        body(self)
    }

    fn begin_collection(&mut self, len: usize) -> Result<(), PickleError> {
        self.put_u32(length(len)?);
        Ok(())
    }

    #[inline]
    fn put_element(&mut self, body: &mut WriteBody<'_>) -> Result<(), PickleError> {
        body(self)
    }

    #[inline]
    fn end_collection(&mut self) -> Result<(), PickleError> {
        Ok(())
    }

    #[inline]
    fn end_entry(&mut self) -> Result<(), PickleError> {
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// BinaryReader

/// Reads entries from a byte slice.
#[derive(Debug)]
pub struct BinaryReader<'a> {
    input: &'a [u8],
    pos: usize,
    tag: Option<String>,
    elided: bool,
}

impl<'a> BinaryReader<'a> {
    #[inline]
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            tag: None,
            elided: false,
        }
    }

    /// Bytes not consumed yet.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], PickleError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.input.len())
            .ok_or_else(|| {
                PickleError::Decode(format!("unexpected end of input at {}", self.pos))
            })?;
        let bytes = &self.input[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], PickleError> {
        let mut bytes = [0; N];
        bytes.copy_from_slice(self.take(N)?);
        Ok(bytes)
    }

    fn take_u8(&mut self) -> Result<u8, PickleError> {
        Ok(self.take_array::<1>()?[0])
    }

    fn take_u32(&mut self) -> Result<u32, PickleError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    fn take_len(&mut self) -> Result<usize, PickleError> {
        let len = self.take_u32()? as usize;
        if len > self.remaining() {
            return Err(PickleError::Decode(format!(
                "length {len} exceeds the remaining input"
            )));
        }
        Ok(len)
    }

    fn take_str(&mut self) -> Result<String, PickleError> {
        let len = self.take_len()?;
        let bytes = self.take(len)?;
        core::str::from_utf8(bytes)
            .map(String::from)
            .map_err(|err| PickleError::Decode(err.to_string()))
    }

    fn take_primitive(&mut self, kind: PrimitiveKind) -> Result<Primitive, PickleError> {
        Ok(match kind {
            PrimitiveKind::Bool => match self.take_u8()? {
                0 => Primitive::Bool(false),
                1 => Primitive::Bool(true),
                other => return Err(PickleError::Decode(format!("invalid bool byte {other}"))),
            },
            PrimitiveKind::I8 => Primitive::I8(i8::from_le_bytes(self.take_array()?)),
            PrimitiveKind::I16 => Primitive::I16(i16::from_le_bytes(self.take_array()?)),
            PrimitiveKind::I32 => Primitive::I32(i32::from_le_bytes(self.take_array()?)),
            PrimitiveKind::I64 => Primitive::I64(i64::from_le_bytes(self.take_array()?)),
            PrimitiveKind::U8 => Primitive::U8(self.take_u8()?),
            PrimitiveKind::U16 => Primitive::U16(u16::from_le_bytes(self.take_array()?)),
            PrimitiveKind::U32 => Primitive::U32(self.take_u32()?),
            PrimitiveKind::U64 => Primitive::U64(u64::from_le_bytes(self.take_array()?)),
            PrimitiveKind::F32 => Primitive::F32(f32::from_le_bytes(self.take_array()?)),
            PrimitiveKind::F64 => Primitive::F64(f64::from_le_bytes(self.take_array()?)),
            PrimitiveKind::Char => {
                let code = self.take_u32()?;
                let value = char::from_u32(code)
                    .ok_or_else(|| PickleError::Decode(format!("invalid char {code:#x}")))?;
                Primitive::Char(value)
            }
        })
    }
}

impl Reader for BinaryReader<'_> {
    #[inline]
    fn hint_tag(&mut self, tag: &str) {
        self.tag = Some(tag.into());
    }

    #[inline]
    fn hint_statically_elided_type(&mut self) {
        self.elided = true;
    }

    #[inline]
    fn hint_dynamically_elided_type(&mut self) {
        self.elided = true;
    }

    fn begin_entry(&mut self) -> Result<String, PickleError> {
        let hinted = self.tag.take();
        let elidable = core::mem::take(&mut self.elided);
        match self.take_u8()? {
            marker::NULL => Ok(NULL_TAG.into()),
            marker::BACK_REF => Ok(REF_TAG.into()),
            marker::TAGGED => self.take_str(),
            marker::ELIDED => match hinted {
                Some(tag) if elidable => Ok(tag),
                _ => Err(PickleError::Decode("elided type without a known tag".into())),
            },
            other => Err(PickleError::Decode(format!("invalid entry marker {other}"))),
        }
    }

    #[inline]
    fn read_primitive(&mut self, kind: PrimitiveKind) -> Result<Primitive, PickleError> {
        self.take_primitive(kind)
    }

    #[inline]
    fn read_str(&mut self) -> Result<String, PickleError> {
        self.take_str()
    }

    fn read_primitive_array(&mut self, kind: PrimitiveKind) -> Result<PrimitiveArray, PickleError> {
        let len = self.take_u32()? as usize;
        if len.saturating_mul(kind.size()) > self.remaining() {
            return Err(PickleError::Decode(format!(
                "array of {len} {kind} exceeds the remaining input"
            )));
        }
        let mut items = PrimitiveArray::with_capacity(kind, len);
        for _ in 0..len {
            items.push(self.take_primitive(kind)?)?;
        }
        Ok(items)
    }

    #[inline]
    fn read_field(&mut self, _name: &str) -> Result<Box<dyn Reader + '_>, PickleError> {
        Ok(Box::new(self))
    }

    fn begin_collection(&mut self) -> Result<usize, PickleError> {
        self.take_len()
    }

    #[inline]
    fn read_element(&mut self) -> Result<Box<dyn Reader + '_>, PickleError> {
        Ok(Box::new(self))
    }

    #[inline]
    fn end_collection(&mut self) -> Result<(), PickleError> {
        Ok(())
    }

    #[inline]
    fn end_entry(&mut self) -> Result<(), PickleError> {
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// BinaryFormat

/// The binary format. Encodes into a `Vec<u8>`.
///
/// # Examples
///
/// ```
/// use vc_pickle_format::BinaryFormat;
///
/// let bytes = vc_pickle::serialize(&BinaryFormat, &vec![1_u16, 2, 3]).unwrap();
/// let back: Vec<u16> = vc_pickle::deserialize(&BinaryFormat, bytes.as_slice()).unwrap();
/// assert_eq!(back, [1, 2, 3]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryFormat;

impl Format for BinaryFormat {
    type Builder = BinaryBuilder;
    type Output = Vec<u8>;
    type Input = [u8];

    #[inline]
    fn builder(&self) -> Self::Builder {
        BinaryBuilder::new()
    }

    fn result(&self, builder: Self::Builder) -> Result<Self::Output, PickleError> {
        log::trace!("binary encoding finished with {} bytes", builder.out.len());
        Ok(builder.into_bytes())
    }

    fn read<R>(
        &self,
        input: &Self::Input,
        f: impl FnOnce(&mut dyn Reader) -> Result<R, PickleError>,
    ) -> Result<R, PickleError> {
        let mut reader = BinaryReader::new(input);
        let value = f(&mut reader)?;
        match reader.remaining() {
            0 => Ok(value),
            trailing => Err(PickleError::Decode(format!("{trailing} trailing bytes"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use vc_pickle::format::{Builder, Entry, Reader};
    use vc_pickle::info::{Primitive, PrimitiveKind};

    use super::{BinaryBuilder, BinaryReader, marker};

    #[test]
    fn elided_entries_use_the_hinted_tag() {
        let mut builder = BinaryBuilder::new();
        builder.hint_tag("i32");
        builder.hint_statically_elided_type();
        builder.begin_entry(Entry::Primitive(Primitive::I32(-2))).unwrap();
        builder.end_entry().unwrap();
        assert_eq!(builder.as_bytes(), [marker::ELIDED, 0xfe, 0xff, 0xff, 0xff]);

        let bytes = builder.into_bytes();
        let mut reader = BinaryReader::new(&bytes);
        reader.hint_tag("i32");
        reader.hint_statically_elided_type();
        assert_eq!(reader.begin_entry().unwrap(), "i32");
        assert_eq!(
            reader.read_primitive(PrimitiveKind::I32).unwrap(),
            Primitive::I32(-2)
        );
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn tagged_entries_carry_their_tag() {
        let mut builder = BinaryBuilder::new();
        builder.hint_tag("text");
        builder.begin_entry(Entry::Str("hi")).unwrap();
        let bytes = builder.into_bytes();
        assert_eq!(bytes[0], marker::TAGGED);

        let mut reader = BinaryReader::new(&bytes);
        assert_eq!(reader.begin_entry().unwrap(), "text");
        assert_eq!(reader.read_str().unwrap(), "hi");
    }

    #[test]
    fn truncated_input_is_a_decode_error() {
        let mut reader = BinaryReader::new(&[marker::TAGGED, 9, 0, 0, 0, b'a']);
        assert!(reader.begin_entry().is_err());
        let mut reader = BinaryReader::new(&[7]);
        assert!(reader.begin_entry().is_err());
    }
}
