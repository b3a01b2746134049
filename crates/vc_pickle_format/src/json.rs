//! A [`serde_json::Value`] based format.
//!
//! Records become objects keyed by field name. Type tags, object ids and
//! back-references use reserved keys:
//!
//! ```text
//! {"$tag": "app::Node", "$id": 0, "value": 1, "next": {"$ref": 0}}
//! {"$tag": "i32", "$value": 5}
//! ```
//!
//! `$tag` is left out when the reader can infer the type. Values that are
//! not objects are wrapped in `$value` when they carry a tag or an id.
//! Field names starting with `$` get one more `$` in front, so a field named
//! `$ref` is stored as `$$ref`.

use serde_json::{Map, Number, Value};
use vc_pickle::PickleError;
use vc_pickle::format::{Builder, Entry, Format, NULL_TAG, REF_TAG, Reader, WriteBody};
use vc_pickle::identity::ObjectId;
use vc_pickle::info::{Primitive, PrimitiveArray, PrimitiveKind, PrimitiveSlice};

pub const TAG_KEY: &str = "$tag";
pub const ID_KEY: &str = "$id";
pub const VALUE_KEY: &str = "$value";
pub const REF_KEY: &str = "$ref";

/// The object key of a record field.
fn field_key(name: &str) -> String {
    if name.starts_with('$') {
        format!("${name}")
    } else {
        name.into()
    }
}

fn primitive_to_json(value: Primitive) -> Result<Value, PickleError> {
    Ok(match value {
        Primitive::Bool(v) => Value::Bool(v),
        Primitive::I8(v) => Value::from(v),
        Primitive::I16(v) => Value::from(v),
        Primitive::I32(v) => Value::from(v),
        Primitive::I64(v) => Value::from(v),
        Primitive::U8(v) => Value::from(v),
        Primitive::U16(v) => Value::from(v),
        Primitive::U32(v) => Value::from(v),
        Primitive::U64(v) => Value::from(v),
        Primitive::F32(v) => float_to_json(f64::from(v))?,
        Primitive::F64(v) => float_to_json(v)?,
        Primitive::Char(v) => Value::String(v.to_string()),
    })
}

fn float_to_json(value: f64) -> Result<Value, PickleError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| PickleError::Encode(format!("{value} has no JSON representation")))
}

fn array_to_json(items: PrimitiveSlice<'_>) -> Result<Value, PickleError> {
    items
        .iter()
        .map(primitive_to_json)
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn primitive_from_json(value: &Value, kind: PrimitiveKind) -> Result<Primitive, PickleError> {
    let invalid = || PickleError::Decode(format!("`{value}` is not a valid {kind}"));
    let signed = || value.as_i64().ok_or_else(invalid);
    let unsigned = || value.as_u64().ok_or_else(invalid);
    Ok(match kind {
        PrimitiveKind::Bool => Primitive::Bool(value.as_bool().ok_or_else(invalid)?),
        PrimitiveKind::I8 => Primitive::I8(signed()?.try_into().map_err(|_| invalid())?),
        PrimitiveKind::I16 => Primitive::I16(signed()?.try_into().map_err(|_| invalid())?),
        PrimitiveKind::I32 => Primitive::I32(signed()?.try_into().map_err(|_| invalid())?),
        PrimitiveKind::I64 => Primitive::I64(signed()?),
        PrimitiveKind::U8 => Primitive::U8(unsigned()?.try_into().map_err(|_| invalid())?),
        PrimitiveKind::U16 => Primitive::U16(unsigned()?.try_into().map_err(|_| invalid())?),
        PrimitiveKind::U32 => Primitive::U32(unsigned()?.try_into().map_err(|_| invalid())?),
        PrimitiveKind::U64 => Primitive::U64(unsigned()?),
        // Widened on write.
        PrimitiveKind::F32 => Primitive::F32(value.as_f64().ok_or_else(invalid)? as f32),
        PrimitiveKind::F64 => Primitive::F64(value.as_f64().ok_or_else(invalid)?),
        PrimitiveKind::Char => {
            let text = value.as_str().ok_or_else(invalid)?;
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Primitive::Char(c),
                _ => return Err(invalid()),
            }
        }
    })
}

// -----------------------------------------------------------------------------
// JsonBuilder

enum Frame {
    Object {
        map: Map<String, Value>,
        field: Option<String>,
    },
    Sequence {
        header: Option<Map<String, Value>>,
        items: Vec<Value>,
    },
}

/// Builds a [`Value`] tree.
#[derive(Default)]
pub struct JsonBuilder {
    frames: Vec<Frame>,
    // One flag per open entry: whether it pushed a frame.
    open: Vec<bool>,
    root: Option<Value>,
    tag: Option<String>,
    elided: bool,
    oid: Option<ObjectId>,
}

impl JsonBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// The reserved keys of the next entry, if any.
    fn header(&mut self) -> Option<Map<String, Value>> {
        let tag = self.tag.take();
        let elided = core::mem::take(&mut self.elided);
        let oid = self.oid.take();
        let mut map = Map::new();
        if !elided && let Some(tag) = tag {
            map.insert(TAG_KEY.into(), Value::String(tag));
        }
        if let Some(oid) = oid {
            map.insert(ID_KEY.into(), Value::from(oid.get()));
        }
        (!map.is_empty()).then_some(map)
    }

    fn clear_hints(&mut self) {
        self.tag = None;
        self.elided = false;
        self.oid = None;
    }

    fn leaf(&mut self, value: Value) -> Result<(), PickleError> {
        let value = match self.header() {
            Some(mut map) => {
                map.insert(VALUE_KEY.into(), value);
                Value::Object(map)
            }
            None => value,
        };
        self.open.push(false);
        self.place(value)
    }

    fn place(&mut self, value: Value) -> Result<(), PickleError> {
        match self.frames.last_mut() {
            Some(Frame::Object { map, field }) => {
                let name = field
                    .take()
                    .ok_or_else(|| PickleError::Encode("object entry outside a field".into()))?;
                map.insert(name, value);
            }
            Some(Frame::Sequence { items, .. }) => items.push(value),
            None if self.root.is_none() => self.root = Some(value),
            None => return Err(PickleError::Encode("more than one top-level entry".into())),
        }
        Ok(())
    }

    /// Finishes the builder.
    pub fn into_value(self) -> Result<Value, PickleError> {
        if !self.frames.is_empty() {
            return Err(PickleError::Encode("unterminated entry".into()));
        }
        self.root
            .ok_or_else(|| PickleError::Encode("no entry was written".into()))
    }
}

impl Builder for JsonBuilder {
    // Values are built in memory, sizes are of no use.
    #[inline]
    fn hint_known_size(&mut self, _size: usize) {}

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

    #[inline]
    fn hint_oid(&mut self, oid: ObjectId) {
        self.oid = Some(oid);
    }

    fn begin_entry(&mut self, entry: Entry<'_>) -> Result<(), PickleError> {
        match entry {
            Entry::Null => {
                self.clear_hints();
                self.open.push(false);
                self.place(Value::Null)
            }
            Entry::BackRef(id) => {
                self.clear_hints();
                let mut map = Map::new();
                map.insert(REF_KEY.into(), Value::from(id.get()));
                self.open.push(false);
                self.place(Value::Object(map))
            }
            Entry::Primitive(value) => self.leaf(primitive_to_json(value)?),
            Entry::Str(text) => self.leaf(Value::String(text.into())),
            Entry::PrimitiveArray(items) => self.leaf(array_to_json(items)?),
            Entry::Object => {
                let map = self.header().unwrap_or_default();
                self.frames.push(Frame::Object { map, field: None });
                self.open.push(true);
                Ok(())
            }
            Entry::Sequence => {
                let header = self.header();
                self.frames.push(Frame::Sequence {
                    header,
                    items: Vec::new(),
                });
                self.open.push(true);
                Ok(())
            }
        }
    }

    fn put_field(&mut self, name: &str, body: &mut WriteBody<'_>) -> Result<(), PickleError> {
        match self.frames.last_mut() {
            Some(Frame::Object { field, .. }) => *field = Some(field_key(name)),
            _ => return Err(PickleError::Encode(format!("field `{name}` outside an object"))),
        }
        body(self)
    }

    fn begin_collection(&mut self, len: usize) -> Result<(), PickleError> {
        match self.frames.last_mut() {
            Some(Frame::Sequence { items, .. }) => {
                items.reserve(len);
                Ok(())
            }
            _ => Err(PickleError::Encode("collection outside a sequence".into())),
        }
    }

    #[inline]
    fn put_element(&mut self, body: &mut WriteBody<'_>) -> Result<(), PickleError> {
        body(self)
    }

    #[inline]
    fn end_collection(&mut self) -> Result<(), PickleError> {
        Ok(())
    }

    fn end_entry(&mut self) -> Result<(), PickleError> {
        let pushed = self
            .open
            .pop()
            .ok_or_else(|| PickleError::Encode("end of an entry that was never begun".into()))?;
        if !pushed {
            return Ok(());
        }
        let value = match self.frames.pop() {
            Some(Frame::Object { map, .. }) => Value::Object(map),
            Some(Frame::Sequence { header, items }) => match header {
                Some(mut map) => {
                    map.insert(VALUE_KEY.into(), Value::Array(items));
                    Value::Object(map)
                }
                None => Value::Array(items),
            },
            None => return Err(PickleError::Encode("unbalanced entries".into())),
        };
        self.place(value)
    }
}

// -----------------------------------------------------------------------------
// JsonReader

/// Reads entries from a [`Value`] tree.
pub struct JsonReader<'a> {
    value: &'a Value,
    content: Option<&'a Value>,
    next_element: usize,
    tag: Option<String>,
    elided: bool,
}

impl<'a> JsonReader<'a> {
    #[inline]
    pub fn new(value: &'a Value) -> Self {
        Self {
            value,
            content: None,
            next_element: 0,
            tag: None,
            elided: false,
        }
    }

    fn content(&self) -> Result<&'a Value, PickleError> {
        self.content
            .ok_or_else(|| PickleError::Decode("content read before the entry began".into()))
    }

    fn hinted(&self, tag: Option<String>, elidable: bool) -> Result<String, PickleError> {
        match tag {
            Some(tag) if elidable => Ok(tag),
            _ => Err(PickleError::Decode(format!(
                "missing `{TAG_KEY}` in `{}`",
                self.value
            ))),
        }
    }
}

impl Reader for JsonReader<'_> {
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
        let value = self.value;
        match value {
            Value::Null => {
                self.content = Some(value);
                Ok(NULL_TAG.into())
            }
            Value::Object(map) => {
                if let Some(id) = map.get(REF_KEY) {
                    self.content = Some(id);
                    return Ok(REF_TAG.into());
                }
                self.content = Some(map.get(VALUE_KEY).unwrap_or(value));
                match map.get(TAG_KEY) {
                    Some(Value::String(tag)) => Ok(tag.clone()),
                    Some(other) => Err(PickleError::Decode(format!("invalid `{TAG_KEY}` {other}"))),
                    None => self.hinted(hinted, elidable),
                }
            }
            _ => {
                self.content = Some(value);
                self.hinted(hinted, elidable)
            }
        }
    }

    #[inline]
    fn read_primitive(&mut self, kind: PrimitiveKind) -> Result<Primitive, PickleError> {
        primitive_from_json(self.content()?, kind)
    }

    fn read_str(&mut self) -> Result<String, PickleError> {
        match self.content()? {
            Value::String(text) => Ok(text.clone()),
            other => Err(PickleError::Decode(format!("`{other}` is not a string"))),
        }
    }

    fn read_primitive_array(&mut self, kind: PrimitiveKind) -> Result<PrimitiveArray, PickleError> {
        let Value::Array(values) = self.content()? else {
            return Err(PickleError::Decode(format!("expected an array of {kind}")));
        };
        let mut items = PrimitiveArray::with_capacity(kind, values.len());
        for value in values {
            items.push(primitive_from_json(value, kind)?)?;
        }
        Ok(items)
    }

    fn read_field(&mut self, name: &str) -> Result<Box<dyn Reader + '_>, PickleError> {
        let field = self
            .content()?
            .get(&field_key(name))
            .ok_or_else(|| PickleError::Decode(format!("missing field `{name}`")))?;
        Ok(Box::new(JsonReader::new(field)))
    }

    fn begin_collection(&mut self) -> Result<usize, PickleError> {
        self.next_element = 0;
        match self.content()? {
            Value::Array(items) => Ok(items.len()),
            other => Err(PickleError::Decode(format!("`{other}` is not an array"))),
        }
    }

    fn read_element(&mut self) -> Result<Box<dyn Reader + '_>, PickleError> {
        let index = self.next_element;
        let item = self
            .content()?
            .get(index)
            .ok_or_else(|| PickleError::Decode(format!("missing element {index}")))?;
        self.next_element += 1;
        Ok(Box::new(JsonReader::new(item)))
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
// JsonFormat

/// The JSON format. Encodes into a [`Value`].
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use vc_pickle_format::JsonFormat;
///
/// let value = vc_pickle::serialize(&JsonFormat, &Some(String::from("hi"))).unwrap();
/// assert_eq!(value, json!("hi"));
///
/// let none = vc_pickle::serialize(&JsonFormat, &None::<String>).unwrap();
/// assert_eq!(none, json!(null));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl Format for JsonFormat {
    type Builder = JsonBuilder;
    type Output = Value;
    type Input = Value;

    #[inline]
    fn builder(&self) -> Self::Builder {
        JsonBuilder::new()
    }

    #[inline]
    fn result(&self, builder: Self::Builder) -> Result<Self::Output, PickleError> {
        builder.into_value()
    }

    fn read<R>(
        &self,
        input: &Self::Input,
        f: impl FnOnce(&mut dyn Reader) -> Result<R, PickleError>,
    ) -> Result<R, PickleError> {
        f(&mut JsonReader::new(input))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use vc_pickle::format::{Builder, Entry, Reader};
    use vc_pickle::identity::ObjectId;
    use vc_pickle::info::{Primitive, PrimitiveKind};

    use super::{JsonBuilder, JsonReader};

    #[test]
    fn tags_and_ids_wrap_leaf_values() {
        let mut builder = JsonBuilder::new();
        builder.hint_tag("u8");
        builder.hint_oid(ObjectId::new(3));
        builder.begin_entry(Entry::Primitive(Primitive::U8(9))).unwrap();
        builder.end_entry().unwrap();
        assert_eq!(
            builder.into_value().unwrap(),
            json!({"$tag": "u8", "$id": 3, "$value": 9})
        );
    }

    #[test]
    fn objects_collect_their_fields() {
        let mut builder = JsonBuilder::new();
        builder.hint_tag("point");
        builder.begin_entry(Entry::Object).unwrap();
        builder
            .put_field("x", &mut |b: &mut dyn Builder| {
                b.hint_tag("i32");
                b.hint_statically_elided_type();
                b.begin_entry(Entry::Primitive(Primitive::I32(1)))?;
                b.end_entry()
            })
            .unwrap();
        builder.end_entry().unwrap();
        assert_eq!(
            builder.into_value().unwrap(),
            json!({"$tag": "point", "x": 1})
        );
    }

    #[test]
    fn dollar_fields_are_escaped() {
        let mut builder = JsonBuilder::new();
        builder.begin_entry(Entry::Object).unwrap();
        builder
            .put_field("$id", &mut |b: &mut dyn Builder| {
                b.hint_statically_elided_type();
                b.begin_entry(Entry::Primitive(Primitive::I32(7)))?;
                b.end_entry()
            })
            .unwrap();
        builder.end_entry().unwrap();
        let value = builder.into_value().unwrap();
        assert_eq!(value, json!({"$$id": 7}));

        let mut reader = JsonReader::new(&value);
        reader.hint_tag("pair");
        reader.hint_statically_elided_type();
        assert_eq!(reader.begin_entry().unwrap(), "pair");
        let mut field = reader.read_field("$id").unwrap();
        field.hint_tag("i32");
        field.hint_statically_elided_type();
        assert_eq!(field.begin_entry().unwrap(), "i32");
        assert_eq!(
            field.read_primitive(PrimitiveKind::I32).unwrap(),
            Primitive::I32(7)
        );
    }

    #[test]
    fn reader_resolves_reserved_keys() {
        let back_ref = json!({"$ref": 2});
        let mut reader = JsonReader::new(&back_ref);
        assert_eq!(reader.begin_entry().unwrap(), "$ref");
        assert_eq!(
            reader.read_primitive(PrimitiveKind::U32).unwrap(),
            Primitive::U32(2)
        );

        let plain = json!(5);
        let mut reader = JsonReader::new(&plain);
        assert!(reader.begin_entry().is_err());
        let mut reader = JsonReader::new(&plain);
        reader.hint_tag("i64");
        reader.hint_statically_elided_type();
        assert_eq!(reader.begin_entry().unwrap(), "i64");
        assert_eq!(
            reader.read_primitive(PrimitiveKind::I64).unwrap(),
            Primitive::I64(5)
        );
    }
}
