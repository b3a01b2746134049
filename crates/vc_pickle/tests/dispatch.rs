use core::fmt::Debug;
use std::rc::Rc;

use serde_json::json;
use vc_pickle::codec::CustomCodec;
use vc_pickle::dispatch::{ReadContext, WriteContext};
use vc_pickle::format::{Builder, Entry, Reader};
use vc_pickle::info::{Primitive, PrimitiveKind};
use vc_pickle::{
    CodecRegistry, PickleError, Pickler, Ref, Reflect, auto_register, impl_hierarchy, impl_record,
    register_subtype, shared,
};
use vc_pickle_format::{BinaryFormat, JsonFormat};

pub trait Shape: Reflect + Debug {
    fn area(&self) -> f64;
}

#[derive(Debug, Default)]
pub struct Circle {
    pub radius: f64,
}
impl_record!(Circle: Default as "circle" { radius });

impl Shape for Circle {
    fn area(&self) -> f64 {
        3.0 * self.radius * self.radius
    }
}

#[derive(Debug, Default)]
pub struct Square {
    pub side: f64,
}
impl_record!(Square: Default as "square" { side });

impl Shape for Square {
    fn area(&self) -> f64 {
        self.side * self.side
    }
}

/// Not among the closed alternatives of `dyn Shape`.
#[derive(Debug, Default)]
pub struct Triangle {
    pub base: f64,
    pub height: f64,
}
impl_record!(Triangle: Default as "triangle" { base, height });

impl Shape for Triangle {
    fn area(&self) -> f64 {
        self.base * self.height / 2.0
    }
}

/// Reached only through `auto_register!`.
#[derive(Debug, Default)]
pub struct Hexagon {
    pub side: f64,
}
impl_record!(Hexagon: Default as "hexagon" { side });

impl Shape for Hexagon {
    fn area(&self) -> f64 {
        6.0 * self.side
    }
}

impl_hierarchy!(dyn Shape { Circle, Square });

auto_register!(dyn Shape => Hexagon);

#[derive(Debug, Default)]
pub struct Canvas {
    pub shapes: Vec<Ref<dyn Shape>>,
    pub focus: Option<Ref<dyn Shape>>,
}
impl_record!(Canvas: Default { shapes, focus });

fn shape(value: impl Shape) -> Ref<dyn Shape> {
    shared(value)
}

fn areas(canvas: &Canvas) -> Vec<f64> {
    canvas.shapes.iter().map(|shape| shape.borrow().area()).collect()
}

#[test]
fn closed_alternatives_keep_their_concrete_type() {
    let square = shape(Square { side: 2.0 });
    let canvas = Canvas {
        shapes: vec![shape(Circle { radius: 1.0 }), square.clone()],
        focus: Some(square),
    };

    let json = vc_pickle::serialize(&JsonFormat, &canvas).unwrap();
    assert_eq!(json["shapes"][0], json!({"$tag": "circle", "$id": 0, "radius": 1.0}));
    assert_eq!(json["shapes"][1]["$tag"], json!("square"));
    assert_eq!(json["focus"], json!({"$ref": 1}));

    let back: Canvas = vc_pickle::deserialize(&JsonFormat, &json).unwrap();
    assert_eq!(areas(&back), [3.0, 4.0]);
    assert!(back.shapes[1].borrow().as_any().is::<Square>());
    assert!(Rc::ptr_eq(&back.shapes[1], back.focus.as_ref().unwrap()));
}

#[test]
fn runtime_subtypes_need_registration() {
    let canvas = Canvas {
        shapes: vec![shape(Triangle {
            base: 4.0,
            height: 3.0,
        })],
        focus: None,
    };

    let registry = CodecRegistry::new();
    let pickler = Pickler::with_registry(&registry);
    let bytes = pickler.serialize(&BinaryFormat, &canvas).unwrap();
    let err = pickler
        .deserialize::<Canvas, _>(&BinaryFormat, bytes.as_slice())
        .unwrap_err();
    assert_eq!(err, PickleError::UnknownType(String::from("triangle")));

    register_subtype!(registry, dyn Shape => Triangle);
    let back: Canvas = pickler.deserialize(&BinaryFormat, bytes.as_slice()).unwrap();
    assert_eq!(areas(&back), [6.0]);
}

#[test]
fn auto_registered_subtypes_reach_the_global_registry() {
    let canvas = Canvas {
        shapes: vec![shape(Hexagon { side: 1.5 })],
        focus: None,
    };
    let json = vc_pickle::serialize(&JsonFormat, &canvas).unwrap();
    let back: Canvas = vc_pickle::deserialize(&JsonFormat, &json).unwrap();
    assert_eq!(areas(&back), [9.0]);
}

#[test]
fn unknown_tags_are_rejected() {
    let json = json!({"shapes": [{"$tag": "octagon", "side": 1.0}], "focus": null});
    let err = vc_pickle::deserialize::<Canvas, _>(&JsonFormat, &json).unwrap_err();
    assert_eq!(err, PickleError::UnknownType(String::from("octagon")));
}

#[test]
fn tags_outside_the_hierarchy_are_rejected() {
    let json = json!({"shapes": [{"$tag": "u8", "$value": 1}], "focus": null});
    let err = vc_pickle::deserialize::<Canvas, _>(&JsonFormat, &json).unwrap_err();
    assert!(matches!(err, PickleError::TypeMismatch { .. }));
}

#[test]
fn unbounded_references_resolve_by_tag() {
    let registry = CodecRegistry::new();
    registry.register::<Square>();
    let pickler = Pickler::with_registry(&registry);

    let value: Ref<dyn Reflect> = shared(Square { side: 3.0 });
    let bytes = pickler.serialize(&BinaryFormat, &value).unwrap();
    let back: Ref<dyn Reflect> = pickler
        .deserialize(&BinaryFormat, bytes.as_slice())
        .unwrap();
    let back = back.borrow();
    assert_eq!(back.downcast_ref::<Square>().map(|s| s.side), Some(3.0));

    let text: Ref<dyn Reflect> = shared(String::from("plain"));
    let json = pickler.serialize(&JsonFormat, &text).unwrap();
    assert_eq!(json, json!({"$tag": "alloc::string::String", "$value": "plain"}));
}

// -----------------------------------------------------------------------------
// Custom codecs

/// Writes a square as its side, in a string.
struct SquareText;

impl CustomCodec for SquareText {
    fn write(
        &self,
        _cx: &mut WriteContext<'_>,
        builder: &mut dyn Builder,
        value: &dyn Reflect,
    ) -> Result<(), PickleError> {
        let square = value
            .downcast_ref::<Square>()
            .ok_or_else(|| PickleError::Encode(String::from("not a square")))?;
        builder.begin_entry(Entry::Str(&format!("side={}", square.side)))?;
        builder.end_entry()
    }

    fn read(
        &self,
        _cx: &mut ReadContext<'_>,
        reader: &mut dyn Reader,
    ) -> Result<Box<dyn Reflect>, PickleError> {
        let text = reader.read_str()?;
        let side = text
            .strip_prefix("side=")
            .and_then(|side| side.parse().ok())
            .ok_or_else(|| PickleError::Decode(format!("bad square `{text}`")))?;
        Ok(Box::new(Square { side }))
    }
}

#[test]
fn custom_codecs_take_priority() {
    let registry = CodecRegistry::new();
    registry.register_custom::<Square>(SquareText);
    let pickler = Pickler::with_registry(&registry);

    let json = pickler.serialize(&JsonFormat, &Square { side: 5.0 }).unwrap();
    assert_eq!(json, json!("side=5"));
    let back: Square = pickler.deserialize(&JsonFormat, &json).unwrap();
    assert_eq!(back.side, 5.0);

    let canvas = Canvas {
        shapes: vec![shape(Square { side: 1.0 })],
        focus: None,
    };
    let json = pickler.serialize(&JsonFormat, &canvas).unwrap();
    assert_eq!(json["shapes"][0], json!({"$tag": "square", "$id": 0, "$value": "side=1"}));
    let back: Canvas = pickler.deserialize(&JsonFormat, &json).unwrap();
    assert_eq!(areas(&back), [1.0]);
}

/// Writes every shape as its area, and reads it back as a square.
struct AreaOnly;

impl CustomCodec for AreaOnly {
    fn write(
        &self,
        _cx: &mut WriteContext<'_>,
        builder: &mut dyn Builder,
        value: &dyn Reflect,
    ) -> Result<(), PickleError> {
        let area = if let Some(circle) = value.downcast_ref::<Circle>() {
            circle.area()
        } else if let Some(square) = value.downcast_ref::<Square>() {
            square.area()
        } else {
            return Err(PickleError::Encode(String::from("unexpected shape")));
        };
        builder.begin_entry(Entry::Primitive(Primitive::F64(area)))?;
        builder.end_entry()
    }

    fn read(
        &self,
        _cx: &mut ReadContext<'_>,
        reader: &mut dyn Reader,
    ) -> Result<Box<dyn Reflect>, PickleError> {
        match reader.read_primitive(PrimitiveKind::F64)? {
            Primitive::F64(area) => Ok(Box::new(Square { side: area.sqrt() })),
            _ => Err(PickleError::Decode(String::from("expected an area"))),
        }
    }
}

#[test]
fn custom_codecs_for_abstract_types_end_the_search() {
    let registry = CodecRegistry::new();
    registry.register_custom::<dyn Shape>(AreaOnly);
    let pickler = Pickler::with_registry(&registry);

    let canvas = Canvas {
        shapes: vec![shape(Circle { radius: 2.0 })],
        focus: None,
    };
    let bytes = pickler.serialize(&BinaryFormat, &canvas).unwrap();
    let back: Canvas = pickler.deserialize(&BinaryFormat, bytes.as_slice()).unwrap();
    assert!(back.shapes[0].borrow().as_any().is::<Square>());
    assert!((areas(&back)[0] - 12.0).abs() < 1e-9);
}

/// Neither a closed alternative nor registered anywhere.
#[derive(Debug, Default)]
pub struct Pentagon {
    pub side: f64,
}
impl_record!(Pentagon: Default as "pentagon" { side });

impl Shape for Pentagon {
    fn area(&self) -> f64 {
        5.0 * self.side
    }
}

/// Writes pentagons as text and reads them back as ready `Ref<dyn Shape>`.
struct PentagonText;

impl CustomCodec for PentagonText {
    fn write(
        &self,
        _cx: &mut WriteContext<'_>,
        builder: &mut dyn Builder,
        value: &dyn Reflect,
    ) -> Result<(), PickleError> {
        let pentagon = value
            .downcast_ref::<Pentagon>()
            .ok_or_else(|| PickleError::Encode(String::from("not a pentagon")))?;
        builder.begin_entry(Entry::Str(&format!("pentagon:{}", pentagon.side)))?;
        builder.end_entry()
    }

    fn read(
        &self,
        _cx: &mut ReadContext<'_>,
        reader: &mut dyn Reader,
    ) -> Result<Box<dyn Reflect>, PickleError> {
        let text = reader.read_str()?;
        let side = text
            .strip_prefix("pentagon:")
            .and_then(|side| side.parse().ok())
            .ok_or_else(|| PickleError::Decode(format!("bad pentagon `{text}`")))?;
        Ok(Box::new(shape(Pentagon { side })))
    }
}

#[test]
fn abstract_codecs_read_tags_the_registry_does_not_know() {
    let registry = CodecRegistry::new();
    registry.register_custom::<dyn Shape>(PentagonText);
    let pickler = Pickler::with_registry(&registry);

    let pentagon = shape(Pentagon { side: 2.0 });
    let canvas = Canvas {
        shapes: vec![pentagon.clone()],
        focus: Some(pentagon),
    };

    let json = pickler.serialize(&JsonFormat, &canvas).unwrap();
    assert_eq!(
        json["shapes"][0],
        json!({"$tag": "pentagon", "$id": 0, "$value": "pentagon:2"})
    );
    assert_eq!(json["focus"], json!({"$ref": 0}));

    let back: Canvas = pickler.deserialize(&JsonFormat, &json).unwrap();
    assert_eq!(areas(&back), [10.0]);
    assert!(Rc::ptr_eq(&back.shapes[0], back.focus.as_ref().unwrap()));

    let bytes = pickler.serialize(&BinaryFormat, &canvas).unwrap();
    let back: Canvas = pickler.deserialize(&BinaryFormat, bytes.as_slice()).unwrap();
    assert!(back.shapes[0].borrow().as_any().is::<Pentagon>());
    assert!(Rc::ptr_eq(&back.shapes[0], back.focus.as_ref().unwrap()));
}
