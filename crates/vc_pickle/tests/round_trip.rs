use serde_json::json;
use vc_pickle::codec::RecordLayout;
use vc_pickle::info::{DescriptorCell, FieldDescriptor, RecordBuilder, TypeDescriptor, Typed};
use vc_pickle::{PickleError, Reflect, ReflectRef, impl_record, impl_singleton};
use vc_pickle_format::{BinaryBuilder, BinaryFormat, BinaryReader, JsonFormat};

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub id: u64,
    pub ratio: f32,
    pub initial: char,
    pub name: String,
    pub scores: Vec<i16>,
    pub tags: Vec<String>,
    pub nickname: Option<String>,
    pub flags: Option<Vec<bool>>,
}

impl_record!(Sample {
    id,
    ratio,
    initial,
    name,
    scores,
    tags,
    nickname,
    flags,
});

fn sample() -> Sample {
    Sample {
        id: 42,
        ratio: 0.5,
        initial: 'λ',
        name: String::from("sample"),
        scores: vec![-3, 0, 7],
        tags: vec![String::from("a"), String::from("b")],
        nickname: None,
        flags: Some(vec![true, false]),
    }
}

#[test]
fn records_round_trip_through_both_formats() {
    let value = sample();

    let bytes = vc_pickle::serialize(&BinaryFormat, &value).unwrap();
    let back: Sample = vc_pickle::deserialize(&BinaryFormat, bytes.as_slice()).unwrap();
    assert_eq!(back, value);

    let json = vc_pickle::serialize(&JsonFormat, &value).unwrap();
    let back: Sample = vc_pickle::deserialize(&JsonFormat, &json).unwrap();
    assert_eq!(back, value);
}

#[test]
fn null_stays_null() {
    let value = Sample {
        flags: None,
        ..sample()
    };
    let json = vc_pickle::serialize(&JsonFormat, &value).unwrap();
    assert_eq!(json["nickname"], json!(null));
    assert_eq!(json["flags"], json!(null));

    let back: Sample = vc_pickle::deserialize(&JsonFormat, &json).unwrap();
    assert_eq!(back.nickname, None);
    assert_eq!(back.flags, None);
}

#[test]
fn final_field_types_carry_no_tag() {
    let json = vc_pickle::serialize(&JsonFormat, &sample()).unwrap();
    assert_eq!(json["id"], json!(42));
    assert_eq!(json["name"], json!("sample"));
    assert_eq!(json["scores"], json!([-3, 0, 7]));
    assert!(json.get("$tag").is_none());
}

#[test]
fn null_in_a_required_position_is_rejected() {
    let mut json = vc_pickle::serialize(&JsonFormat, &sample()).unwrap();
    json["name"] = json!(null);
    let err = vc_pickle::deserialize::<Sample, _>(&JsonFormat, &json).unwrap_err();
    assert!(matches!(err, PickleError::Decode(_)));
}

#[test]
fn truncated_input_fails_to_decode() {
    let bytes = vc_pickle::serialize(&BinaryFormat, &sample()).unwrap();
    let err = vc_pickle::deserialize::<Sample, _>(&BinaryFormat, &bytes[..bytes.len() - 3])
        .unwrap_err();
    assert!(matches!(err, PickleError::Decode(_)));
}

#[test]
fn top_level_reads_mirror_builder_writes() {
    let first = sample();
    let second = Sample {
        id: 7,
        nickname: Some(String::from("second")),
        ..sample()
    };

    let mut builder = BinaryBuilder::new();
    vc_pickle::serialize_into(&mut builder, &first).unwrap();
    vc_pickle::serialize_into(&mut builder, &second).unwrap();
    let bytes = builder.into_bytes();

    let mut reader = BinaryReader::new(&bytes);
    let back: Sample = vc_pickle::deserialize_top_level(&mut reader).unwrap();
    assert_eq!(back, first);
    let back: Sample = vc_pickle::deserialize_top_level(&mut reader).unwrap();
    assert_eq!(back, second);
    assert_eq!(reader.remaining(), 0);
}

// -----------------------------------------------------------------------------
// Singletons

#[derive(Debug, PartialEq)]
pub struct Marker;
impl_singleton!(Marker as "marker");

#[test]
fn singletons_decode_to_the_canonical_instance() {
    let bytes = vc_pickle::serialize(&BinaryFormat, &vec![Some(Marker), None]).unwrap();
    let back: Vec<Option<Marker>> =
        vc_pickle::deserialize(&BinaryFormat, bytes.as_slice()).unwrap();
    assert_eq!(back, [Some(Marker), None]);
}

// -----------------------------------------------------------------------------
// Accessibility

#[derive(Debug, Default, PartialEq)]
pub struct Account {
    pub owner: String,
    balance: i64,
    session: u32,
}

impl Account {
    fn balance(&self) -> &i64 {
        &self.balance
    }

    fn set_balance(&mut self, balance: i64) {
        self.balance = balance;
    }
}

impl Reflect for Account {
    fn represented_descriptor(&self) -> &'static TypeDescriptor {
        <Self as Typed>::descriptor()
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Record
    }

    vc_pickle::reflect_casts!();
}

impl Typed for Account {
    fn descriptor() -> &'static TypeDescriptor {
        static CELL: DescriptorCell = DescriptorCell::new();
        CELL.get_or_init(|| {
            RecordBuilder::<Account>::new()
                .public_field("owner", |a| &a.owner, |a| &mut a.owner)
                .accessor_field("balance", Account::balance, Account::set_balance)
                .inaccessible_field::<u32>("session")
                .default_shell()
                .build()
        })
    }
}

#[test]
fn inaccessible_fields_are_omitted() {
    let account = Account {
        owner: String::from("ann"),
        balance: -20,
        session: 9,
    };
    let json = vc_pickle::serialize(&JsonFormat, &account).unwrap();
    assert_eq!(json, json!({"owner": "ann", "balance": -20}));

    let back: Account = vc_pickle::deserialize(&JsonFormat, &json).unwrap();
    assert_eq!(back.owner, "ann");
    assert_eq!(back.balance, -20);
    assert_eq!(back.session, 0);
}

// -----------------------------------------------------------------------------
// Flattening

#[derive(Debug, Default, PartialEq)]
pub struct Entity {
    pub id: u32,
    pub label: String,
}
impl_record!(Entity: Default { id, label });

#[derive(Debug, Default, PartialEq)]
pub struct Player {
    pub entity: Entity,
    pub label: String,
    pub level: u8,
}

impl Reflect for Player {
    fn represented_descriptor(&self) -> &'static TypeDescriptor {
        <Self as Typed>::descriptor()
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Record
    }

    vc_pickle::reflect_casts!();
}

impl Typed for Player {
    fn descriptor() -> &'static TypeDescriptor {
        static CELL: DescriptorCell = DescriptorCell::new();
        CELL.get_or_init(|| {
            RecordBuilder::<Player>::new()
                .public_field("label", |p| &p.label, |p| &mut p.label)
                .public_field("level", |p| &p.level, |p| &mut p.level)
                .extends(|p| &p.entity, |p| &mut p.entity)
                .default_shell()
                .build()
        })
    }
}

#[test]
fn derived_fields_shadow_base_fields() {
    let record = <Player as Typed>::descriptor().as_record().unwrap();
    let names: Vec<_> = record.fields().iter().map(FieldDescriptor::name).collect();
    assert_eq!(names, ["label", "level", "id"]);

    let player = Player {
        entity: Entity {
            id: 3,
            label: String::from("base"),
        },
        label: String::from("derived"),
        level: 12,
    };
    let bytes = vc_pickle::serialize(&BinaryFormat, &player).unwrap();
    let back: Player = vc_pickle::deserialize(&BinaryFormat, bytes.as_slice()).unwrap();
    assert_eq!(back.entity.id, 3);
    assert_eq!(back.entity.label, "");
    assert_eq!(back.label, "derived");
    assert_eq!(back.level, 12);
}

// -----------------------------------------------------------------------------
// Construction strategy

#[derive(Debug, Default, PartialEq)]
pub struct Envelope {
    pub header: u16,
    pub payload: Vec<String>,
}

impl Reflect for Envelope {
    fn represented_descriptor(&self) -> &'static TypeDescriptor {
        <Self as Typed>::descriptor()
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Record
    }

    vc_pickle::reflect_casts!();
}

impl Typed for Envelope {
    fn descriptor() -> &'static TypeDescriptor {
        static CELL: DescriptorCell = DescriptorCell::new();
        CELL.get_or_init(|| {
            RecordBuilder::<Envelope>::new()
                .public_field("header", |e| &e.header, |e| &mut e.header)
                .field(
                    FieldDescriptor::public(
                        "payload",
                        |e: &Envelope| &e.payload,
                        |e: &mut Envelope| &mut e.payload,
                    )
                    .erased(),
                )
                .constructor(&["header", "payload"], |bag| {
                    Ok(Envelope {
                        header: bag.take("header")?,
                        payload: bag.take("payload")?,
                    })
                })
                .default_shell()
                .build()
        })
    }
}

#[test]
fn erased_fields_force_the_shell() {
    let descriptor = <Envelope as Typed>::descriptor();
    let layout = RecordLayout::plan(descriptor, descriptor.as_record().unwrap()).unwrap();
    assert!(!layout.is_direct());
    assert_eq!(layout.instantiate_at(), 0);

    let direct = <Sample as Typed>::descriptor();
    let layout = RecordLayout::plan(direct, direct.as_record().unwrap()).unwrap();
    assert!(layout.is_direct());

    let envelope = Envelope {
        header: 7,
        payload: vec![String::from("body")],
    };
    let json = vc_pickle::serialize(&JsonFormat, &envelope).unwrap();
    let back: Envelope = vc_pickle::deserialize(&JsonFormat, &json).unwrap();
    assert_eq!(back, envelope);
}

#[test]
fn uninhabited_types_are_unsupported() {
    let err = vc_pickle::deserialize::<core::convert::Infallible, _>(&JsonFormat, &json!(1))
        .unwrap_err();
    assert!(matches!(err, PickleError::UnsupportedType(_)));

    let err = vc_pickle::deserialize::<Vec<core::convert::Infallible>, _>(&JsonFormat, &json!([1]))
        .unwrap_err();
    assert!(matches!(err, PickleError::UnsupportedType(_)));
}

/// The constructor needs `token`, which cannot be read back, and there is no shell.
#[derive(Debug, PartialEq)]
pub struct Session {
    pub user: String,
    token: u64,
}

impl Reflect for Session {
    fn represented_descriptor(&self) -> &'static TypeDescriptor {
        <Self as Typed>::descriptor()
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Record
    }

    vc_pickle::reflect_casts!();
}

impl Typed for Session {
    fn descriptor() -> &'static TypeDescriptor {
        static CELL: DescriptorCell = DescriptorCell::new();
        CELL.get_or_init(|| {
            RecordBuilder::<Session>::new()
                .public_field("user", |s| &s.user, |s| &mut s.user)
                .inaccessible_field::<u64>("token")
                .constructor(&["user", "token"], |bag| {
                    Ok(Session {
                        user: bag.take("user")?,
                        token: bag.take("token")?,
                    })
                })
                .build()
        })
    }
}

#[test]
fn unconstructible_records_still_write() {
    let session = Session {
        user: String::from("kim"),
        token: 77,
    };
    let json = vc_pickle::serialize(&JsonFormat, &session).unwrap();
    assert_eq!(json, json!({"user": "kim"}));
    assert!(vc_pickle::serialize(&BinaryFormat, &session).is_ok());

    let err = vc_pickle::deserialize::<Session, _>(&JsonFormat, &json).unwrap_err();
    assert!(matches!(err, PickleError::NotConstructible(_)));
}

// -----------------------------------------------------------------------------
// Nested nullables

#[test]
fn nested_nullables_keep_every_level() {
    let values: Vec<Option<Option<i32>>> = vec![Some(Some(5)), Some(None), None];

    let json = vc_pickle::serialize(&JsonFormat, &values).unwrap();
    assert_eq!(json, json!([{"some": 5}, {"some": null}, null]));
    let back: Vec<Option<Option<i32>>> = vc_pickle::deserialize(&JsonFormat, &json).unwrap();
    assert_eq!(back, values);

    let bytes = vc_pickle::serialize(&BinaryFormat, &values).unwrap();
    let back: Vec<Option<Option<i32>>> =
        vc_pickle::deserialize(&BinaryFormat, bytes.as_slice()).unwrap();
    assert_eq!(back, values);

    let top = Some(Some(String::from("deep")));
    let bytes = vc_pickle::serialize(&BinaryFormat, &top).unwrap();
    let back: Option<Option<String>> =
        vc_pickle::deserialize(&BinaryFormat, bytes.as_slice()).unwrap();
    assert_eq!(back, top);
}

// -----------------------------------------------------------------------------
// Field names that look like markers

#[derive(Debug, Default, PartialEq)]
pub struct Query {
    pub reference: u32,
    pub tag: String,
    pub plain: bool,
}

impl Reflect for Query {
    fn represented_descriptor(&self) -> &'static TypeDescriptor {
        <Self as Typed>::descriptor()
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Record
    }

    vc_pickle::reflect_casts!();
}

impl Typed for Query {
    fn descriptor() -> &'static TypeDescriptor {
        static CELL: DescriptorCell = DescriptorCell::new();
        CELL.get_or_init(|| {
            RecordBuilder::<Query>::new()
                .public_field("$ref", |q| &q.reference, |q| &mut q.reference)
                .public_field("$tag", |q| &q.tag, |q| &mut q.tag)
                .public_field("plain", |q| &q.plain, |q| &mut q.plain)
                .default_shell()
                .build()
        })
    }
}

#[test]
fn dollar_field_names_do_not_clash_with_markers() {
    let query = Query {
        reference: 4,
        tag: String::from("t"),
        plain: true,
    };

    let json = vc_pickle::serialize(&JsonFormat, &query).unwrap();
    assert_eq!(json, json!({"$$ref": 4, "$$tag": "t", "plain": true}));
    let back: Query = vc_pickle::deserialize(&JsonFormat, &json).unwrap();
    assert_eq!(back, query);

    let many = vec![query];
    let json = vc_pickle::serialize(&JsonFormat, &many).unwrap();
    let back: Vec<Query> = vc_pickle::deserialize(&JsonFormat, &json).unwrap();
    assert_eq!(back, many);
}
