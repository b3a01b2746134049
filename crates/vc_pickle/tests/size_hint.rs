use vc_pickle::codec::HEADER_ALLOWANCE;
use vc_pickle::info::{LENGTH_PREFIX_SIZE, Typed};
use vc_pickle::{Reflect, impl_record};
use vc_pickle_format::{BinaryBuilder, BinaryFormat};

pub struct Scalars {
    pub count: i32,
    pub flag: i8,
}
impl_record!(Scalars { count, flag });

pub struct Samples {
    pub values: Vec<u16>,
}
impl_record!(Samples { values });

pub struct MaybeSamples {
    pub values: Option<Vec<u16>>,
}
impl_record!(MaybeSamples { values });

pub struct Labelled {
    pub id: u32,
    pub label: String,
}
impl_record!(Labelled { id, label });

pub struct Outer {
    pub inner: Scalars,
    pub extra: u64,
}
impl_record!(Outer { inner, extra });

fn hints<T: Reflect + Typed>(value: &T) -> Vec<usize> {
    let mut builder = BinaryBuilder::new();
    vc_pickle::serialize_into(&mut builder, value).unwrap();
    builder.hinted_sizes().to_vec()
}

fn tag_len<T: Typed>() -> usize {
    T::descriptor().tag().len()
}

#[test]
fn scalar_fields_sum_their_widths() {
    let value = Scalars { count: 7, flag: -1 };
    assert_eq!(hints(&value), [4 + 1 + tag_len::<Scalars>() + 4]);
}

#[test]
fn primitive_arrays_count_elements_and_prefix() {
    let value = Samples {
        values: (0..10).collect(),
    };
    assert_eq!(hints(&value), [10 * 2 + 4 + tag_len::<Samples>() + 4]);
    assert_eq!(LENGTH_PREFIX_SIZE, 4);
    assert_eq!(HEADER_ALLOWANCE, 4);
}

#[test]
fn absent_arrays_skip_the_hint() {
    let present = MaybeSamples {
        values: Some(vec![1, 2, 3]),
    };
    assert_eq!(
        hints(&present),
        [3 * 2 + LENGTH_PREFIX_SIZE + tag_len::<MaybeSamples>() + HEADER_ALLOWANCE]
    );
    assert!(hints(&MaybeSamples { values: None }).is_empty());
}

#[test]
fn non_primitive_fields_skip_the_hint() {
    let value = Labelled {
        id: 1,
        label: String::from("label"),
    };
    assert!(hints(&value).is_empty());
}

#[test]
fn nested_records_hint_only_themselves() {
    let value = Outer {
        inner: Scalars { count: 1, flag: 2 },
        extra: 3,
    };
    assert_eq!(hints(&value), [4 + 1 + tag_len::<Scalars>() + 4]);
}

#[test]
fn hints_do_not_change_the_encoding() {
    let value = Scalars { count: 7, flag: -1 };
    let bytes = vc_pickle::serialize(&BinaryFormat, &value).unwrap();
    let mut builder = BinaryBuilder::new();
    vc_pickle::serialize_into(&mut builder, &value).unwrap();
    assert_eq!(builder.into_bytes(), bytes);
}
