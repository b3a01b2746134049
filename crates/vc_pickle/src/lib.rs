#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

// -----------------------------------------------------------------------------
// Extern Self

// Lets the exported macros and the doc tests both name the crate `vc_pickle`.
extern crate self as vc_pickle;

// -----------------------------------------------------------------------------
// Modules

mod error;
mod macros;
mod pickler;
mod reflect;

pub mod codec;
pub mod dispatch;
pub mod format;
pub mod hash;
pub mod identity;
pub mod info;
pub mod registry;

// -----------------------------------------------------------------------------
// Top-Level exports

#[doc(hidden)]
pub mod __macro_exports;

pub use error::{AccessError, PickleError};
pub use pickler::{
    PickleOptions, Pickler, SharingMode, deserialize, deserialize_top_level, serialize,
    serialize_into,
};
pub use reflect::{Ref, Reflect, ReflectRef, Sequence, SharedRef, shared};
pub use registry::CodecRegistry;
