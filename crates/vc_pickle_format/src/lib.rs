#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

// -----------------------------------------------------------------------------
// Modules

mod binary;

#[cfg(feature = "json")]
mod json;

// -----------------------------------------------------------------------------
// Top-Level exports

pub use binary::{BinaryBuilder, BinaryFormat, BinaryReader, marker};

#[cfg(feature = "json")]
pub use json::{ID_KEY, JsonBuilder, JsonFormat, JsonReader, REF_KEY, TAG_KEY, VALUE_KEY};
