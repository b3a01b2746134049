use thiserror::Error;

use crate::identity::ObjectId;

// -----------------------------------------------------------------------------
// PickleError

/// The error type of every pickle and unpickle operation.
///
/// Any error aborts the current top-level call. Its identity registry is
/// released on the way out.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PickleError {
    /// The bottom type was requested. There is no value to encode or decode.
    #[error("type `{0}` is uninhabited and cannot be pickled")]
    UnsupportedType(String),

    /// A decoded tag could not be resolved, even through the runtime fallback.
    #[error("unknown type tag `{0}`")]
    UnknownType(String),

    /// A back-reference to an id that was never registered.
    #[error("back-reference to object {0} which is not constructed yet")]
    UnresolvedReference(ObjectId),

    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    TypeMismatch { expected: String, found: String },

    /// Wrapper and abstract types are dispatched, never encoded on their own.
    #[error("no standalone codec exists for `{0}`")]
    NoCodec(String),

    /// Neither a usable constructor nor a shell is available.
    #[error("type `{0}` declares no usable constructor or shell")]
    NotConstructible(String),

    /// A shared value was already borrowed while being read or patched.
    #[error("shared value of type `{0}` is already borrowed")]
    Borrowed(String),

    #[error("value nesting exceeds the configured limit of {0}")]
    DepthLimit(usize),

    /// Malformed input reported by a format.
    #[error("decode failed: {0}")]
    Decode(String),

    #[error("encode failed: {0}")]
    Encode(String),
}

impl PickleError {
    #[inline]
    pub(crate) fn mismatch(expected: &str, found: &str) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

// -----------------------------------------------------------------------------
// AccessError

/// A field that no accessor can read or write.
///
/// This is never returned to callers. Such fields are omitted by the
/// writer and left unset by the reader.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("field `{field}` of `{owner}` is inaccessible and will be omitted")]
pub struct AccessError {
    pub owner: &'static str,
    pub field: &'static str,
}
