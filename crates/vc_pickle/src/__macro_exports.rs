//! Items used by the exported macros. Not part of the public API.

#[cfg(feature = "auto_register")]
pub use inventory;

use crate::registry::CodecRegistry;

/// One [`auto_register!`](crate::auto_register) declaration.
pub struct AutoRegistration {
    pub register: fn(&CodecRegistry),
}

#[cfg(feature = "auto_register")]
inventory::collect!(AutoRegistration);
