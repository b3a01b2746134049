//! Hash maps of the codec and identity registries.
//!
//! [`TypeId`]s arrive already hashed and go through [`TypeIdHasher`] as they
//! are. Tags, object addresses and subtype pairs use `foldhash` with a seed
//! that stays the same for the whole process.

use core::any::TypeId;
use core::hash::{BuildHasher, Hasher};

use foldhash::fast::FixedState;

const KEY_SEED: u64 = 0x6a09_e667_f3bc_c908;

/// A map keyed by tags, object addresses or pairs of [`TypeId`]s.
pub type KeyMap<K, V> = hashbrown::HashMap<K, V, FixedState>;

/// An empty [`KeyMap`].
#[inline]
pub const fn key_map<K, V>() -> KeyMap<K, V> {
    hashbrown::HashMap::with_hasher(FixedState::with_seed(KEY_SEED))
}

/// A map keyed by a single [`TypeId`].
pub type TypeIdMap<V> = hashbrown::HashMap<TypeId, V, TypeIdState>;

/// An empty [`TypeIdMap`], usable in statics.
///
/// # Examples
///
/// ```
/// use core::any::TypeId;
/// use vc_pickle::hash::type_id_map;
///
/// let mut map = type_id_map();
/// map.insert(TypeId::of::<u8>(), "u8");
/// map.insert(TypeId::of::<u16>(), "u16");
/// assert_eq!(map[&TypeId::of::<u16>()], "u16");
/// ```
#[inline]
pub const fn type_id_map<V>() -> TypeIdMap<V> {
    hashbrown::HashMap::with_hasher(TypeIdState)
}

/// Builds [`TypeIdHasher`]s.
#[derive(Copy, Clone, Default, Debug)]
pub struct TypeIdState;

impl BuildHasher for TypeIdState {
    type Hasher = TypeIdHasher;

    #[inline(always)]
    fn build_hasher(&self) -> Self::Hasher {
        TypeIdHasher(0)
    }
}

/// Keeps the `u64` a [`TypeId`] hashes to.
#[derive(Copy, Clone, Default, Debug)]
pub struct TypeIdHasher(u64);

impl Hasher for TypeIdHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }

    #[inline]
    fn write_u64(&mut self, i: u64) {
        self.0 = i;
    }

    fn write(&mut self, bytes: &[u8]) {
        // Not reached by `TypeId`.
        for chunk in bytes.chunks(8) {
            let mut word = [0; 8];
            word[..chunk.len()].copy_from_slice(chunk);
            self.0 = (self.0 ^ u64::from_le_bytes(word)).rotate_left(29);
        }
    }
}

#[cfg(test)]
mod tests {
    use core::any::TypeId;
    use core::hash::{BuildHasher, Hash, Hasher};

    use super::{TypeIdState, key_map};

    #[test]
    fn type_ids_keep_their_own_hash() {
        let id = TypeId::of::<String>();
        let mut hasher = TypeIdState.build_hasher();
        id.hash(&mut hasher);
        let first = hasher.finish();

        let mut hasher = TypeIdState.build_hasher();
        id.hash(&mut hasher);
        assert_eq!(hasher.finish(), first);
        assert_ne!(TypeIdState.hash_one(TypeId::of::<u8>()), first);
    }

    #[test]
    fn aligned_addresses_stay_distinct() {
        let mut map = key_map();
        for index in 0..64_usize {
            map.insert(0x1000 + index * 16, index);
        }
        assert_eq!(map.len(), 64);
        assert_eq!(map[&(0x1000 + 5 * 16)], 5);
    }
}
