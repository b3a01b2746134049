//! Object identity tracking for one top-level call.
//!
//! Ids are handed out in discovery order on both sides. As long as the writer
//! and the reader discover shared objects in the same order, a back-reference
//! always names an id the reader has already allocated.

use core::any::Any;
use core::fmt;
use std::rc::Rc;

use crate::error::PickleError;
use crate::hash::{KeyMap, key_map};
use crate::info::TypeDescriptor;

// -----------------------------------------------------------------------------
// ObjectId

/// The id of a shared object within one encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u32);

impl ObjectId {
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[inline]
    const fn index(self) -> usize {
        self.0 as usize
    }

    fn from_index(index: usize) -> Result<Self, PickleError> {
        u32::try_from(index)
            .map(Self)
            .map_err(|_| PickleError::Encode("too many shared objects".into()))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// -----------------------------------------------------------------------------
// WriteRegistry

/// Maps shared allocations to the ids assigned while writing.
///
/// Every registered handle is kept alive until the registry is dropped, so an
/// address is never reused by a different object during the call.
pub struct WriteRegistry {
    ids: KeyMap<usize, ObjectId>,
    anchors: Vec<Box<dyn Any>>,
}

impl Default for WriteRegistry {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl WriteRegistry {
    #[inline]
    pub fn new() -> Self {
        Self {
            ids: key_map(),
            anchors: Vec::new(),
        }
    }

    /// The id of an already seen object, `None` if it is unseen.
    #[inline]
    pub fn lookup(&self, address: usize) -> Option<ObjectId> {
        self.ids.get(&address).copied()
    }

    /// Assigns the next id to an object, or returns the one it already has.
    pub fn assign(&mut self, address: usize, anchor: Box<dyn Any>) -> Result<ObjectId, PickleError> {
        if let Some(id) = self.lookup(address) {
            return Ok(id);
        }
        let id = ObjectId::from_index(self.anchors.len())?;
        self.ids.insert(address, id);
        self.anchors.push(anchor);
        Ok(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

impl Drop for WriteRegistry {
    fn drop(&mut self) {
        log::trace!("releasing write registry with {} objects", self.anchors.len());
    }
}

// -----------------------------------------------------------------------------
// ReadRegistry

type Registered = (Rc<dyn Any>, &'static TypeDescriptor);

/// Maps ids to the objects constructed while reading.
///
/// An id is allocated by [`preregister`](Self::preregister) before the
/// object's fields are read and filled by [`register`](Self::register) as soon
/// as an instance exists, possibly before its fields are complete.
#[derive(Default)]
pub struct ReadRegistry {
    objects: Vec<Option<Registered>>,
}

impl ReadRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next id.
    pub fn preregister(&mut self) -> Result<ObjectId, PickleError> {
        let id = ObjectId::from_index(self.objects.len())?;
        self.objects.push(None);
        Ok(id)
    }

    /// Binds an instance to a preregistered id.
    pub fn register(
        &mut self,
        id: ObjectId,
        object: Rc<dyn Any>,
        descriptor: &'static TypeDescriptor,
    ) -> Result<(), PickleError> {
        match self.objects.get_mut(id.index()) {
            Some(slot) => {
                *slot = Some((object, descriptor));
                Ok(())
            }
            None => Err(PickleError::Decode(format!("object {id} was never allocated"))),
        }
    }

    /// The object registered under `id`, with its concrete descriptor.
    pub fn resolve(&self, id: ObjectId) -> Result<(Rc<dyn Any>, &'static TypeDescriptor), PickleError> {
        match self.objects.get(id.index()) {
            Some(Some((object, descriptor))) => Ok((Rc::clone(object), *descriptor)),
            Some(None) => Err(PickleError::UnresolvedReference(id)),
            None => Err(PickleError::Decode(format!(
                "back-reference to unknown object {id}"
            ))),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Drop for ReadRegistry {
    fn drop(&mut self) {
        log::trace!("releasing read registry with {} objects", self.objects.len());
    }
}
