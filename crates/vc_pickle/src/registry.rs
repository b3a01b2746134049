//! The process-wide cache of codecs, tags and dispatch tables.

use core::any::TypeId;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use hashbrown::hash_map::Entry;

use crate::codec::{Codec, CustomCodec};
use crate::dispatch::DispatchTable;
use crate::error::PickleError;
use crate::hash::{KeyMap, TypeIdMap, key_map, type_id_map};
use crate::info::{Alternative, FieldDescriptor, Hierarchy, TypeDescriptor, TypeKind, Typed, Upcast};

// -----------------------------------------------------------------------------
// CodecRegistry

/// Caches one codec per type, the tag index used to resolve decoded tags,
/// and the dispatch tables of abstract types.
///
/// Every cache is filled lazily and never shrinks. Concurrent first uses of
/// a type may generate its codec more than once, but only one is kept and
/// every caller observes the same [`Arc`].
///
/// # Examples
///
/// ```
/// use vc_pickle::CodecRegistry;
///
/// let registry = CodecRegistry::new();
/// assert!(registry.descriptor_by_tag("alloc::string::String").is_some());
///
/// let descriptor = <u32 as vc_pickle::info::Typed>::descriptor();
/// let first = registry.codec(descriptor).unwrap();
/// let second = registry.codec(descriptor).unwrap();
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
/// ```
pub struct CodecRegistry {
    codecs: RwLock<TypeIdMap<Arc<Codec>>>,
    tags: RwLock<KeyMap<&'static str, &'static TypeDescriptor>>,
    tables: RwLock<TypeIdMap<Arc<DispatchTable>>>,
    subtypes: RwLock<KeyMap<(TypeId, TypeId), Upcast>>,
}

impl Default for CodecRegistry {
    /// See [`CodecRegistry::new`].
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl CodecRegistry {
    /// Create an empty [`CodecRegistry`].
    pub fn empty() -> Self {
        Self {
            codecs: RwLock::new(type_id_map()),
            tags: RwLock::new(key_map()),
            tables: RwLock::new(type_id_map()),
            subtypes: RwLock::new(key_map()),
        }
    }

    /// Create a registry that knows the tags of the built-in types.
    ///
    /// - `()` `bool` `char`
    /// - `i8 - i64` `u8 - u64`
    /// - `f32` `f64`
    /// - `String`
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register::<()>();
        registry.register::<bool>();
        registry.register::<char>();
        registry.register::<i8>();
        registry.register::<i16>();
        registry.register::<i32>();
        registry.register::<i64>();
        registry.register::<u8>();
        registry.register::<u16>();
        registry.register::<u32>();
        registry.register::<u64>();
        registry.register::<f32>();
        registry.register::<f64>();
        registry.register::<String>();
        registry
    }

    /// The registry used by the free functions of this crate.
    ///
    /// Created on first use, with [`auto_register`](Self::auto_register)
    /// already applied.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<CodecRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let registry = Self::new();
            registry.auto_register();
            registry
        })
    }

    /// Makes the tag of `T` resolvable, together with every type reachable
    /// from its fields, elements and closed alternatives.
    ///
    /// Types that are only known as runtime subtypes of an open hierarchy
    /// must be registered on their own, see [`register_subtype`](Self::register_subtype).
    #[inline]
    pub fn register<T: ?Sized + Typed>(&self) {
        self.register_descriptor(T::descriptor());
    }

    /// See [`register`](Self::register).
    pub fn register_descriptor(&self, descriptor: &'static TypeDescriptor) {
        let mut stack = vec![descriptor];
        while let Some(descriptor) = stack.pop() {
            if !self.index_tag(descriptor) {
                continue;
            }
            match descriptor.kind() {
                TypeKind::Sequence(info) => stack.push(info.element()),
                TypeKind::Nullable(info) => stack.push(info.inner()),
                TypeKind::Shared(info) => stack.push(info.target()),
                TypeKind::Record(info) => {
                    stack.extend(info.fields().iter().map(FieldDescriptor::declared));
                }
                _ => {}
            }
            if let Hierarchy::Open(alternatives) = descriptor.hierarchy() {
                stack.extend(alternatives.iter().map(Alternative::descriptor));
            }
        }
    }

    // Returns `false` if the tag was already known.
    fn index_tag(&self, descriptor: &'static TypeDescriptor) -> bool {
        let tag = descriptor.tag();
        if self
            .tags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(tag)
        {
            return false;
        }
        let mut tags = self.tags.write().unwrap_or_else(PoisonError::into_inner);
        match tags.entry(tag) {
            Entry::Occupied(known) => {
                if known.get().type_id() != descriptor.type_id() {
                    log::warn!("type tag `{tag}` is used by more than one type");
                }
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(descriptor);
                true
            }
        }
    }

    /// Registers `descriptor` as a runtime subtype of the abstract type `base`.
    ///
    /// The subtype does not need to be listed among the alternatives of
    /// `base`. Usually called through [`register_subtype!`](crate::register_subtype).
    pub fn register_subtype(
        &self,
        base: &'static TypeDescriptor,
        descriptor: &'static TypeDescriptor,
        upcast: Upcast,
    ) {
        if base.is_final() {
            log::warn!(
                "`{}` is registered as a subtype of the final type `{}`",
                descriptor.tag(),
                base.tag(),
            );
        }
        self.subtypes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((base.type_id(), descriptor.type_id()), upcast);
        self.register_descriptor(descriptor);
    }

    /// The upcast of a registered runtime subtype.
    pub fn subtype(&self, base: TypeId, concrete: TypeId) -> Option<Upcast> {
        self.subtypes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(base, concrete))
            .copied()
    }

    /// Replaces the codec of `T` with a custom one.
    ///
    /// For a trait object type, the codec handles every value reached
    /// through a reference of that type.
    pub fn register_custom<T: ?Sized + Typed>(&self, codec: impl CustomCodec) {
        let descriptor = T::descriptor();
        log::debug!("custom codec registered for `{}`", descriptor.tag());
        let codec = Arc::new(Codec::custom(descriptor, Arc::new(codec)));
        self.codecs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(descriptor.type_id(), codec);
        self.register_descriptor(descriptor);
    }

    /// The cached codec of a type, if any.
    pub fn lookup(&self, type_id: TypeId) -> Option<Arc<Codec>> {
        self.codecs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
            .cloned()
    }

    /// The custom codec registered for a type, if any.
    #[inline]
    pub fn custom_codec(&self, descriptor: &TypeDescriptor) -> Option<Arc<Codec>> {
        self.lookup(descriptor.type_id())
            .filter(|codec| codec.is_custom())
    }

    /// The codec of a concrete type, generated on first use.
    pub fn codec(&self, descriptor: &'static TypeDescriptor) -> Result<Arc<Codec>, PickleError> {
        if let Some(codec) = self.lookup(descriptor.type_id()) {
            return Ok(codec);
        }

        // Generated outside the lock, a concurrent caller may do the same.
        let generated = Arc::new(Codec::generate(descriptor)?);
        let codec = {
            let mut codecs = self.codecs.write().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(codecs.entry(descriptor.type_id()).or_insert(generated))
        };
        log::debug!("codec ready for `{}`", descriptor.tag());
        Ok(codec)
    }

    /// The dispatch table of an abstract type, built on first use.
    pub fn dispatch_table(&self, base: &'static TypeDescriptor) -> Arc<DispatchTable> {
        if let Some(table) = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&base.type_id())
        {
            return Arc::clone(table);
        }

        let built = Arc::new(DispatchTable::build(base));
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(tables.entry(base.type_id()).or_insert(built))
    }

    /// The descriptor registered under a tag.
    pub fn descriptor_by_tag(&self, tag: &str) -> Option<&'static TypeDescriptor> {
        self.tags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tag)
            .copied()
    }

    /// Applies every [`auto_register!`](crate::auto_register) declaration.
    ///
    /// Repeated calls are cheap and do not insert duplicates.
    ///
    /// ## Return Value
    ///
    /// Returns `false` when the `auto_register` feature is disabled, in
    /// which case nothing is registered.
    #[cfg_attr(not(feature = "auto_register"), inline(always))]
    pub fn auto_register(&self) -> bool {
        #[cfg(feature = "auto_register")]
        {
            use crate::__macro_exports::AutoRegistration;
            for registration in inventory::iter::<AutoRegistration> {
                (registration.register)(self);
            }
            true
        }
        #[cfg(not(feature = "auto_register"))]
        {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::CodecRegistry;
    use crate::error::PickleError;
    use crate::info::Typed;

    #[test]
    fn concurrent_first_use_yields_one_codec() {
        let registry = CodecRegistry::empty();
        let descriptor = <Vec<String> as Typed>::descriptor();
        let codecs: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.codec(descriptor).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for codec in &codecs {
            assert!(Arc::ptr_eq(codec, &codecs[0]));
        }
    }

    #[test]
    fn registration_reaches_nested_types() {
        let registry = CodecRegistry::empty();
        registry.register::<Option<Vec<String>>>();
        assert!(
            registry
                .descriptor_by_tag(<Vec<String> as Typed>::descriptor().tag())
                .is_some()
        );
        assert!(registry.descriptor_by_tag("alloc::string::String").is_some());
        assert!(registry.descriptor_by_tag("u8").is_none());
    }

    #[test]
    fn shared_references_have_no_standalone_codec() {
        let registry = CodecRegistry::new();
        assert!(matches!(
            registry.codec(<crate::Ref<u8> as Typed>::descriptor()),
            Err(PickleError::NoCodec(_))
        ));
        assert!(registry.codec(<Option<u8> as Typed>::descriptor()).is_ok());
        assert!(matches!(
            registry.codec(<core::convert::Infallible as Typed>::descriptor()),
            Err(PickleError::UnsupportedType(_))
        ));
    }
}
