use std::rc::Rc;

use crate::codec::layout::Construction;
use crate::codec::{FieldGroup, Instance, RecordLayout};
use crate::dispatch::ReadContext;
use crate::error::PickleError;
use crate::format::Reader;
use crate::identity::ObjectId;
use crate::info::{FieldBag, Setter, TypeDescriptor, TypeKind};
use crate::reflect::Reflect;

/// Upper bound on capacity reserved from an untrusted length.
const MAX_PREALLOCATION: usize = 1024;

// -----------------------------------------------------------------------------
// RecordReader

enum Target {
    /// Collected as a constructor argument.
    Param,
    /// Assigned through the setter once the instance exists.
    Patch(Setter),
    /// Read to keep the stream aligned, then dropped.
    Discard,
}

struct FieldReader {
    name: &'static str,
    declared: &'static TypeDescriptor,
    target: Target,
}

/// Reads a record in two phases.
///
/// Fields before `instantiate_at` are read first. Then the instance is
/// created and, when it is shared, registered so that later fields can refer
/// back to it. The remaining fields are assigned to the registered instance.
pub(crate) struct RecordReader {
    descriptor: &'static TypeDescriptor,
    construction: Construction,
    fields: Box<[FieldReader]>,
    instantiate_at: usize,
    /// Constructor parameters read after construction, with their declared types.
    deferred: Box<[(&'static str, &'static TypeDescriptor)]>,
}

impl RecordReader {
    pub(crate) fn new(descriptor: &'static TypeDescriptor, layout: RecordLayout) -> Self {
        let direct = layout.is_direct();
        let fields = layout
            .fields()
            .iter()
            .map(|plan| {
                let field = plan.field();
                let target = if direct
                    && field.param().is_some()
                    && plan.group() != FieldGroup::Deferred
                {
                    Target::Param
                } else if let Some(setter) = field.setter() {
                    Target::Patch(setter.clone())
                } else {
                    log::debug!(
                        "field `{}` of `{}` has no setter and is skipped on read",
                        plan.name(),
                        descriptor.tag(),
                    );
                    Target::Discard
                };
                FieldReader {
                    name: plan.name(),
                    declared: plan.declared(),
                    target,
                }
            })
            .collect();
        let deferred = layout
            .fields()
            .iter()
            .filter(|plan| {
                direct && plan.field().param().is_some() && plan.group() == FieldGroup::Deferred
            })
            .map(|plan| (plan.name(), plan.declared()))
            .collect();
        Self {
            descriptor,
            construction: layout.construction().clone(),
            fields,
            instantiate_at: layout.instantiate_at(),
            deferred,
        }
    }

    pub(crate) fn read(
        &self,
        cx: &mut ReadContext<'_>,
        reader: &mut dyn Reader,
        slot: Option<ObjectId>,
    ) -> Result<Instance, PickleError> {
        let mut bag = FieldBag::new();
        let mut pending: Vec<(&Setter, Box<dyn Reflect>)> = Vec::new();
        let mut instance: Option<Instance> = None;

        for (index, field) in self.fields.iter().enumerate() {
            if index == self.instantiate_at {
                instance = Some(self.instantiate(cx, &mut bag, &mut pending, slot)?);
            }
            let value = {
                let mut scoped = reader.read_field(field.name)?;
                cx.read_value(&mut *scoped, field.declared)?
            };
            match &field.target {
                Target::Param => bag.insert(field.name, value),
                Target::Patch(setter) => match instance.as_mut() {
                    Some(instance) => instance.assign(setter, value)?,
                    None => pending.push((setter, value)),
                },
                Target::Discard => {}
            }
        }

        match instance {
            Some(instance) => Ok(instance),
            None => self.instantiate(cx, &mut bag, &mut pending, slot),
        }
    }

    fn instantiate(
        &self,
        cx: &mut ReadContext<'_>,
        bag: &mut FieldBag,
        pending: &mut Vec<(&Setter, Box<dyn Reflect>)>,
        slot: Option<ObjectId>,
    ) -> Result<Instance, PickleError> {
        let value = match &self.construction {
            Construction::Direct(constructor) => {
                for &(name, declared) in &self.deferred {
                    let placeholder = declared.placeholder().ok_or_else(|| {
                        PickleError::NotConstructible(self.descriptor.tag().into())
                    })?;
                    bag.insert(name, placeholder);
                }
                constructor.construct(bag)?
            }
            Construction::Shell(shell) => shell(),
            Construction::Unavailable => {
                return Err(PickleError::NotConstructible(self.descriptor.tag().into()));
            }
        };

        let mut instance = match slot {
            Some(id) => {
                let object = self.descriptor.instance_or_err()?.share(value)?;
                cx.identity_mut()
                    .register(id, Rc::clone(&object), self.descriptor)?;
                Instance::Shared {
                    object,
                    descriptor: self.descriptor,
                }
            }
            None => Instance::Owned(value),
        };
        for (setter, value) in pending.drain(..) {
            instance.assign(setter, value)?;
        }
        Ok(instance)
    }
}

// -----------------------------------------------------------------------------
// Sequences

pub(crate) fn read_sequence(
    cx: &mut ReadContext<'_>,
    reader: &mut dyn Reader,
    descriptor: &'static TypeDescriptor,
) -> Result<Box<dyn Reflect>, PickleError> {
    let TypeKind::Sequence(info) = descriptor.kind() else {
        return Err(PickleError::NoCodec(descriptor.tag().into()));
    };
    let element = info.element();

    let len = reader.begin_collection()?;
    let mut items = Vec::with_capacity(len.min(MAX_PREALLOCATION));
    for _ in 0..len {
        let mut scoped = reader.read_element()?;
        items.push(cx.read_value(&mut *scoped, element)?);
    }
    reader.end_collection()?;
    info.collect(items)
}
