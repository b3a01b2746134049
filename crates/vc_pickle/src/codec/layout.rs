use crate::error::{AccessError, PickleError};
use crate::info::{Constructor, Factory, FieldDescriptor, RecordInfo, TypeDescriptor};

/// The wire group of a field. Groups are written in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldGroup {
    /// Cannot reach a shared reference.
    Acyclic,
    /// May reach a shared reference, read before the instance exists.
    Eager,
    /// May reach a shared reference, read after the instance exists.
    Deferred,
}

/// How the reader obtains an instance.
#[derive(Clone)]
pub(crate) enum Construction {
    /// Run the primary constructor with the fields as arguments.
    Direct(Constructor),
    /// Allocate a shell and assign every field.
    Shell(Factory),
    /// No way to build an instance. The record can be written, not read.
    Unavailable,
}

/// One serialized field.
#[derive(Clone)]
pub struct FieldPlan {
    field: FieldDescriptor,
    declared: &'static TypeDescriptor,
    group: FieldGroup,
}

impl FieldPlan {
    #[inline]
    pub fn field(&self) -> &FieldDescriptor {
        &self.field
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.field.name()
    }

    #[inline]
    pub fn declared(&self) -> &'static TypeDescriptor {
        self.declared
    }

    #[inline]
    pub fn group(&self) -> FieldGroup {
        self.group
    }
}

/// The field order and construction strategy shared by the writer and the
/// reader of one record type.
#[derive(Clone)]
pub struct RecordLayout {
    fields: Vec<FieldPlan>,
    construction: Construction,
}

impl RecordLayout {
    /// Plans the layout of a record.
    ///
    /// Fields without a getter are left out. The constructor is used when
    /// every parameter names a readable field and no field has an erased
    /// generic type, otherwise the record falls back to its shell. A record
    /// with neither is planned anyway: it writes normally and fails with
    /// [`PickleError::NotConstructible`] when read.
    pub fn plan(descriptor: &'static TypeDescriptor, info: &RecordInfo) -> Result<Self, PickleError> {
        let owner = descriptor.tag();
        let construction = choose_construction(owner, info);

        let mut fields = Vec::with_capacity(info.fields().len());
        for field in info.fields() {
            if !field.is_readable() {
                log::debug!(
                    "{}",
                    AccessError {
                        owner,
                        field: field.name(),
                    }
                );
                continue;
            }
            let declared = field.declared();
            if declared.is_never() {
                return Err(PickleError::UnsupportedType(format!(
                    "{owner}.{}: {}",
                    field.name(),
                    declared.tag()
                )));
            }
            let group = group_of(field, declared, &construction);
            fields.push(FieldPlan {
                field: field.clone(),
                declared,
                group,
            });
        }
        // Stable, so declaration order survives within a group.
        fields.sort_by_key(FieldPlan::group);

        Ok(Self {
            fields,
            construction,
        })
    }

    #[inline]
    pub fn fields(&self) -> &[FieldPlan] {
        &self.fields
    }

    /// Returns `true` if the reader runs the primary constructor.
    #[inline]
    pub fn is_direct(&self) -> bool {
        matches!(self.construction, Construction::Direct(_))
    }

    /// Returns `true` if the reader can build an instance.
    #[inline]
    pub fn is_readable(&self) -> bool {
        !matches!(self.construction, Construction::Unavailable)
    }

    #[inline]
    pub(crate) fn construction(&self) -> &Construction {
        &self.construction
    }

    /// Number of fields read before the instance is created.
    pub fn instantiate_at(&self) -> usize {
        match self.construction {
            Construction::Shell(_) | Construction::Unavailable => 0,
            Construction::Direct(_) => self
                .fields
                .iter()
                .position(|plan| plan.group == FieldGroup::Deferred)
                .unwrap_or(self.fields.len()),
        }
    }
}

fn choose_construction(owner: &str, info: &RecordInfo) -> Construction {
    let injectable = info.constructor().filter(|constructor| {
        info.fields().iter().all(|field| !field.is_erased_param())
            && constructor
                .params()
                .iter()
                .all(|param| info.field(param).is_some_and(FieldDescriptor::is_readable))
    });
    match (injectable, info.shell()) {
        (Some(constructor), _) => Construction::Direct(constructor.clone()),
        (None, Some(shell)) => Construction::Shell(shell),
        (None, None) => {
            log::debug!("`{owner}` has no usable constructor or shell and is write-only");
            Construction::Unavailable
        }
    }
}

fn group_of(
    field: &FieldDescriptor,
    declared: &TypeDescriptor,
    construction: &Construction,
) -> FieldGroup {
    if !declared.may_participate_in_cycle() {
        return FieldGroup::Acyclic;
    }
    match construction {
        Construction::Shell(_) | Construction::Unavailable => FieldGroup::Deferred,
        Construction::Direct(_) => {
            let deferrable = field.is_writable() && declared.placeholder().is_some();
            if field.param().is_some() && !deferrable {
                FieldGroup::Eager
            } else {
                FieldGroup::Deferred
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldGroup, RecordLayout};
    use crate::info::{DescriptorCell, FieldDescriptor, RecordBuilder, TypeDescriptor, Typed};
    use crate::reflect::{Ref, Reflect, ReflectRef};

    #[allow(dead_code)]
    struct Mixed {
        next: Option<Ref<Mixed>>,
        id: u32,
        items: Vec<String>,
        label: String,
        owner: Ref<u8>,
        hidden: u8,
    }

    impl Reflect for Mixed {
        fn represented_descriptor(&self) -> &'static TypeDescriptor {
            <Self as Typed>::descriptor()
        }
        fn reflect_ref(&self) -> ReflectRef<'_> {
            ReflectRef::Record
        }
        crate::reflect_casts!();
    }

    impl Typed for Mixed {
        fn descriptor() -> &'static TypeDescriptor {
            static CELL: DescriptorCell = DescriptorCell::new();
            CELL.get_or_init(|| {
                RecordBuilder::<Mixed>::new()
                    .public_field("next", |m| &m.next, |m| &mut m.next)
                    .public_field("id", |m| &m.id, |m| &mut m.id)
                    .field(
                        FieldDescriptor::public(
                            "items",
                            |m: &Mixed| &m.items,
                            |m: &mut Mixed| &mut m.items,
                        )
                        .read_only(),
                    )
                    .public_field("label", |m| &m.label, |m| &mut m.label)
                    .public_field("owner", |m| &m.owner, |m| &mut m.owner)
                    .inaccessible_field::<u8>("hidden")
                    .constructor(&["id", "items", "owner", "next"], |bag| {
                        Ok(Mixed {
                            next: bag.take("next")?,
                            id: bag.take("id")?,
                            items: bag.take("items")?,
                            label: String::new(),
                            owner: bag.take("owner")?,
                            hidden: 0,
                        })
                    })
                    .build()
            })
        }
    }

    #[allow(dead_code)]
    struct Orphan {
        value: Ref<u8>,
    }

    impl Reflect for Orphan {
        fn represented_descriptor(&self) -> &'static TypeDescriptor {
            <Self as Typed>::descriptor()
        }
        fn reflect_ref(&self) -> ReflectRef<'_> {
            ReflectRef::Record
        }
        crate::reflect_casts!();
    }

    impl Typed for Orphan {
        fn descriptor() -> &'static TypeDescriptor {
            static CELL: DescriptorCell = DescriptorCell::new();
            CELL.get_or_init(|| {
                RecordBuilder::<Orphan>::new()
                    .public_field("value", |o| &o.value, |o| &mut o.value)
                    .build()
            })
        }
    }

    #[test]
    fn fields_are_grouped_by_cycle_participation() {
        let descriptor = <Mixed as Typed>::descriptor();
        let layout = RecordLayout::plan(descriptor, descriptor.as_record().unwrap()).unwrap();
        let order: Vec<_> = layout
            .fields()
            .iter()
            .map(|plan| (plan.name(), plan.group()))
            .collect();
        assert_eq!(
            order,
            [
                ("id", FieldGroup::Acyclic),
                ("label", FieldGroup::Acyclic),
                ("items", FieldGroup::Eager),
                ("owner", FieldGroup::Eager),
                ("next", FieldGroup::Deferred),
            ]
        );
        assert!(layout.is_direct());
        assert_eq!(layout.instantiate_at(), 4);
    }

    #[test]
    fn records_without_a_constructor_or_shell_are_write_only() {
        let descriptor = <Orphan as Typed>::descriptor();
        let layout = RecordLayout::plan(descriptor, descriptor.as_record().unwrap()).unwrap();
        assert!(!layout.is_readable());
        assert!(!layout.is_direct());
        assert_eq!(layout.instantiate_at(), 0);
        assert_eq!(layout.fields()[0].group(), FieldGroup::Deferred);
    }
}
