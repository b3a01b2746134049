use core::any::{Any, type_name};
use std::sync::Arc;

use crate::error::PickleError;
use crate::info::{TypeDescriptor, Typed};
use crate::reflect::Reflect;

/// Reads a field out of its owner, passed as `&dyn Any`.
pub type Getter = Arc<dyn Fn(&dyn Any) -> Option<&dyn Reflect> + Send + Sync>;

/// Writes a field into its owner, passed as `&mut dyn Any`.
pub type Setter =
    Arc<dyn Fn(&mut dyn Any, Box<dyn Reflect>) -> Result<(), PickleError> + Send + Sync>;

// Pins the higher-ranked signature on closures.
fn getter<G>(g: G) -> Getter
where
    G: for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Reflect> + Send + Sync + 'static,
{
    Arc::new(g)
}

fn setter<S>(s: S) -> Setter
where
    S: Fn(&mut dyn Any, Box<dyn Reflect>) -> Result<(), PickleError> + Send + Sync + 'static,
{
    Arc::new(s)
}

fn owner_mismatch<T>() -> PickleError {
    PickleError::mismatch(type_name::<T>(), "<field owner>")
}

/// How a field can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accessibility {
    /// Read and written directly.
    Public,
    /// Read and written through accessor methods.
    Reflective,
    /// No accessor at all. The field is never written and never read.
    Inaccessible,
}

// -----------------------------------------------------------------------------
// FieldDescriptor

/// One field of a record.
#[derive(Clone)]
pub struct FieldDescriptor {
    name: &'static str,
    declared: fn() -> &'static TypeDescriptor,
    access: Accessibility,
    getter: Option<Getter>,
    setter: Option<Setter>,
    param: Option<usize>,
    erased: bool,
}

impl FieldDescriptor {
    /// A field reached through plain references.
    pub fn public<T, F>(
        name: &'static str,
        get: impl Fn(&T) -> &F + Send + Sync + 'static,
        get_mut: impl Fn(&mut T) -> &mut F + Send + Sync + 'static,
    ) -> Self
    where
        T: Any,
        F: Reflect + Typed,
    {
        Self {
            name,
            declared: F::descriptor,
            access: Accessibility::Public,
            getter: Some(getter(move |owner: &dyn Any| {
                owner
                    .downcast_ref::<T>()
                    .map(|owner| get(owner) as &dyn Reflect)
            })),
            setter: Some(setter(move |owner: &mut dyn Any, value: Box<dyn Reflect>| {
                let owner = owner.downcast_mut::<T>().ok_or_else(owner_mismatch::<T>)?;
                *get_mut(owner) = value.take::<F>()?;
                Ok(())
            })),
            param: None,
            erased: false,
        }
    }

    /// A field reached through a getter and a setter method.
    pub fn accessor<T, F>(
        name: &'static str,
        get: impl Fn(&T) -> &F + Send + Sync + 'static,
        set: impl Fn(&mut T, F) + Send + Sync + 'static,
    ) -> Self
    where
        T: Any,
        F: Reflect + Typed,
    {
        Self {
            name,
            declared: F::descriptor,
            access: Accessibility::Reflective,
            getter: Some(getter(move |owner: &dyn Any| {
                owner
                    .downcast_ref::<T>()
                    .map(|owner| get(owner) as &dyn Reflect)
            })),
            setter: Some(setter(move |owner: &mut dyn Any, value: Box<dyn Reflect>| {
                let owner = owner.downcast_mut::<T>().ok_or_else(owner_mismatch::<T>)?;
                set(owner, value.take::<F>()?);
                Ok(())
            })),
            param: None,
            erased: false,
        }
    }

    /// A field without any accessor.
    pub fn inaccessible<F: Typed + ?Sized>(name: &'static str) -> Self {
        Self {
            name,
            declared: F::descriptor,
            access: Accessibility::Inaccessible,
            getter: None,
            setter: None,
            param: None,
            erased: false,
        }
    }

    /// Marks the field's type as an erased generic parameter.
    ///
    /// Records with such a field are never constructor-injected.
    #[inline]
    pub fn erased(mut self) -> Self {
        self.erased = true;
        self
    }

    /// Drops the setter, leaving the field writable only through a constructor.
    #[inline]
    pub fn read_only(mut self) -> Self {
        self.setter = None;
        self
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The declared type of the field.
    #[inline]
    pub fn declared(&self) -> &'static TypeDescriptor {
        (self.declared)()
    }

    #[inline]
    pub fn access(&self) -> Accessibility {
        self.access
    }

    #[inline]
    pub fn is_readable(&self) -> bool {
        self.getter.is_some()
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    #[inline]
    pub fn getter(&self) -> Option<&Getter> {
        self.getter.as_ref()
    }

    #[inline]
    pub fn setter(&self) -> Option<&Setter> {
        self.setter.as_ref()
    }

    /// Index of the constructor parameter with the same name, if any.
    #[inline]
    pub fn param(&self) -> Option<usize> {
        self.param
    }

    #[inline]
    pub fn is_erased_param(&self) -> bool {
        self.erased
    }

    #[inline]
    pub fn may_participate_in_cycle(&self) -> bool {
        self.declared().may_participate_in_cycle()
    }

    /// Reads the field of `owner`.
    #[inline]
    pub fn get<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Reflect> {
        self.getter.as_ref().and_then(|getter| getter(owner))
    }

    pub(crate) fn set_param(&mut self, param: Option<usize>) {
        self.param = param;
    }

    /// Re-roots the field of a base record onto a record that embeds it.
    pub(crate) fn project<T: Any, B: Any>(
        &self,
        project: &Arc<dyn Fn(&T) -> &B + Send + Sync>,
        project_mut: &Arc<dyn Fn(&mut T) -> &mut B + Send + Sync>,
    ) -> Self {
        let getter = self.getter.clone().map(|inner| {
            let project = Arc::clone(project);
            getter(move |owner: &dyn Any| {
                let owner = owner.downcast_ref::<T>()?;
                inner(project(owner) as &dyn Any)
            })
        });
        let setter = self.setter.clone().map(|inner| {
            let project_mut = Arc::clone(project_mut);
            setter(move |owner: &mut dyn Any, value: Box<dyn Reflect>| {
                let owner = owner.downcast_mut::<T>().ok_or_else(owner_mismatch::<T>)?;
                inner(project_mut(owner) as &mut dyn Any, value)
            })
        });
        Self {
            getter,
            setter,
            param: None,
            ..self.clone()
        }
    }
}
