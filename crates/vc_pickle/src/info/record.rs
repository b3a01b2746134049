use core::any::{Any, type_name};
use core::fmt;
use core::marker::PhantomData;
use std::sync::Arc;

use crate::error::PickleError;
use crate::info::{Factory, FieldDescriptor, TypeDescriptor, TypeKind, Typed};
use crate::reflect::Reflect;

// -----------------------------------------------------------------------------
// RecordInfo

/// The field list and construction shape of a record.
pub struct RecordInfo {
    fields: Box<[FieldDescriptor]>,
    constructor: Option<Constructor>,
    shell: Option<Factory>,
}

impl RecordInfo {
    /// Fields in declaration order, most-derived first.
    #[inline]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name() == name)
    }

    #[inline]
    pub fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    /// Allocates an instance without running the constructor.
    #[inline]
    pub fn shell(&self) -> Option<Factory> {
        self.shell
    }
}

// -----------------------------------------------------------------------------
// Constructor

type BuildFn = Arc<dyn Fn(&mut FieldBag) -> Result<Box<dyn Reflect>, PickleError> + Send + Sync>;

/// A primary constructor: named parameters and a build function.
#[derive(Clone)]
pub struct Constructor {
    params: Box<[&'static str]>,
    build: BuildFn,
}

impl Constructor {
    #[inline]
    pub fn params(&self) -> &[&'static str] {
        &self.params
    }

    /// Runs the constructor over the collected arguments.
    #[inline]
    pub fn construct(&self, bag: &mut FieldBag) -> Result<Box<dyn Reflect>, PickleError> {
        (self.build)(bag)
    }
}

/// Constructor arguments collected while reading a record.
#[derive(Default)]
pub struct FieldBag {
    values: Vec<(&'static str, Box<dyn Reflect>)>,
}

impl FieldBag {
    #[inline]
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    pub fn insert(&mut self, name: &'static str, value: Box<dyn Reflect>) {
        match self.values.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.values.push((name, value)),
        }
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.values.iter().any(|(key, _)| *key == name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Removes an argument and downcasts it to `T`.
    ///
    /// # Examples
    ///
    /// ```
    /// use vc_pickle::info::FieldBag;
    ///
    /// let mut bag = FieldBag::new();
    /// bag.insert("x", Box::new(3_i32));
    /// assert_eq!(bag.take::<i32>("x").unwrap(), 3);
    /// assert!(bag.take::<i32>("x").is_err());
    /// ```
    pub fn take<T: Any>(&mut self, name: &str) -> Result<T, PickleError> {
        let Some(index) = self.values.iter().position(|(key, _)| *key == name) else {
            return Err(PickleError::Decode(format!(
                "missing constructor argument `{name}`"
            )));
        };
        let (_, value) = self.values.swap_remove(index);
        value.take::<T>()
    }
}

impl fmt::Debug for FieldBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.values.iter().map(|(name, _)| name))
            .finish()
    }
}

// -----------------------------------------------------------------------------
// RecordBuilder

/// Builds the [`TypeDescriptor`] of a record type.
///
/// Usually generated by [`impl_record!`](crate::impl_record).
///
/// # Examples
///
/// ```
/// use vc_pickle::info::{RecordBuilder, TypeDescriptor, Typed, DescriptorCell};
///
/// #[derive(Default)]
/// struct Point { x: i32, y: i32 }
///
/// impl vc_pickle::Reflect for Point {
///     fn represented_descriptor(&self) -> &'static TypeDescriptor { <Self as Typed>::descriptor() }
///     fn reflect_ref(&self) -> vc_pickle::ReflectRef<'_> { vc_pickle::ReflectRef::Record }
///     vc_pickle::reflect_casts!();
/// }
///
/// impl Typed for Point {
///     fn descriptor() -> &'static TypeDescriptor {
///         static CELL: DescriptorCell = DescriptorCell::new();
///         CELL.get_or_init(|| {
///             RecordBuilder::<Point>::new()
///                 .public_field("x", |p| &p.x, |p| &mut p.x)
///                 .public_field("y", |p| &p.y, |p| &mut p.y)
///                 .constructor(&["x", "y"], |bag| Ok(Point { x: bag.take("x")?, y: bag.take("y")? }))
///                 .build()
///         })
///     }
/// }
///
/// let record = <Point as Typed>::descriptor().as_record().unwrap();
/// let names: Vec<_> = record.fields().iter().map(|f| f.name()).collect();
/// assert_eq!(names, ["x", "y"]);
/// assert_eq!(record.field("y").unwrap().param(), Some(1));
/// ```
pub struct RecordBuilder<T> {
    tag: Option<&'static str>,
    sharing: Option<bool>,
    fields: Vec<FieldDescriptor>,
    inherited: Vec<FieldDescriptor>,
    constructor: Option<Constructor>,
    shell: Option<Factory>,
    marker: PhantomData<fn() -> T>,
}

impl<T: Reflect + Typed> Default for RecordBuilder<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Reflect + Typed> RecordBuilder<T> {
    pub fn new() -> Self {
        Self {
            tag: None,
            sharing: None,
            fields: Vec::new(),
            inherited: Vec::new(),
            constructor: None,
            shell: None,
            marker: PhantomData,
        }
    }

    /// Overrides the type tag, which defaults to the type name.
    #[inline]
    pub fn tag(mut self, tag: &'static str) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Enables or disables identity sharing. Enabled by default.
    #[inline]
    pub fn sharing(mut self, sharing: bool) -> Self {
        self.sharing = Some(sharing);
        self
    }

    #[inline]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn public_field<F: Reflect + Typed>(
        self,
        name: &'static str,
        get: impl Fn(&T) -> &F + Send + Sync + 'static,
        get_mut: impl Fn(&mut T) -> &mut F + Send + Sync + 'static,
    ) -> Self {
        self.field(FieldDescriptor::public(name, get, get_mut))
    }

    pub fn accessor_field<F: Reflect + Typed>(
        self,
        name: &'static str,
        get: impl Fn(&T) -> &F + Send + Sync + 'static,
        set: impl Fn(&mut T, F) + Send + Sync + 'static,
    ) -> Self {
        self.field(FieldDescriptor::accessor(name, get, set))
    }

    pub fn inaccessible_field<F: Typed + ?Sized>(self, name: &'static str) -> Self {
        self.field(FieldDescriptor::inaccessible::<F>(name))
    }

    /// Flattens the fields of an embedded base record into this one.
    ///
    /// Fields declared on `T` come first and win over base fields of the same name.
    pub fn extends<B: Reflect + Typed>(
        mut self,
        project: impl Fn(&T) -> &B + Send + Sync + 'static,
        project_mut: impl Fn(&mut T) -> &mut B + Send + Sync + 'static,
    ) -> Self {
        let Some(base) = B::descriptor().as_record() else {
            log::warn!(
                "`{}` extends `{}` which is not a record",
                type_name::<T>(),
                type_name::<B>(),
            );
            return self;
        };
        let project: Arc<dyn Fn(&T) -> &B + Send + Sync> = Arc::new(project);
        let project_mut: Arc<dyn Fn(&mut T) -> &mut B + Send + Sync> = Arc::new(project_mut);
        self.inherited.extend(
            base.fields()
                .iter()
                .map(|field| field.project(&project, &project_mut)),
        );
        self
    }

    /// Declares the primary constructor.
    pub fn constructor(
        mut self,
        params: &[&'static str],
        build: impl Fn(&mut FieldBag) -> Result<T, PickleError> + Send + Sync + 'static,
    ) -> Self {
        self.constructor = Some(Constructor {
            params: params.into(),
            build: Arc::new(
                move |bag: &mut FieldBag| -> Result<Box<dyn Reflect>, PickleError> {
                    Ok(Box::new(build(bag)?))
                },
            ),
        });
        self
    }

    /// Declares how to allocate an instance without its constructor.
    #[inline]
    pub fn shell(mut self, shell: Factory) -> Self {
        self.shell = Some(shell);
        self
    }

    /// Uses [`Default`] as the shell.
    #[inline]
    pub fn default_shell(self) -> Self
    where
        T: Default,
    {
        self.shell(default_shell::<T>)
    }

    pub fn build(self) -> TypeDescriptor {
        let mut fields = self.fields;
        for field in self.inherited {
            if fields.iter().any(|own| own.name() == field.name()) {
                log::debug!(
                    "field `{}` of `{}` shadows an inherited field",
                    field.name(),
                    type_name::<T>(),
                );
            } else {
                fields.push(field);
            }
        }

        if let Some(constructor) = &self.constructor {
            for field in &mut fields {
                let param = constructor.params().iter().position(|p| *p == field.name());
                field.set_param(param);
            }
            for param in constructor.params() {
                if !fields.iter().any(|field| field.name() == *param) {
                    log::warn!(
                        "constructor parameter `{param}` of `{}` names no field",
                        type_name::<T>(),
                    );
                }
            }
        }

        let info = RecordInfo {
            fields: fields.into_boxed_slice(),
            constructor: self.constructor,
            shell: self.shell,
        };
        let mut descriptor = TypeDescriptor::new::<T>(TypeKind::Record(info));
        if let Some(tag) = self.tag {
            descriptor = descriptor.with_tag(tag);
        }
        if let Some(sharing) = self.sharing {
            descriptor = descriptor.with_sharing(sharing);
        }
        descriptor
    }
}

fn default_shell<T: Default + Reflect>() -> Box<dyn Reflect> {
    Box::new(T::default())
}
