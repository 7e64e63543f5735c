//! Constructor and property descriptor tables.
//!
//! The container never inspects types at runtime. A registered implementation
//! instead declares, once, the constructors it can be built through and the
//! writable properties it accepts - a descriptor table the resolver ranks and
//! walks at resolution time.

use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::key::{ServiceKey, SharedAny};

/// A type the resolver can construct.
///
/// `constructors` returns every way the type can be built, each with its
/// declared parameter list. At resolution time the longest constructor whose
/// parameters can all be resolved wins, ties broken by declaration order.
///
/// `properties` declares writable slots injected after construction. An
/// injected property overwrites whatever the constructor put there, unless
/// injecting it would re-enter a resolution already in progress - then the
/// slot is left alone.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use pipewright::{Args, Constructor, DiResult, Injectable, Property, ServiceKey};
///
/// struct Engine;
///
/// impl Injectable for Engine {
///     fn constructors() -> Vec<Constructor<Self>> {
///         vec![Constructor::parameterless(|| Engine)]
///     }
/// }
///
/// struct Car {
///     engine: Arc<Engine>,
///     radio: Option<Arc<Radio>>,
/// }
///
/// struct Radio;
///
/// impl Injectable for Radio {
///     fn constructors() -> Vec<Constructor<Self>> {
///         vec![Constructor::parameterless(|| Radio)]
///     }
/// }
///
/// impl Injectable for Car {
///     fn constructors() -> Vec<Constructor<Self>> {
///         vec![Constructor::new(
///             vec![ServiceKey::of::<Engine>()],
///             |args: &mut Args| {
///                 Ok(Car { engine: args.concrete::<Engine>()?, radio: None })
///             },
///         )]
///     }
///
///     fn properties() -> Vec<Property<Self>> {
///         vec![Property::concrete::<Radio, _>(|car: &mut Car, radio| {
///             car.radio = Some(radio)
///         })]
///     }
/// }
/// ```
pub trait Injectable: Send + Sync + Sized + 'static {
    /// The constructor table, in declaration order.
    fn constructors() -> Vec<Constructor<Self>>;

    /// Writable properties injected after construction.
    fn properties() -> Vec<Property<Self>> {
        Vec::new()
    }
}

/// Resolved constructor arguments, consumed in declared order.
pub struct Args<'a> {
    values: &'a [SharedAny],
    index: usize,
}

impl<'a> Args<'a> {
    pub(crate) fn new(values: &'a [SharedAny]) -> Self {
        Self { values, index: 0 }
    }

    fn next_value(&mut self) -> DiResult<&'a SharedAny> {
        let value = self
            .values
            .get(self.index)
            .ok_or(DiError::TypeMismatch("constructor argument past declared list"))?;
        self.index += 1;
        Ok(value)
    }

    /// Takes the next argument as a concrete service.
    pub fn concrete<T: Send + Sync + 'static>(&mut self) -> DiResult<Arc<T>> {
        self.next_value()?
            .clone()
            .downcast::<T>()
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Takes the next argument as a trait service.
    pub fn of_trait<T: ?Sized + 'static>(&mut self) -> DiResult<Arc<T>> {
        self.next_value()?
            .downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or(DiError::TypeMismatch(std::any::type_name::<T>()))
    }
}

type BuildFn<T> = Arc<dyn Fn(&mut Args<'_>) -> DiResult<T> + Send + Sync>;

/// One way to construct a `T`: a declared parameter list plus a build closure.
pub struct Constructor<T> {
    pub(crate) params: Vec<ServiceKey>,
    pub(crate) build: BuildFn<T>,
}

impl<T> Constructor<T> {
    /// A constructor with dependencies. The closure receives the resolved
    /// arguments in the same order as `params`.
    pub fn new<F>(params: Vec<ServiceKey>, build: F) -> Self
    where
        F: Fn(&mut Args<'_>) -> DiResult<T> + Send + Sync + 'static,
    {
        Self {
            params,
            build: Arc::new(build),
        }
    }

    /// A constructor with no dependencies.
    pub fn parameterless<F>(build: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            params: Vec::new(),
            build: Arc::new(move |_| Ok(build())),
        }
    }

    /// Declared parameter keys, in order.
    pub fn params(&self) -> &[ServiceKey] {
        &self.params
    }
}

impl<T> Clone for Constructor<T> {
    fn clone(&self) -> Self {
        Self {
            params: self.params.clone(),
            build: self.build.clone(),
        }
    }
}

type SetFn<T> = Arc<dyn Fn(&mut T, SharedAny) -> DiResult<()> + Send + Sync>;

/// A writable property slot on `T`, injected when its service is registered.
pub struct Property<T> {
    pub(crate) target: ServiceKey,
    pub(crate) set: SetFn<T>,
}

impl<T> Property<T> {
    /// A property holding a concrete service.
    pub fn concrete<S, F>(set: F) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn(&mut T, Arc<S>) + Send + Sync + 'static,
    {
        Self {
            target: ServiceKey::of::<S>(),
            set: Arc::new(move |target, value| {
                let value = value
                    .downcast::<S>()
                    .map_err(|_| DiError::TypeMismatch(std::any::type_name::<S>()))?;
                set(target, value);
                Ok(())
            }),
        }
    }

    /// A property holding a trait service.
    pub fn of_trait<S, F>(set: F) -> Self
    where
        S: ?Sized + 'static,
        F: Fn(&mut T, Arc<S>) + Send + Sync + 'static,
    {
        Self {
            target: ServiceKey::of::<S>(),
            set: Arc::new(move |target, value| {
                let value = value
                    .downcast_ref::<Arc<S>>()
                    .cloned()
                    .ok_or(DiError::TypeMismatch(std::any::type_name::<S>()))?;
                set(target, value);
                Ok(())
            }),
        }
    }

    /// The service this property expects.
    pub fn target(&self) -> ServiceKey {
        self.target
    }
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target,
            set: self.set.clone(),
        }
    }
}
