//! The dependency resolver: registration lookup, construction, injection,
//! and cycle detection.

use std::any::TypeId;
use std::sync::Arc;

use tracing::debug;

use crate::error::{DiError, DiResult};
use crate::injectable::Injectable;
use crate::key::{ServiceKey, SharedAny};
use crate::lifetime::Lifetime;
use crate::registration::{
    ConstructedProvider, ErasedConstructor, Provider, Registration, RegistrationStore,
};

pub(crate) mod lifetimes;

/// The in-progress resolution set for one resolution call stack.
///
/// Cycles are detected by re-entry before recursing, never by waiting for
/// the stack to overflow.
#[derive(Default)]
pub(crate) struct ResolutionPath {
    entries: Vec<ServiceKey>,
}

impl ResolutionPath {
    fn enter(&mut self, key: ServiceKey) -> DiResult<()> {
        self.check(key)?;
        self.entries.push(key);
        Ok(())
    }

    fn check(&self, key: ServiceKey) -> DiResult<()> {
        if self.entries.contains(&key) {
            let mut names: Vec<&'static str> = self.entries.iter().map(|k| k.name()).collect();
            names.push(key.name());
            return Err(DiError::Cycle(names));
        }
        Ok(())
    }

    fn exit(&mut self) {
        self.entries.pop();
    }

    fn contains(&self, key: &ServiceKey) -> bool {
        self.entries.contains(key)
    }
}

/// Creates, scopes, and wires object instances from unconstrained
/// registrations.
///
/// The resolver is safe to share across threads: registration and resolution
/// may happen concurrently against the same instance. No atomicity is
/// promised across two independent calls - a `has_dependency` check followed
/// by an `add_dependency` is not a transaction.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use pipewright::{Args, Constructor, DependencyResolver, Injectable, Lifetime, ServiceKey};
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
///
/// impl Greeter for English {
///     fn greet(&self) -> String {
///         "hello".to_string()
///     }
/// }
///
/// impl Injectable for English {
///     fn constructors() -> Vec<Constructor<Self>> {
///         vec![Constructor::parameterless(|| English)]
///     }
/// }
///
/// let resolver = DependencyResolver::new();
/// resolver
///     .add_dependency_as::<dyn Greeter, English, _>(Lifetime::Transient, |g| g)
///     .unwrap();
///
/// let greeter = resolver.resolve_trait::<dyn Greeter>().unwrap();
/// assert_eq!(greeter.greet(), "hello");
/// ```
#[derive(Default)]
pub struct DependencyResolver {
    store: RegistrationStore,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- Registration -----

    /// Registers `T` under its own identity.
    pub fn add_dependency<T: Injectable>(&self, lifetime: Lifetime) -> DiResult<()> {
        self.add(Registration::new(
            ServiceKey::of::<T>(),
            lifetime,
            Provider::Constructed(ConstructedProvider::concrete::<T>()),
        ))
    }

    /// Registers `TImpl` as the implementation of the abstract service
    /// `TSvc`. The coercer is usually the identity closure `|x| x`, letting
    /// the compiler unsize `Arc<TImpl>` into `Arc<TSvc>`.
    pub fn add_dependency_as<TSvc, TImpl, C>(&self, lifetime: Lifetime, coerce: C) -> DiResult<()>
    where
        TSvc: ?Sized + Send + Sync + 'static,
        TImpl: Injectable,
        C: Fn(Arc<TImpl>) -> Arc<TSvc> + Send + Sync + 'static,
    {
        self.add(Registration::new(
            ServiceKey::of::<TSvc>(),
            lifetime,
            Provider::Constructed(ConstructedProvider::abstracted::<TSvc, TImpl, C>(coerce)),
        ))
    }

    /// Registers a pre-built instance under its concrete identity.
    ///
    /// Instance registrations accept `Singleton` (the default in hosting
    /// code) or `PerRequest`; a per-request instance lives in the active
    /// context store and is removed again by [`handle_request_processed`].
    ///
    /// [`handle_request_processed`]: DependencyResolver::handle_request_processed
    pub fn add_instance<T: Send + Sync + 'static>(
        &self,
        instance: Arc<T>,
        lifetime: Lifetime,
    ) -> DiResult<()> {
        let registration = Registration::new(
            ServiceKey::of::<T>(),
            lifetime,
            Provider::Instance(instance as SharedAny),
        )
        .with_impl_id(TypeId::of::<T>());
        self.add_instance_registration(registration)
    }

    /// Registers a pre-built instance under an abstract service identity.
    pub fn add_trait_instance<T: ?Sized + Send + Sync + 'static>(
        &self,
        instance: Arc<T>,
        lifetime: Lifetime,
    ) -> DiResult<()> {
        let registration = Registration::new(
            ServiceKey::of::<T>(),
            lifetime,
            Provider::Instance(Arc::new(instance) as SharedAny),
        );
        self.add_instance_registration(registration)
    }

    fn add_instance_registration(&self, registration: Registration) -> DiResult<()> {
        if registration.lifetime == Lifetime::PerRequest {
            let store = lifetimes::active_store(self)
                .ok_or(DiError::ScopeRequired(registration.service.name()))?;
            if let Provider::Instance(value) = &registration.provider {
                store.insert(&registration.uniqueness_key, value.clone());
            }
        }
        self.add(registration)
    }

    fn add(&self, registration: Registration) -> DiResult<()> {
        if let Provider::Constructed(provider) = &registration.provider {
            if provider.constructors.is_empty() {
                return Err(DiError::InvalidRegistration(format!(
                    "{} declares no constructors and cannot be instantiated",
                    provider.impl_name
                )));
            }
        }
        lifetimes::manager(registration.lifetime).verify(&registration)?;
        debug!(
            service = registration.service.name(),
            lifetime = ?registration.lifetime,
            instance = registration.is_instance(),
            "dependency registered"
        );
        self.store.add(registration);
        Ok(())
    }

    // ----- Resolution -----

    /// Resolves the most-recently-registered available instance of `T`.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let value = self.resolve_key(&ServiceKey::of::<T>(), &mut ResolutionPath::default())?;
        value
            .downcast::<T>()
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves the most-recently-registered available instance of the
    /// abstract service `T`.
    pub fn resolve_trait<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let value = self.resolve_key(&ServiceKey::of::<T>(), &mut ResolutionPath::default())?;
        value
            .downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or(DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves every currently-available instance of `T`, possibly none.
    pub fn resolve_all<T: Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        self.resolve_each(&ServiceKey::of::<T>())?
            .into_iter()
            .map(|value| {
                value
                    .downcast::<T>()
                    .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
            })
            .collect()
    }

    /// Resolves every currently-available instance of the abstract service
    /// `T`, possibly none.
    pub fn resolve_all_trait<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        self.resolve_each(&ServiceKey::of::<T>())?
            .into_iter()
            .map(|value| {
                value
                    .downcast_ref::<Arc<T>>()
                    .cloned()
                    .ok_or(DiError::TypeMismatch(std::any::type_name::<T>()))
            })
            .collect()
    }

    fn resolve_each(&self, key: &ServiceKey) -> DiResult<Vec<SharedAny>> {
        self.store
            .all_available(key, self)
            .into_iter()
            .map(|reg| {
                lifetimes::manager(reg.lifetime).resolve(self, &reg, &mut ResolutionPath::default())
            })
            .collect()
    }

    // ----- Queries -----

    /// Whether any available registration exists for `T`.
    pub fn has_dependency<T: ?Sized + 'static>(&self) -> bool {
        self.has_dependency_key(&ServiceKey::of::<T>())
    }

    /// Key-based form of [`has_dependency`](DependencyResolver::has_dependency).
    pub fn has_dependency_key(&self, key: &ServiceKey) -> bool {
        self.store.has(key, self)
    }

    /// Whether `TImpl` is registered as an available implementation of `TSvc`.
    pub fn has_implementation<TSvc: ?Sized + 'static, TImpl: 'static>(&self) -> bool {
        self.store
            .has_implementation(&ServiceKey::of::<TSvc>(), TypeId::of::<TImpl>(), self)
    }

    // ----- Scope lifecycle -----

    /// Signals end-of-scope: per-request instance registrations tied to the
    /// active context store are removed, along with their stored data.
    /// Type-based per-request registrations stay; their cached instances
    /// simply expire with the store.
    pub fn handle_request_processed(&self) {
        if let Some(store) = lifetimes::active_store(self) {
            for key in store.keys() {
                if self.store.destruct(&key) {
                    store.remove(&key);
                }
            }
        }
    }

    // ----- Construction -----

    pub(crate) fn resolve_key(
        &self,
        key: &ServiceKey,
        path: &mut ResolutionPath,
    ) -> DiResult<SharedAny> {
        let registration = self
            .store
            .winner(key, self)
            .ok_or(DiError::NotFound(key.name()))?;
        lifetimes::manager(registration.lifetime).resolve(self, &registration, path)
    }

    pub(crate) fn construct(
        &self,
        registration: &Arc<Registration>,
        path: &mut ResolutionPath,
    ) -> DiResult<SharedAny> {
        match &registration.provider {
            Provider::Instance(value) => Ok(value.clone()),
            Provider::Constructed(provider) => {
                path.enter(registration.service)?;
                let result = self.construct_from(provider, path);
                path.exit();
                result
            }
        }
    }

    fn construct_from(
        &self,
        provider: &ConstructedProvider,
        path: &mut ResolutionPath,
    ) -> DiResult<SharedAny> {
        let ctor = self.select_constructor(provider)?;

        let mut values = Vec::with_capacity(ctor.params.len());
        for param in &ctor.params {
            values.push(self.resolve_key(param, path)?);
        }
        let mut built = (ctor.build)(&values)?;

        // Property injection overwrites constructor-set values, but a
        // property whose service is already being resolved up-stack stays
        // unset instead of recursing.
        for property in &provider.properties {
            if path.contains(&property.target) {
                continue;
            }
            if !self.has_dependency_key(&property.target) {
                continue;
            }
            let value = self.resolve_key(&property.target, path)?;
            (property.set)(&mut *built, value)?;
        }

        (provider.finish)(built)
    }

    /// Picks the longest constructor whose parameters can all be resolved
    /// right now, ties broken by declaration order. When no constructor
    /// qualifies the first declared one is attempted, so the failure names
    /// the missing parameter instead of the whole type.
    fn select_constructor<'p>(
        &self,
        provider: &'p ConstructedProvider,
    ) -> DiResult<&'p ErasedConstructor> {
        let mut best: Option<(&ErasedConstructor, usize)> = None;
        for ctor in &provider.constructors {
            if !ctor.params.iter().all(|key| self.has_dependency_key(key)) {
                continue;
            }
            match best {
                Some((_, count)) if count >= ctor.params.len() => {}
                _ => best = Some((ctor, ctor.params.len())),
            }
        }
        if let Some((ctor, _)) = best {
            return Ok(ctor);
        }
        provider.constructors.first().ok_or_else(|| {
            DiError::InvalidRegistration(format!(
                "{} declares no constructors and cannot be instantiated",
                provider.impl_name
            ))
        })
    }
}
