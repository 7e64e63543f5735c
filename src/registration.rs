//! Service registrations and the concurrent registration store.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;

use crate::error::{DiError, DiResult};
use crate::injectable::{Args, Injectable};
use crate::key::{ServiceKey, SharedAny};
use crate::lifetime::Lifetime;
use crate::resolver::lifetimes;
use crate::resolver::DependencyResolver;

static NEXT_SEQ: AtomicUsize = AtomicUsize::new(0);

type ErasedBuild =
    Arc<dyn Fn(&[SharedAny]) -> DiResult<Box<dyn std::any::Any + Send + Sync>> + Send + Sync>;
type ErasedSet =
    Arc<dyn Fn(&mut (dyn std::any::Any + Send + Sync), SharedAny) -> DiResult<()> + Send + Sync>;
type ErasedFinish =
    Arc<dyn Fn(Box<dyn std::any::Any + Send + Sync>) -> DiResult<SharedAny> + Send + Sync>;

/// One type-erased constructor from an implementation's descriptor table.
pub(crate) struct ErasedConstructor {
    pub(crate) params: Vec<ServiceKey>,
    pub(crate) build: ErasedBuild,
}

/// One type-erased property slot.
pub(crate) struct ErasedProperty {
    pub(crate) target: ServiceKey,
    pub(crate) set: ErasedSet,
}

/// The erased descriptor table for a constructible registration, plus the
/// finishing step that wraps the built value into its stored representation.
pub(crate) struct ConstructedProvider {
    pub(crate) impl_name: &'static str,
    pub(crate) impl_id: TypeId,
    pub(crate) constructors: Vec<ErasedConstructor>,
    pub(crate) properties: Vec<ErasedProperty>,
    pub(crate) finish: ErasedFinish,
}

impl ConstructedProvider {
    /// Erases `T`'s descriptor table for a registration under its own key.
    pub(crate) fn concrete<T: Injectable>() -> Self {
        Self::erase::<T>(Arc::new(|built| {
            let built = built
                .downcast::<T>()
                .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))?;
            Ok(Arc::<T>::from(built) as SharedAny)
        }))
    }

    /// Erases `TImpl`'s descriptor table for a registration under an abstract
    /// service key, coercing the built value through `coerce`.
    pub(crate) fn abstracted<TSvc, TImpl, C>(coerce: C) -> Self
    where
        TSvc: ?Sized + Send + Sync + 'static,
        TImpl: Injectable,
        C: Fn(Arc<TImpl>) -> Arc<TSvc> + Send + Sync + 'static,
    {
        Self::erase::<TImpl>(Arc::new(move |built| {
            let built = built
                .downcast::<TImpl>()
                .map_err(|_| DiError::TypeMismatch(std::any::type_name::<TImpl>()))?;
            Ok(Arc::new(coerce(Arc::from(built))) as SharedAny)
        }))
    }

    fn erase<T: Injectable>(finish: ErasedFinish) -> Self {
        let constructors = T::constructors()
            .into_iter()
            .map(|ctor| {
                let build = ctor.build.clone();
                ErasedConstructor {
                    params: ctor.params,
                    build: Arc::new(move |values| {
                        let mut args = Args::new(values);
                        let value = (build)(&mut args)?;
                        Ok(Box::new(value) as Box<dyn std::any::Any + Send + Sync>)
                    }),
                }
            })
            .collect();

        let properties = T::properties()
            .into_iter()
            .map(|prop| {
                let set = prop.set.clone();
                ErasedProperty {
                    target: prop.target,
                    set: Arc::new(move |any, value| {
                        let target = any
                            .downcast_mut::<T>()
                            .ok_or(DiError::TypeMismatch(std::any::type_name::<T>()))?;
                        (set)(target, value)
                    }),
                }
            })
            .collect();

        Self {
            impl_name: std::any::type_name::<T>(),
            impl_id: TypeId::of::<T>(),
            constructors,
            properties,
            finish,
        }
    }
}

/// How a registration produces instances.
pub(crate) enum Provider {
    /// Built on demand from a descriptor table
    Constructed(ConstructedProvider),
    /// A pre-built object handed in at registration time
    Instance(SharedAny),
}

/// A single candidate registration for a service.
pub(crate) struct Registration {
    pub(crate) service: ServiceKey,
    pub(crate) uniqueness_key: String,
    pub(crate) lifetime: Lifetime,
    pub(crate) provider: Provider,
    pub(crate) impl_id: Option<TypeId>,
    pub(crate) singleton: OnceCell<SharedAny>,
}

impl Registration {
    pub(crate) fn new(service: ServiceKey, lifetime: Lifetime, provider: Provider) -> Self {
        let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
        let impl_id = match &provider {
            Provider::Constructed(ctor) => Some(ctor.impl_id),
            Provider::Instance(_) => None,
        };
        Self {
            service,
            uniqueness_key: format!("{}#{}", service.name(), seq),
            lifetime,
            provider,
            impl_id,
            singleton: OnceCell::new(),
        }
    }

    pub(crate) fn with_impl_id(mut self, impl_id: TypeId) -> Self {
        self.impl_id = Some(impl_id);
        self
    }

    pub(crate) fn is_instance(&self) -> bool {
        matches!(self.provider, Provider::Instance(_))
    }
}

/// Ordered candidate registrations per service identity.
///
/// Concurrent readers and writers are safe; two logically-independent calls
/// (say a `has` followed by an `add`) are not one transaction.
#[derive(Default)]
pub(crate) struct RegistrationStore {
    inner: RwLock<HashMap<ServiceKey, Vec<Arc<Registration>>>>,
}

impl RegistrationStore {
    pub(crate) fn add(&self, registration: Registration) {
        self.inner
            .write()
            .unwrap()
            .entry(registration.service)
            .or_default()
            .push(Arc::new(registration));
    }

    fn candidates(&self, key: &ServiceKey) -> Vec<Arc<Registration>> {
        self.inner
            .read()
            .unwrap()
            .get(key)
            .map(|regs| regs.clone())
            .unwrap_or_default()
    }

    /// The most-recently-registered available candidate, if any.
    pub(crate) fn winner(
        &self,
        key: &ServiceKey,
        resolver: &DependencyResolver,
    ) -> Option<Arc<Registration>> {
        self.candidates(key)
            .into_iter()
            .rev()
            .find(|reg| lifetimes::manager(reg.lifetime).is_available(resolver, reg))
    }

    /// Every available candidate, in registration order.
    pub(crate) fn all_available(
        &self,
        key: &ServiceKey,
        resolver: &DependencyResolver,
    ) -> Vec<Arc<Registration>> {
        self.candidates(key)
            .into_iter()
            .filter(|reg| lifetimes::manager(reg.lifetime).is_available(resolver, reg))
            .collect()
    }

    pub(crate) fn has(&self, key: &ServiceKey, resolver: &DependencyResolver) -> bool {
        self.winner(key, resolver).is_some()
    }

    pub(crate) fn has_implementation(
        &self,
        key: &ServiceKey,
        impl_id: TypeId,
        resolver: &DependencyResolver,
    ) -> bool {
        self.candidates(key)
            .into_iter()
            .filter(|reg| lifetimes::manager(reg.lifetime).is_available(resolver, reg))
            .any(|reg| reg.impl_id == Some(impl_id))
    }

    /// Removes per-request *instance* registrations stored under
    /// `uniqueness_key`. Type-based registrations survive end-of-scope; only
    /// their cached data expires with the context store.
    pub(crate) fn destruct(&self, uniqueness_key: &str) -> bool {
        let mut removed = false;
        let mut map = self.inner.write().unwrap();
        for regs in map.values_mut() {
            regs.retain(|reg| {
                let matches = reg.uniqueness_key == uniqueness_key
                    && reg.is_instance()
                    && reg.lifetime == Lifetime::PerRequest;
                removed |= matches;
                !matches
            });
        }
        removed
    }
}
