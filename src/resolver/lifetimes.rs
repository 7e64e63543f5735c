//! Lifetime managers: per-lifetime availability, validation, and caching.

use std::sync::Arc;

use crate::context_store::ContextStore;
use crate::error::{DiError, DiResult};
use crate::key::{ServiceKey, SharedAny};
use crate::lifetime::Lifetime;
use crate::registration::Registration;

use super::{DependencyResolver, ResolutionPath};

/// Decides, per resolution, whether an existing instance may be reused and
/// whether a registration is presently usable at all.
pub(crate) trait LifetimeManager: Send + Sync {
    /// Called at registration time; rejects illegal combinations.
    fn verify(&self, registration: &Registration) -> DiResult<()>;

    /// Whether the registration can satisfy a resolution right now.
    fn is_available(&self, resolver: &DependencyResolver, registration: &Registration) -> bool;

    /// Produces an instance, honoring the lifetime's caching rules.
    fn resolve(
        &self,
        resolver: &DependencyResolver,
        registration: &Arc<Registration>,
        path: &mut ResolutionPath,
    ) -> DiResult<SharedAny>;
}

static TRANSIENT: TransientLifetime = TransientLifetime;
static SINGLETON: SingletonLifetime = SingletonLifetime;
static PER_REQUEST: PerRequestLifetime = PerRequestLifetime;

pub(crate) fn manager(lifetime: Lifetime) -> &'static dyn LifetimeManager {
    match lifetime {
        Lifetime::Transient => &TRANSIENT,
        Lifetime::Singleton => &SINGLETON,
        Lifetime::PerRequest => &PER_REQUEST,
    }
}

/// The context store backing per-request lifetimes, when one is registered
/// and active. Resolved through the container itself so hosts can swap the
/// implementation with an ordinary registration.
pub(crate) fn active_store(resolver: &DependencyResolver) -> Option<Arc<dyn ContextStore>> {
    resolver
        .resolve_trait::<dyn ContextStore>()
        .ok()
        .filter(|store| store.is_active())
}

struct TransientLifetime;

impl LifetimeManager for TransientLifetime {
    fn verify(&self, registration: &Registration) -> DiResult<()> {
        if registration.is_instance() {
            return Err(DiError::InvalidRegistration(format!(
                "{} is an instance registration and cannot be transient",
                registration.service
            )));
        }
        Ok(())
    }

    fn is_available(&self, _resolver: &DependencyResolver, _registration: &Registration) -> bool {
        true
    }

    fn resolve(
        &self,
        resolver: &DependencyResolver,
        registration: &Arc<Registration>,
        path: &mut ResolutionPath,
    ) -> DiResult<SharedAny> {
        resolver.construct(registration, path)
    }
}

struct SingletonLifetime;

impl LifetimeManager for SingletonLifetime {
    fn verify(&self, _registration: &Registration) -> DiResult<()> {
        Ok(())
    }

    fn is_available(&self, _resolver: &DependencyResolver, _registration: &Registration) -> bool {
        true
    }

    fn resolve(
        &self,
        resolver: &DependencyResolver,
        registration: &Arc<Registration>,
        path: &mut ResolutionPath,
    ) -> DiResult<SharedAny> {
        // Re-entering the cell while its initializer is still running would
        // deadlock; surface the cycle before touching it.
        path.check(registration.service)?;
        registration
            .singleton
            .get_or_try_init(|| resolver.construct(registration, path))
            .cloned()
    }
}

struct PerRequestLifetime;

impl LifetimeManager for PerRequestLifetime {
    fn verify(&self, registration: &Registration) -> DiResult<()> {
        // A per-request context store would make availability checks recurse
        // into themselves.
        if registration.service == ServiceKey::of::<dyn ContextStore>() {
            return Err(DiError::InvalidRegistration(
                "the context store itself cannot be per-request".to_string(),
            ));
        }
        Ok(())
    }

    fn is_available(&self, resolver: &DependencyResolver, registration: &Registration) -> bool {
        match active_store(resolver) {
            Some(store) => {
                if registration.is_instance() {
                    // Instance registrations belong to the scope they were
                    // registered in; elsewhere they do not exist.
                    store.get(&registration.uniqueness_key).is_some()
                } else {
                    true
                }
            }
            None => false,
        }
    }

    fn resolve(
        &self,
        resolver: &DependencyResolver,
        registration: &Arc<Registration>,
        path: &mut ResolutionPath,
    ) -> DiResult<SharedAny> {
        let store = active_store(resolver)
            .ok_or(DiError::ScopeRequired(registration.service.name()))?;

        if let Some(existing) = store.get(&registration.uniqueness_key) {
            return Ok(existing);
        }
        if registration.is_instance() {
            // The backing data died with its scope.
            return Err(DiError::NotFound(registration.service.name()));
        }

        let value = resolver.construct(registration, path)?;
        store.insert(&registration.uniqueness_key, value.clone());
        Ok(value)
    }
}
