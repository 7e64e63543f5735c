//! Context stores: the swappable backing storage for per-request lifetimes.
//!
//! A context store represents exactly one logical request's ambient scope.
//! PerRequest instances physically live inside the active store and vanish
//! with it. Two implementations ship with the crate: an explicit in-memory
//! store (the deterministic choice under async execution, shared by handle)
//! and an ambient thread-bound store driven by [`ContextScope`] guards.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::injectable::{Constructor, Injectable};
use crate::key::SharedAny;

/// Key/value storage scoped to the current request.
///
/// Registered with the resolver as `dyn ContextStore`; the per-request
/// lifetime manager resolves it on every scoped resolution, so swapping the
/// active store implementation is an ordinary registration.
pub trait ContextStore: Send + Sync {
    /// Whether a scope is currently active. An inactive store makes every
    /// per-request registration unavailable.
    fn is_active(&self) -> bool {
        true
    }

    /// Reads a stored value.
    fn get(&self, key: &str) -> Option<SharedAny>;

    /// Writes a value under `key`, replacing any previous one.
    fn insert(&self, key: &str, value: SharedAny);

    /// Removes a single entry.
    fn remove(&self, key: &str);

    /// Every key currently held by the active scope.
    fn keys(&self) -> Vec<String>;

    /// Drops all stored data, invalidating cached per-request instances.
    fn clear(&self);
}

/// Mutex-guarded map store, always active.
///
/// Hosts share it by handle: register the same `Arc` with the resolver and
/// keep a reference for clearing between requests.
#[derive(Default)]
pub struct InMemoryContextStore {
    items: Mutex<HashMap<String, SharedAny>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContextStore for InMemoryContextStore {
    fn get(&self, key: &str) -> Option<SharedAny> {
        self.items.lock().unwrap().get(key).cloned()
    }

    fn insert(&self, key: &str, value: SharedAny) {
        self.items.lock().unwrap().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.items.lock().unwrap().remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.items.lock().unwrap().keys().cloned().collect()
    }

    fn clear(&self) {
        self.items.lock().unwrap().clear();
    }
}

thread_local! {
    static AMBIENT: RefCell<Vec<Arc<AmbientContext>>> = const { RefCell::new(Vec::new()) };
}

/// One logical request scope for the ambient store.
///
/// The context itself is inert data; it becomes the thread's current scope
/// while a [`ContextScope`] guard holds it active.
#[derive(Default)]
pub struct AmbientContext {
    items: Mutex<HashMap<String, SharedAny>>,
}

impl AmbientContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The context currently active on this thread, if any.
    pub fn current() -> Option<Arc<AmbientContext>> {
        AMBIENT.with(|stack| stack.borrow().last().cloned())
    }
}

/// RAII activation of an [`AmbientContext`] on the current thread.
///
/// Scopes nest: entering a new scope while one is active shadows the outer
/// scope without touching its data, and dropping the guard restores it.
///
/// ```rust
/// use pipewright::{AmbientContext, ContextScope};
///
/// let outer = AmbientContext::new();
/// let inner = AmbientContext::new();
///
/// let _outer_scope = ContextScope::enter(outer.clone());
/// {
///     let _inner_scope = ContextScope::enter(inner.clone());
///     assert!(std::sync::Arc::ptr_eq(&AmbientContext::current().unwrap(), &inner));
/// }
/// assert!(std::sync::Arc::ptr_eq(&AmbientContext::current().unwrap(), &outer));
/// ```
pub struct ContextScope {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl ContextScope {
    pub fn enter(context: Arc<AmbientContext>) -> Self {
        AMBIENT.with(|stack| stack.borrow_mut().push(context));
        Self {
            _not_send: std::marker::PhantomData,
        }
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        AMBIENT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Thread-bound store proxying whatever [`AmbientContext`] is current.
///
/// Inactive (no guard on this thread) it reports nothing stored and ignores
/// writes; the per-request lifetime manager checks [`ContextStore::is_active`]
/// before it ever gets that far.
#[derive(Default)]
pub struct AmbientContextStore;

impl AmbientContextStore {
    pub fn new() -> Self {
        Self
    }
}

impl Injectable for AmbientContextStore {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::parameterless(AmbientContextStore::new)]
    }
}

impl ContextStore for AmbientContextStore {
    fn is_active(&self) -> bool {
        AmbientContext::current().is_some()
    }

    fn get(&self, key: &str) -> Option<SharedAny> {
        AmbientContext::current()?.items.lock().unwrap().get(key).cloned()
    }

    fn insert(&self, key: &str, value: SharedAny) {
        if let Some(context) = AmbientContext::current() {
            context.items.lock().unwrap().insert(key.to_string(), value);
        }
    }

    fn remove(&self, key: &str) {
        if let Some(context) = AmbientContext::current() {
            context.items.lock().unwrap().remove(key);
        }
    }

    fn keys(&self) -> Vec<String> {
        match AmbientContext::current() {
            Some(context) => context.items.lock().unwrap().keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    fn clear(&self) {
        if let Some(context) = AmbientContext::current() {
            context.items.lock().unwrap().clear();
        }
    }
}
