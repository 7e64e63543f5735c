use std::sync::Arc;

use serial_test::serial;

use pipewright::{
    AmbientContext, AmbientContextStore, Constructor, ContextScope, ContextStore,
    DependencyResolver, DiError, Injectable, InMemoryContextStore, Lifetime,
};

#[derive(Debug)]
struct Session {
    id: u64,
}

impl Injectable for Session {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::parameterless(|| Session { id: 7 })]
    }
}

fn resolver_with_store() -> (DependencyResolver, Arc<InMemoryContextStore>) {
    let resolver = DependencyResolver::new();
    let store = Arc::new(InMemoryContextStore::new());
    resolver
        .add_trait_instance::<dyn ContextStore>(store.clone(), Lifetime::Singleton)
        .unwrap();
    (resolver, store)
}

#[test]
fn per_request_without_a_store_is_unavailable() {
    let resolver = DependencyResolver::new();
    resolver
        .add_dependency::<Session>(Lifetime::PerRequest)
        .unwrap();

    assert!(!resolver.has_dependency::<Session>());
    assert!(matches!(
        resolver.resolve::<Session>().unwrap_err(),
        DiError::NotFound(_)
    ));
}

#[test]
fn per_request_caches_within_one_scope() {
    let (resolver, _store) = resolver_with_store();
    resolver
        .add_dependency::<Session>(Lifetime::PerRequest)
        .unwrap();

    let a = resolver.resolve::<Session>().unwrap();
    let b = resolver.resolve::<Session>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.id, 7);
}

#[test]
fn clearing_the_store_starts_a_fresh_scope() {
    let (resolver, store) = resolver_with_store();
    resolver
        .add_dependency::<Session>(Lifetime::PerRequest)
        .unwrap();

    let before = resolver.resolve::<Session>().unwrap();
    store.clear();
    let after = resolver.resolve::<Session>().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
}

#[test]
fn per_request_instances_require_an_active_store_at_registration() {
    let resolver = DependencyResolver::new();
    let err = resolver
        .add_instance(Arc::new(Session { id: 1 }), Lifetime::PerRequest)
        .unwrap_err();
    assert!(matches!(err, DiError::ScopeRequired(_)));
}

#[test]
fn per_request_instances_vanish_with_their_scope() {
    let (resolver, store) = resolver_with_store();
    resolver
        .add_instance(Arc::new(Session { id: 42 }), Lifetime::PerRequest)
        .unwrap();

    assert_eq!(resolver.resolve::<Session>().unwrap().id, 42);

    // End of request: the instance registration and its data both go.
    resolver.handle_request_processed();
    assert!(store.keys().is_empty());
    assert!(!resolver.has_dependency::<Session>());
    assert!(matches!(
        resolver.resolve::<Session>().unwrap_err(),
        DiError::NotFound(_)
    ));
}

#[test]
fn end_of_request_keeps_type_registrations() {
    let (resolver, store) = resolver_with_store();
    resolver
        .add_dependency::<Session>(Lifetime::PerRequest)
        .unwrap();

    let before = resolver.resolve::<Session>().unwrap();
    resolver.handle_request_processed();

    // End-of-request removes instance registrations only; the type-based
    // cache lives in the store and stays until the host resets it.
    assert!(resolver.has_dependency::<Session>());
    let cached = resolver.resolve::<Session>().unwrap();
    assert!(Arc::ptr_eq(&before, &cached));

    store.clear();
    let after = resolver.resolve::<Session>().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
}

#[test]
fn the_context_store_itself_cannot_be_per_request() {
    let resolver = DependencyResolver::new();
    let err = resolver
        .add_trait_instance::<dyn ContextStore>(
            Arc::new(InMemoryContextStore::new()),
            Lifetime::PerRequest,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        DiError::ScopeRequired(_) | DiError::InvalidRegistration(_)
    ));
}

#[test]
#[serial]
fn ambient_store_tracks_the_thread_scope() {
    let resolver = DependencyResolver::new();
    resolver
        .add_dependency_as::<dyn ContextStore, AmbientContextStore, _>(
            Lifetime::Singleton,
            |s| s,
        )
        .unwrap();
    resolver
        .add_dependency::<Session>(Lifetime::PerRequest)
        .unwrap();

    // No guard, no scope.
    assert!(!resolver.has_dependency::<Session>());

    let request_one = {
        let _scope = ContextScope::enter(AmbientContext::new());
        let a = resolver.resolve::<Session>().unwrap();
        let b = resolver.resolve::<Session>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        a
    };

    // A new scope gets a new instance.
    let _scope = ContextScope::enter(AmbientContext::new());
    let request_two = resolver.resolve::<Session>().unwrap();
    assert!(!Arc::ptr_eq(&request_one, &request_two));
}

#[test]
#[serial]
fn nested_ambient_scopes_shadow_without_clobbering() {
    let outer = AmbientContext::new();
    let inner = AmbientContext::new();

    let _outer_scope = ContextScope::enter(outer.clone());
    {
        let _inner_scope = ContextScope::enter(inner.clone());
        assert!(Arc::ptr_eq(&AmbientContext::current().unwrap(), &inner));
    }
    assert!(Arc::ptr_eq(&AmbientContext::current().unwrap(), &outer));
}
