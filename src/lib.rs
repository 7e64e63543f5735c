//! # pipewright
//!
//! A dependency-injection resolver and a constraint-ordered request
//! pipeline, built to work as one system: contributors are plain services
//! in the resolver, the pipeline runner discovers them through resolution,
//! and a call-graph generator turns their declared Before/After constraints
//! into a single deterministic execution order.
//!
//! ## Resolution
//!
//! Implementations describe themselves through [`Injectable`] descriptor
//! tables instead of runtime reflection. Three lifetimes are supported:
//! [`Lifetime::Transient`] builds a fresh instance per resolution,
//! [`Lifetime::Singleton`] builds once and caches forever, and
//! [`Lifetime::PerRequest`] caches in whatever [`ContextStore`] is active
//! for the current request.
//!
//! ```
//! use std::sync::Arc;
//! use pipewright::{Constructor, DependencyResolver, Injectable, Lifetime};
//!
//! struct Clock;
//!
//! impl Injectable for Clock {
//!     fn constructors() -> Vec<Constructor<Self>> {
//!         vec![Constructor::parameterless(|| Clock)]
//!     }
//! }
//!
//! let resolver = DependencyResolver::default();
//! resolver.add_dependency::<Clock>(Lifetime::Singleton).unwrap();
//!
//! let a = resolver.resolve::<Clock>().unwrap();
//! let b = resolver.resolve::<Clock>().unwrap();
//! assert!(Arc::ptr_eq(&a, &b));
//! ```
//!
//! Trait services register through [`DependencyResolver::add_dependency_as`]
//! with an unsizing closure, and resolve through
//! [`DependencyResolver::resolve_trait`]. Registering the same service
//! several times accumulates: [`DependencyResolver::resolve_trait`] returns
//! the most recent available registration,
//! [`DependencyResolver::resolve_all_trait`] returns every available one in
//! registration order.
//!
//! ## Pipeline
//!
//! A [`pipeline::PipelineContributor`] registers callbacks during setup and
//! constrains them against other contributors or against the built-in stage
//! markers in [`pipeline::stages`]. Nothing runs in registration order;
//! ordering comes solely from the generated call graph, bootstrap first.
//! See [`pipeline::PipelineRunner`] for the request loop, including its
//! failure semantics (errors are captured on the
//! [`CommunicationContext`], not returned to the host).
//!
//! Cycles in constructor dependencies surface as [`DiError::Cycle`] with
//! the full path; cycles in pipeline constraints surface as
//! [`PipelineError::Recursion`] naming the contributors involved.

mod context;
mod context_store;
mod error;
mod injectable;
mod key;
mod lifetime;
mod registration;
mod resolver;

pub mod pipeline;

pub use context::{CommunicationContext, Request, Response, ServerError};
pub use context_store::{
    AmbientContext, AmbientContextStore, ContextScope, ContextStore, InMemoryContextStore,
};
pub use error::{DiError, DiResult, PipelineError, PipelineResult};
pub use injectable::{Args, Constructor, Injectable, Property};
pub use key::{ServiceKey, SharedAny};
pub use lifetime::Lifetime;
pub use resolver::DependencyResolver;
