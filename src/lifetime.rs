//! Service lifetime definitions.

use std::str::FromStr;

use crate::error::DiError;

/// Lifetime policy controlling instance caching and availability.
///
/// # Lifetime Characteristics
///
/// - **Transient**: a new instance on every resolution, never cached
/// - **Singleton**: one instance for the resolver's whole life
/// - **PerRequest**: one instance per active context store, keyed by the
///   registration's uniqueness key; resolution *fails* when no store is
///   active - it never silently degrades to Transient
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use pipewright::{Constructor, DependencyResolver, Injectable, Lifetime};
///
/// struct Clock;
///
/// impl Injectable for Clock {
///     fn constructors() -> Vec<Constructor<Self>> {
///         vec![Constructor::parameterless(|| Clock)]
///     }
/// }
///
/// let resolver = DependencyResolver::new();
/// resolver.add_dependency::<Clock>(Lifetime::Singleton).unwrap();
///
/// let a = resolver.resolve::<Clock>().unwrap();
/// let b = resolver.resolve::<Clock>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifetime {
    /// New instance per resolution, never cached
    #[default]
    Transient,
    /// Single instance per resolver, cached forever
    Singleton,
    /// Single instance per active context store
    PerRequest,
}

impl FromStr for Lifetime {
    type Err = DiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transient" => Ok(Lifetime::Transient),
            "singleton" => Ok(Lifetime::Singleton),
            "per-request" | "per_request" => Ok(Lifetime::PerRequest),
            other => Err(DiError::InvalidRegistration(format!(
                "unknown lifetime value '{}'",
                other
            ))),
        }
    }
}
