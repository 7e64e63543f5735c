//! Service identity keys shared by the resolver and the scheduler.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Type-erased instance handle used for storage and transport.
///
/// Concrete services are stored as `Arc<T>` directly. Trait services are
/// stored with an extra indirection: the `Any` payload is the `Arc<dyn Trait>`
/// itself, so it can be recovered with a downcast to `Arc<dyn Trait>`.
pub type SharedAny = Arc<dyn Any + Send + Sync>;

/// Identity of a service, contributor, or stage marker.
///
/// A key is a `TypeId` plus the type name for diagnostics. It works for both
/// concrete types and trait objects:
///
/// ```rust
/// use pipewright::ServiceKey;
///
/// trait Codec: Send + Sync {}
///
/// let concrete = ServiceKey::of::<String>();
/// let abstract_ = ServiceKey::of::<dyn Codec>();
/// assert_ne!(concrete, abstract_);
/// assert_eq!(concrete.name(), "alloc::string::String");
/// ```
///
/// The same key type identifies services in the [`DependencyResolver`],
/// contributors in the call graph, and stage markers - ordering constraints
/// match against the whole tag set, not just concrete identity.
///
/// [`DependencyResolver`]: crate::DependencyResolver
#[derive(Clone, Copy)]
pub struct ServiceKey {
    id: TypeId,
    name: &'static str,
}

impl ServiceKey {
    /// Builds the key for a type, sized or not.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Human-readable type name for error messages and logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The underlying `TypeId`.
    pub fn id(&self) -> TypeId {
        self.id
    }
}

// Equality and hashing go through the TypeId only; names exist for display.
impl PartialEq for ServiceKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceKey {}

impl std::hash::Hash for ServiceKey {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey({})", self.name)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
