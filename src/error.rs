//! Error types for the resolver and the pipeline scheduler.

use std::fmt;

/// Dependency resolution and registration errors.
///
/// Registration errors surface synchronously from the `add_*` methods;
/// resolution errors surface from `resolve`/`resolve_trait`. Neither is ever
/// swallowed by the container.
///
/// # Examples
///
/// ```rust
/// use pipewright::{DependencyResolver, DiError};
///
/// struct Missing;
///
/// let resolver = DependencyResolver::new();
/// match resolver.resolve::<Missing>() {
///     Err(DiError::NotFound(name)) => assert!(name.contains("Missing")),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, Clone)]
pub enum DiError {
    /// No available registration for the requested service
    NotFound(&'static str),
    /// Cyclic construction detected (includes the resolution path)
    Cycle(Vec<&'static str>),
    /// PerRequest resolution attempted without an active context store
    ScopeRequired(&'static str),
    /// Stored instance failed to downcast to the requested type
    TypeMismatch(&'static str),
    /// Illegal registration: non-constructible implementation, instance
    /// under Transient, or an unrecognized lifetime value
    InvalidRegistration(String),
}

impl fmt::Display for DiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiError::NotFound(name) => write!(f, "no available registration for {}", name),
            DiError::Cycle(path) => {
                write!(f, "cyclic dependency: {}", path.join(" -> "))
            }
            DiError::ScopeRequired(name) => {
                write!(f, "{} has a per-request lifetime but no context store is active", name)
            }
            DiError::TypeMismatch(name) => write!(f, "stored instance is not a {}", name),
            DiError::InvalidRegistration(msg) => write!(f, "invalid registration: {}", msg),
        }
    }
}

impl std::error::Error for DiError {}

/// Result type for resolver operations.
pub type DiResult<T> = Result<T, DiError>;

/// Pipeline scheduling and execution errors.
///
/// Contributor callback failures during a run are *not* reported through this
/// type - they are captured on the request context and turned into a 500
/// response. `PipelineError` covers the host-facing failures: initializing,
/// ordering, and state-machine misuse.
#[derive(Debug)]
pub enum PipelineError {
    /// `run`/`run_async` called before `initialize`
    NotInitialized,
    /// `initialize` called twice on the same runner
    AlreadyInitialized,
    /// Ordering-constraint cycle, carrying the contributor identities involved
    Recursion(Vec<&'static str>),
    /// Constraint targets or built-in stages with no registered contributor
    MissingContributors(Vec<&'static str>),
    /// The resolver failed while materializing contributors or the generator
    Resolution(DiError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::NotInitialized => {
                write!(f, "the pipeline must be initialized before it can run")
            }
            PipelineError::AlreadyInitialized => {
                write!(f, "the pipeline has already been initialized")
            }
            PipelineError::Recursion(names) => {
                write!(f, "recursive ordering constraints between: {}", names.join(", "))
            }
            PipelineError::MissingContributors(names) => {
                write!(f, "no contributor satisfies: {}", names.join(", "))
            }
            PipelineError::Resolution(err) => write!(f, "contributor resolution failed: {}", err),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Resolution(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DiError> for PipelineError {
    fn from(err: DiError) -> Self {
        PipelineError::Resolution(err)
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
