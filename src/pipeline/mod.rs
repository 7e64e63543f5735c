//! Contributors, notifications, and ordering constraints.
//!
//! A contributor is a unit of pipeline behavior. During setup it registers
//! one or more callbacks, each with Before/After constraints against other
//! contributors or stage markers. Registration order is unconstrained and
//! contributors never reference each other directly - the call-graph
//! generator turns the declared partial order into one total order.

use futures::future::BoxFuture;

use crate::context::CommunicationContext;
use crate::key::ServiceKey;

pub mod call_graph;
pub mod runner;
pub mod stages;

pub use runner::{AsyncPipeline, OrderingStrategy, PipelineRunner, StartupOptions};

/// What a pipeline unit tells the runner to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineContinuation {
    /// Advance to the next unit in graph order.
    Continue,
    /// Stop cleanly; the response stands as-is.
    Finished,
    /// Stop as a server error.
    Abort,
}

/// Outcome of one pipeline unit. An `Err` is the unhandled-failure channel:
/// the runner captures it on the context rather than returning it to the
/// host.
pub type CallResult =
    Result<PipelineContinuation, Box<dyn std::error::Error + Send + Sync>>;

/// A unit of pipeline behavior.
///
/// `key` is the contributor's own identity (conventionally
/// `ServiceKey::of::<Self>()`); `stages` lists the marker tags it satisfies;
/// `setup` runs once during pipeline initialization, registering callbacks
/// and their ordering constraints.
///
/// # Examples
///
/// ```rust
/// use pipewright::pipeline::{stages, PipelineContinuation, PipelineContributor, Registrar};
/// use pipewright::ServiceKey;
///
/// struct UriMatcher;
///
/// impl PipelineContributor for UriMatcher {
///     fn key(&self) -> ServiceKey {
///         ServiceKey::of::<Self>()
///     }
///
///     fn stages(&self) -> Vec<ServiceKey> {
///         vec![ServiceKey::of::<stages::UriMatching>()]
///     }
///
///     fn setup(&self, pipeline: &mut Registrar) {
///         pipeline
///             .notify(|_ctx| Ok(PipelineContinuation::Continue))
///             .after::<stages::Begin>();
///     }
/// }
/// ```
pub trait PipelineContributor: Send + Sync + 'static {
    /// This contributor's identity in the call graph.
    fn key(&self) -> ServiceKey;

    /// Stage markers this contributor satisfies.
    fn stages(&self) -> Vec<ServiceKey> {
        Vec::new()
    }

    /// Registers callbacks and ordering constraints.
    fn setup(&self, pipeline: &mut Registrar);
}

/// The implicit first contributor: the stable ordering anchor carrying the
/// [`stages::Begin`] marker. Injected automatically when no registered
/// contributor satisfies `Begin`.
pub struct BootstrapContributor;

impl PipelineContributor for BootstrapContributor {
    fn key(&self) -> ServiceKey {
        ServiceKey::of::<Self>()
    }

    fn stages(&self) -> Vec<ServiceKey> {
        vec![ServiceKey::of::<stages::Begin>()]
    }

    fn setup(&self, pipeline: &mut Registrar) {
        pipeline.notify(|_| Ok(PipelineContinuation::Continue));
    }
}

/// Whether a constraint places its owner before or after the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Before,
    After,
}

/// One declared ordering constraint.
#[derive(Debug, Clone, Copy)]
pub struct Constraint {
    pub relation: Relation,
    pub target: ServiceKey,
}

type SyncCallback =
    std::sync::Arc<dyn Fn(&mut CommunicationContext) -> CallResult + Send + Sync>;
type AsyncCallback = std::sync::Arc<
    dyn for<'a> Fn(&'a mut CommunicationContext) -> BoxFuture<'a, CallResult> + Send + Sync,
>;

/// A bound callback, synchronous or declared asynchronous. The runner
/// suspends only at asynchronous units.
#[derive(Clone)]
pub(crate) enum PipelineCallback {
    Sync(SyncCallback),
    Async(AsyncCallback),
}

/// One callback registration: a contributor's callback plus its constraints.
/// The call-graph generators order these, not the contributors themselves -
/// a contributor calling `notify` twice owns two independent nodes.
pub struct ContributorNotification {
    pub contributor: ServiceKey,
    pub stages: Vec<ServiceKey>,
    pub constraints: Vec<Constraint>,
    pub seq: usize,
    pub(crate) callback: PipelineCallback,
}

impl ContributorNotification {
    /// Builds a node directly, bypassing a contributor's `setup`. Mostly
    /// useful to exercise custom [`call_graph::CallGraphGenerator`]
    /// implementations against hand-made node sets.
    pub fn new_sync<F>(
        contributor: ServiceKey,
        stages: Vec<ServiceKey>,
        constraints: Vec<Constraint>,
        seq: usize,
        callback: F,
    ) -> Self
    where
        F: Fn(&mut CommunicationContext) -> CallResult + Send + Sync + 'static,
    {
        Self {
            contributor,
            stages,
            constraints,
            seq,
            callback: PipelineCallback::Sync(std::sync::Arc::new(callback)),
        }
    }

    /// Converts an ordered notification into its executable form. Generators
    /// call this once they have fixed the node's position.
    pub fn into_call(self) -> ContributorCall {
        ContributorCall {
            contributor: self.contributor,
            stages: self.stages,
            callback: self.callback,
        }
    }
}

/// One executable unit of the finished call graph.
pub struct ContributorCall {
    pub contributor: ServiceKey,
    pub stages: Vec<ServiceKey>,
    pub(crate) callback: PipelineCallback,
}

impl std::fmt::Debug for ContributorCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContributorCall")
            .field("contributor", &self.contributor)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

/// Registration surface handed to each contributor's `setup`.
pub struct Registrar {
    contributor: ServiceKey,
    stages: Vec<ServiceKey>,
    notifications: Vec<ContributorNotification>,
    next_seq: usize,
}

impl Registrar {
    pub(crate) fn new(contributor: ServiceKey, stages: Vec<ServiceKey>, next_seq: usize) -> Self {
        Self {
            contributor,
            stages,
            notifications: Vec::new(),
            next_seq,
        }
    }

    /// Registers a synchronous callback. Chain [`Notify::after`] and
    /// [`Notify::before`] to constrain its position.
    pub fn notify<F>(&mut self, callback: F) -> Notify<'_>
    where
        F: Fn(&mut CommunicationContext) -> CallResult + Send + Sync + 'static,
    {
        self.push(PipelineCallback::Sync(std::sync::Arc::new(callback)))
    }

    /// Registers an asynchronous callback; the runner awaits it in graph
    /// order.
    pub fn notify_async<F>(&mut self, callback: F) -> Notify<'_>
    where
        F: for<'a> Fn(&'a mut CommunicationContext) -> BoxFuture<'a, CallResult>
            + Send
            + Sync
            + 'static,
    {
        self.push(PipelineCallback::Async(std::sync::Arc::new(callback)))
    }

    fn push(&mut self, callback: PipelineCallback) -> Notify<'_> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.notifications.push(ContributorNotification {
            contributor: self.contributor,
            stages: self.stages.clone(),
            constraints: Vec::new(),
            seq,
            callback,
        });
        Notify {
            notification: self.notifications.last_mut().expect("just pushed"),
        }
    }

    pub(crate) fn finish(self) -> Vec<ContributorNotification> {
        self.notifications
    }
}

/// Fluent constraint builder returned by [`Registrar::notify`].
pub struct Notify<'r> {
    notification: &'r mut ContributorNotification,
}

impl Notify<'_> {
    /// This callback runs after any contributor matching `T` (a contributor
    /// type or a stage marker).
    pub fn after<T: ?Sized + 'static>(self) -> Self {
        self.notification.constraints.push(Constraint {
            relation: Relation::After,
            target: ServiceKey::of::<T>(),
        });
        self
    }

    /// This callback runs before any contributor matching `T`.
    pub fn before<T: ?Sized + 'static>(self) -> Self {
        self.notification.constraints.push(Constraint {
            relation: Relation::Before,
            target: ServiceKey::of::<T>(),
        });
        self
    }
}
