//! Pipeline startup and execution.
//!
//! The runner resolves every registered [`PipelineContributor`], collects
//! their notifications, has a [`CallGraphGenerator`] flatten the constraint
//! graph into a call sequence, then walks that sequence for each request.
//! A contributor error or abort fails the request: the context records a
//! server error, the response turns 500, and only cleanup units tagged with
//! the [`stages::End`] stage still execute.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::context::{CommunicationContext, ServerError};
use crate::error::{DiError, PipelineError, PipelineResult};
use crate::key::ServiceKey;
use crate::resolver::DependencyResolver;

use super::call_graph::{
    CallGraphGenerator, TopologicalCallGraphGenerator, WeightedCallGraphGenerator,
};
use super::{
    stages, BootstrapContributor, ContributorCall, PipelineCallback, PipelineContinuation,
    PipelineContributor, Registrar,
};

/// Which built-in ordering strategy to use when the resolver does not carry
/// a `dyn CallGraphGenerator` of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderingStrategy {
    Weighted,
    #[default]
    Topological,
}

impl OrderingStrategy {
    fn generator(self) -> Box<dyn CallGraphGenerator> {
        match self {
            OrderingStrategy::Weighted => Box::new(WeightedCallGraphGenerator),
            OrderingStrategy::Topological => Box::new(TopologicalCallGraphGenerator),
        }
    }
}

impl FromStr for OrderingStrategy {
    type Err = DiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weighted" => Ok(OrderingStrategy::Weighted),
            "topological" => Ok(OrderingStrategy::Topological),
            other => Err(DiError::InvalidRegistration(format!(
                "unknown ordering strategy: {other}"
            ))),
        }
    }
}

/// Startup knobs for [`PipelineRunner::initialize`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StartupOptions {
    /// Require every built-in stage marker to be claimed by a contributor.
    pub validate_pipeline: bool,
    /// Fallback ordering strategy when no generator is registered.
    pub ordering: OrderingStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunnerState {
    Created,
    Initialized,
}

/// Drives the pipeline: one-time [`initialize`](Self::initialize), then
/// [`run`](Self::run) per request.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use pipewright::pipeline::{
///     PipelineContinuation, PipelineContributor, PipelineRunner, Registrar, StartupOptions,
/// };
/// use pipewright::{CommunicationContext, DependencyResolver, Request, ServiceKey};
///
/// struct Hello;
/// impl PipelineContributor for Hello {
///     fn key(&self) -> ServiceKey { ServiceKey::of::<Hello>() }
///     fn setup(&self, pipeline: &mut Registrar) {
///         pipeline.notify(|ctx| {
///             ctx.response.status = 200;
///             Ok(PipelineContinuation::Continue)
///         });
///     }
/// }
///
/// let resolver = Arc::new(DependencyResolver::default());
/// resolver.add_trait_instance::<dyn PipelineContributor>(
///     Arc::new(Hello),
///     pipewright::Lifetime::Singleton,
/// ).unwrap();
///
/// let mut runner = PipelineRunner::new(resolver);
/// runner.initialize(StartupOptions::default()).unwrap();
///
/// let mut ctx = CommunicationContext::new(Request::new("GET", "/"));
/// runner.run(&mut ctx).unwrap();
/// assert_eq!(ctx.response.status, 200);
/// ```
pub struct PipelineRunner {
    resolver: Arc<DependencyResolver>,
    contributors: Vec<Arc<dyn PipelineContributor>>,
    call_graph: Vec<ContributorCall>,
    state: RunnerState,
}

impl PipelineRunner {
    pub fn new(resolver: Arc<DependencyResolver>) -> Self {
        Self {
            resolver,
            contributors: Vec::new(),
            call_graph: Vec::new(),
            state: RunnerState::Created,
        }
    }

    /// The contributors discovered at initialization, bootstrap first.
    pub fn contributors(&self) -> &[Arc<dyn PipelineContributor>] {
        &self.contributors
    }

    /// The flattened call sequence. Empty before initialization.
    pub fn call_graph(&self) -> &[ContributorCall] {
        &self.call_graph
    }

    /// Resolves contributors, collects their notifications and generates
    /// the call graph. Callable exactly once.
    pub fn initialize(&mut self, options: StartupOptions) -> PipelineResult<()> {
        if self.state == RunnerState::Initialized {
            return Err(PipelineError::AlreadyInitialized);
        }

        let mut contributors = self
            .resolver
            .resolve_all_trait::<dyn PipelineContributor>()?;

        let begin = ServiceKey::of::<stages::Begin>();
        if !contributors.iter().any(|c| c.stages().contains(&begin)) {
            contributors.insert(0, Arc::new(BootstrapContributor));
        }

        let mut notifications = Vec::new();
        let mut next_seq = 0usize;
        for contributor in &contributors {
            let mut registrar = Registrar::new(contributor.key(), contributor.stages(), next_seq);
            contributor.setup(&mut registrar);
            let batch = registrar.finish();
            next_seq += batch.len();
            notifications.extend(batch);
        }

        if options.validate_pipeline {
            super::call_graph::check_stages(&notifications)?;
        }

        // The fallback covers only the unregistered case; a registered
        // generator that fails to resolve is a real error.
        let call_graph = if self.resolver.has_dependency::<dyn CallGraphGenerator>() {
            debug!("using registered call graph generator");
            let custom = self.resolver.resolve_trait::<dyn CallGraphGenerator>()?;
            custom.generate(notifications)?
        } else {
            options.ordering.generator().generate(notifications)?
        };

        self.contributors = contributors;
        self.call_graph = call_graph;
        self.state = RunnerState::Initialized;
        info!(
            contributors = self.contributors.len(),
            calls = self.call_graph.len(),
            "pipeline initialized"
        );
        Ok(())
    }

    /// Synchronous entry point; drives [`run_async`](Self::run_async) to
    /// completion on the current thread.
    pub fn run(&self, context: &mut CommunicationContext) -> PipelineResult<()> {
        futures::executor::block_on(self.run_async(context))
    }

    /// Walks the call graph. After a failure or abort only units carrying
    /// the [`stages::End`] stage still run, so cleanup contributors always
    /// get their turn.
    pub async fn run_async(&self, context: &mut CommunicationContext) -> PipelineResult<()> {
        if self.state != RunnerState::Initialized {
            return Err(PipelineError::NotInitialized);
        }

        let end = ServiceKey::of::<stages::End>();
        let mut failed = false;

        for call in &self.call_graph {
            if failed && !call.stages.contains(&end) {
                continue;
            }

            let outcome = match &call.callback {
                PipelineCallback::Sync(f) => f(context),
                PipelineCallback::Async(f) => f(context).await,
            };

            match outcome {
                Ok(PipelineContinuation::Continue) => {}
                Ok(PipelineContinuation::Finished) => {
                    debug!(contributor = call.contributor.name(), "pipeline finished");
                    break;
                }
                Ok(PipelineContinuation::Abort) => {
                    warn!(contributor = call.contributor.name(), "pipeline aborted");
                    context
                        .server_errors
                        .push(ServerError::new(format!(
                            "contributor {} aborted the pipeline",
                            call.contributor.name()
                        )));
                    context.response.status = 500;
                    failed = true;
                }
                Err(error) => {
                    warn!(
                        contributor = call.contributor.name(),
                        %error,
                        "pipeline contributor failed"
                    );
                    context.server_errors.push(ServerError::from(error));
                    context.response.status = 500;
                    failed = true;
                }
            }
        }

        Ok(())
    }
}

/// Async-first view of a pipeline, for hosts that embed the runner behind
/// their own trait object.
#[async_trait]
pub trait AsyncPipeline: Send + Sync {
    async fn process(&self, context: &mut CommunicationContext) -> PipelineResult<()>;
}

#[async_trait]
impl AsyncPipeline for PipelineRunner {
    async fn process(&self, context: &mut CommunicationContext) -> PipelineResult<()> {
        self.run_async(context).await
    }
}
