use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use pipewright::pipeline::call_graph::{CallGraphGenerator, TopologicalCallGraphGenerator};
use pipewright::pipeline::{
    stages, CallResult, ContributorCall, ContributorNotification, OrderingStrategy,
    PipelineContinuation, PipelineContributor, PipelineRunner, Registrar, StartupOptions,
};
use pipewright::{
    Args, CommunicationContext, Constructor, DependencyResolver, DiError, Injectable, Lifetime,
    PipelineError, PipelineResult, Request, ServiceKey,
};

type Trace = Arc<Mutex<Vec<&'static str>>>;

fn register(resolver: &DependencyResolver, contributor: impl PipelineContributor) {
    resolver
        .add_trait_instance::<dyn PipelineContributor>(Arc::new(contributor), Lifetime::Singleton)
        .unwrap();
}

fn context() -> CommunicationContext {
    CommunicationContext::new(Request::new("GET", "/resource"))
}

struct Recorder {
    label: &'static str,
    trace: Trace,
}

impl PipelineContributor for Recorder {
    fn key(&self) -> ServiceKey {
        ServiceKey::of::<Self>()
    }

    fn setup(&self, pipeline: &mut Registrar) {
        let label = self.label;
        let trace = self.trace.clone();
        pipeline.notify(move |_| {
            trace.lock().unwrap().push(label);
            Ok(PipelineContinuation::Continue)
        });
    }
}

#[test]
fn running_before_initialization_fails() {
    let runner = PipelineRunner::new(Arc::new(DependencyResolver::new()));
    let mut ctx = context();
    assert!(matches!(
        futures::executor::block_on(runner.run_async(&mut ctx)),
        Err(PipelineError::NotInitialized)
    ));
}

#[test]
fn initializing_twice_fails() {
    let mut runner = PipelineRunner::new(Arc::new(DependencyResolver::new()));
    runner.initialize(StartupOptions::default()).unwrap();
    assert!(matches!(
        runner.initialize(StartupOptions::default()),
        Err(PipelineError::AlreadyInitialized)
    ));
}

#[test]
fn a_bootstrap_contributor_is_injected_when_absent() {
    let mut runner = PipelineRunner::new(Arc::new(DependencyResolver::new()));
    runner.initialize(StartupOptions::default()).unwrap();

    let begin = ServiceKey::of::<stages::Begin>();
    assert_eq!(runner.contributors().len(), 1);
    assert!(runner.contributors()[0].stages().contains(&begin));
    assert_eq!(runner.call_graph().len(), 1);
}

#[test]
fn contributors_execute_in_graph_order() {
    let resolver = Arc::new(DependencyResolver::new());
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));

    register(
        &resolver,
        Recorder {
            label: "one",
            trace: trace.clone(),
        },
    );

    let mut runner = PipelineRunner::new(resolver);
    runner.initialize(StartupOptions::default()).unwrap();

    let mut ctx = context();
    runner.run(&mut ctx).unwrap();

    assert_eq!(*trace.lock().unwrap(), vec!["one"]);
    assert_eq!(ctx.response.status, 200);
    assert!(ctx.server_errors.is_empty());
}

struct Failing;

impl PipelineContributor for Failing {
    fn key(&self) -> ServiceKey {
        ServiceKey::of::<Self>()
    }

    fn setup(&self, pipeline: &mut Registrar) {
        pipeline.notify(|_| Err("operation blew up".into()));
    }
}

struct Downstream {
    ran: Arc<AtomicBool>,
}

impl PipelineContributor for Downstream {
    fn key(&self) -> ServiceKey {
        ServiceKey::of::<Self>()
    }

    fn setup(&self, pipeline: &mut Registrar) {
        let ran = self.ran.clone();
        pipeline
            .notify(move |_| {
                ran.store(true, Ordering::SeqCst);
                Ok(PipelineContinuation::Continue)
            })
            .after::<Failing>();
    }
}

struct Cleanup {
    ran: Arc<AtomicBool>,
}

impl PipelineContributor for Cleanup {
    fn key(&self) -> ServiceKey {
        ServiceKey::of::<Self>()
    }

    fn stages(&self) -> Vec<ServiceKey> {
        vec![ServiceKey::of::<stages::End>()]
    }

    fn setup(&self, pipeline: &mut Registrar) {
        let ran = self.ran.clone();
        pipeline
            .notify(move |_| {
                ran.store(true, Ordering::SeqCst);
                Ok(PipelineContinuation::Continue)
            })
            .after::<Failing>();
    }
}

#[tokio::test]
async fn a_failing_contributor_turns_into_one_server_error() {
    let resolver = Arc::new(DependencyResolver::new());
    let downstream_ran = Arc::new(AtomicBool::new(false));
    let cleanup_ran = Arc::new(AtomicBool::new(false));

    register(&resolver, Failing);
    register(
        &resolver,
        Downstream {
            ran: downstream_ran.clone(),
        },
    );
    register(
        &resolver,
        Cleanup {
            ran: cleanup_ran.clone(),
        },
    );

    let mut runner = PipelineRunner::new(resolver);
    runner.initialize(StartupOptions::default()).unwrap();

    let mut ctx = context();
    runner.run_async(&mut ctx).await.unwrap();

    assert_eq!(ctx.server_errors.len(), 1);
    assert!(ctx.server_errors[0].message.contains("operation blew up"));
    assert_eq!(ctx.response.status, 500);

    // Ordinary downstream units are skipped; End-stage units still run.
    assert!(!downstream_ran.load(Ordering::SeqCst));
    assert!(cleanup_ran.load(Ordering::SeqCst));
}

struct Aborting;

impl PipelineContributor for Aborting {
    fn key(&self) -> ServiceKey {
        ServiceKey::of::<Self>()
    }

    fn setup(&self, pipeline: &mut Registrar) {
        pipeline.notify(|_| Ok(PipelineContinuation::Abort));
    }
}

#[test]
fn aborting_fails_the_request_like_an_error() {
    let resolver = Arc::new(DependencyResolver::new());
    register(&resolver, Aborting);

    let mut runner = PipelineRunner::new(resolver);
    runner.initialize(StartupOptions::default()).unwrap();

    let mut ctx = context();
    runner.run(&mut ctx).unwrap();

    assert_eq!(ctx.response.status, 500);
    assert_eq!(ctx.server_errors.len(), 1);
}

struct Finisher;

impl PipelineContributor for Finisher {
    fn key(&self) -> ServiceKey {
        ServiceKey::of::<Self>()
    }

    fn setup(&self, pipeline: &mut Registrar) {
        pipeline.notify(|ctx: &mut CommunicationContext| {
            ctx.response.status = 204;
            Ok(PipelineContinuation::Finished)
        });
    }
}

#[test]
fn finishing_stops_the_pipeline_cleanly() {
    let resolver = Arc::new(DependencyResolver::new());
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));

    register(&resolver, Finisher);
    register(
        &resolver,
        Recorder {
            label: "late",
            trace: trace.clone(),
        },
    );

    let mut runner = PipelineRunner::new(resolver);
    runner.initialize(StartupOptions::default()).unwrap();

    let mut ctx = context();
    runner.run(&mut ctx).unwrap();

    assert_eq!(ctx.response.status, 204);
    assert!(ctx.server_errors.is_empty());
    assert!(trace.lock().unwrap().is_empty());
}

struct AsyncStep {
    trace: Trace,
}

fn async_step(ctx: &mut CommunicationContext, trace: Trace) -> BoxFuture<'_, CallResult> {
    Box::pin(async move {
        tokio::task::yield_now().await;
        ctx.response
            .headers
            .insert("x-step".to_string(), "async".to_string());
        trace.lock().unwrap().push("async");
        Ok(PipelineContinuation::Continue)
    })
}

impl PipelineContributor for AsyncStep {
    fn key(&self) -> ServiceKey {
        ServiceKey::of::<Self>()
    }

    fn setup(&self, pipeline: &mut Registrar) {
        let trace = self.trace.clone();
        pipeline.notify_async(move |ctx| async_step(ctx, trace.clone()));
    }
}

struct SyncStep {
    trace: Trace,
}

impl PipelineContributor for SyncStep {
    fn key(&self) -> ServiceKey {
        ServiceKey::of::<Self>()
    }

    fn setup(&self, pipeline: &mut Registrar) {
        let trace = self.trace.clone();
        pipeline
            .notify(move |_| {
                trace.lock().unwrap().push("sync");
                Ok(PipelineContinuation::Continue)
            })
            .after::<AsyncStep>();
    }
}

#[tokio::test]
async fn sync_and_async_units_interleave_in_graph_order() {
    let resolver = Arc::new(DependencyResolver::new());
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));

    register(
        &resolver,
        SyncStep {
            trace: trace.clone(),
        },
    );
    register(
        &resolver,
        AsyncStep {
            trace: trace.clone(),
        },
    );

    let mut runner = PipelineRunner::new(resolver);
    runner.initialize(StartupOptions::default()).unwrap();

    let mut ctx = context();
    runner.run_async(&mut ctx).await.unwrap();

    assert_eq!(*trace.lock().unwrap(), vec!["async", "sync"]);
    assert_eq!(ctx.response.headers.get("x-step").map(String::as_str), Some("async"));
}

struct MarkingGenerator {
    used: Arc<AtomicBool>,
}

impl CallGraphGenerator for MarkingGenerator {
    fn generate(
        &self,
        notifications: Vec<ContributorNotification>,
    ) -> PipelineResult<Vec<ContributorCall>> {
        self.used.store(true, Ordering::SeqCst);
        TopologicalCallGraphGenerator.generate(notifications)
    }
}

#[test]
fn a_registered_generator_replaces_the_default_strategy() {
    let resolver = Arc::new(DependencyResolver::new());
    let used = Arc::new(AtomicBool::new(false));
    resolver
        .add_trait_instance::<dyn CallGraphGenerator>(
            Arc::new(MarkingGenerator { used: used.clone() }),
            Lifetime::Singleton,
        )
        .unwrap();

    let mut runner = PipelineRunner::new(resolver);
    runner.initialize(StartupOptions::default()).unwrap();

    assert!(used.load(Ordering::SeqCst));
    assert_eq!(runner.call_graph().len(), 1);
}

struct MissingPiece;

struct BrokenGenerator {
    _piece: Arc<MissingPiece>,
}

impl Injectable for BrokenGenerator {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(
            vec![ServiceKey::of::<MissingPiece>()],
            |args: &mut Args| {
                Ok(BrokenGenerator {
                    _piece: args.concrete::<MissingPiece>()?,
                })
            },
        )]
    }
}

impl CallGraphGenerator for BrokenGenerator {
    fn generate(
        &self,
        notifications: Vec<ContributorNotification>,
    ) -> PipelineResult<Vec<ContributorCall>> {
        TopologicalCallGraphGenerator.generate(notifications)
    }
}

#[test]
fn a_registered_generator_that_fails_to_resolve_is_not_swallowed() {
    let resolver = Arc::new(DependencyResolver::new());
    resolver
        .add_dependency_as::<dyn CallGraphGenerator, BrokenGenerator, _>(
            Lifetime::Singleton,
            |g| g,
        )
        .unwrap();

    let mut runner = PipelineRunner::new(resolver);
    let err = runner.initialize(StartupOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Resolution(DiError::NotFound(_))
    ));
}

#[test]
fn full_validation_requires_every_stage() {
    let resolver = Arc::new(DependencyResolver::new());
    let mut runner = PipelineRunner::new(resolver);

    let err = runner
        .initialize(StartupOptions {
            validate_pipeline: true,
            ordering: OrderingStrategy::default(),
        })
        .unwrap_err();

    match err {
        PipelineError::MissingContributors(names) => {
            // Begin is satisfied by the injected bootstrap; the rest are not.
            assert!(names.iter().any(|n| n.contains("UriMatching")));
            assert!(names.iter().any(|n| n.contains("End")));
            assert!(!names.iter().any(|n| n.contains("Begin")));
        }
        other => panic!("expected missing contributors, got {other}"),
    }
}

#[test]
fn both_ordering_strategies_are_selectable() {
    for ordering in [OrderingStrategy::Weighted, OrderingStrategy::Topological] {
        let resolver = Arc::new(DependencyResolver::new());
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        register(
            &resolver,
            Recorder {
                label: "step",
                trace: trace.clone(),
            },
        );

        let mut runner = PipelineRunner::new(resolver);
        runner
            .initialize(StartupOptions {
                validate_pipeline: false,
                ordering,
            })
            .unwrap();

        let mut ctx = context();
        runner.run(&mut ctx).unwrap();
        assert_eq!(*trace.lock().unwrap(), vec!["step"]);
    }
}

#[test]
fn ordering_strategy_parses_from_configuration() {
    assert_eq!(
        "weighted".parse::<OrderingStrategy>().unwrap(),
        OrderingStrategy::Weighted
    );
    assert_eq!(
        "topological".parse::<OrderingStrategy>().unwrap(),
        OrderingStrategy::Topological
    );
    assert!("alphabetical".parse::<OrderingStrategy>().is_err());
}
