//! The dispatch orchestrator.
//!
//! [`Dispatcher::dispatch`] is the single entry point per inbound message:
//!
//! 1. resolve the trigger (prefix or mention)
//! 2. addressed messages pass the *addressed* layer; if the payload starts
//!    with a registered command name, the *command* layer runs and the
//!    candidate scorer picks the command to execute
//! 3. everything else takes the listener path: the *message* layer runs
//!    once, then every listener is checked, built and executed on its own
//!    task; results come back in registration order
//!
//! Dispatch never fails: every outcome is a typed [`ExecutionResult`], and
//! the log events emitted during the dispatch are returned alongside.
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::builder()
//!     .prefix("!")
//!     .mention(UserId(1234))
//!     .handler(Registration::command_fn("ping", |_ctx, _args| async { HandlerResult::Ok(()) }))
//!     .build()?;
//!
//! let outcome = dispatcher
//!     .dispatch(InboundMessage::new(42, ConversationScope::Guild, "!ping"))
//!     .await;
//! assert_eq!(outcome.route, Route::Command("ping".into()));
//! ```

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use herald_core::{
    DependencyPool, DispatchContext, EmptyServices, ExecutionError, ExecutionResult,
    InboundMessage, LogEvent, LogSeverity, LogSink, Logger, ParsedArgs, ServiceStore, TracingSink,
    UserId,
};
use tower::Service;
use tracing::{Instrument, Level, Span, debug, span};

use crate::definition::{HandlerKind, RunMode};
use crate::error::{FrameworkError, FrameworkResult};
use crate::executor::{Executor, Invocation};
use crate::handler::{HandlerEntry, Registration};
use crate::parser::{ArgumentParser, TokenParser, split_head};
use crate::precondition::{GlobalLayer, PreconditionLayers, evaluate_definition};
use crate::registry::{HandlerSource, Registry};
use crate::scoring::{CandidateScorer, DEFAULT_CONFIDENCE_WEIGHT, Resolution};
use crate::trigger::TriggerResolver;

const SOURCE: &str = "Dispatcher";
const LISTENERS: &str = "Listeners";
const COMMANDS: &str = "Commands";

/// Which path a dispatch took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A structured command, by the name it was invoked with.
    Command(String),
    /// The listener fan-out.
    Listeners,
    /// The addressed layer rejected the message.
    Rejected,
}

/// Everything one dispatch produced.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub route: Route,
    /// One result for a command; one per listener, in registration order,
    /// for the listener path.
    pub results: Vec<ExecutionResult>,
    /// Events emitted during this dispatch (after severity filtering).
    pub logs: Vec<LogEvent>,
}

impl DispatchOutcome {
    /// The first result, which is the only one on the command path.
    pub fn result(&self) -> Option<&ExecutionResult> {
        self.results.first()
    }

    /// Returns `true` if every result is a success.
    pub fn is_success(&self) -> bool {
        self.results.iter().all(ExecutionResult::is_success)
    }
}

struct DispatcherInner {
    registry: Registry,
    trigger: TriggerResolver,
    layers: PreconditionLayers,
    scorer: CandidateScorer,
    executor: Executor,
    services: Arc<dyn ServiceStore>,
    logger: Logger,
}

/// Routes inbound messages to registered handlers.
///
/// Cheap to clone; clones share the registry and the detached-task tracker.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// The registry, for adding and removing handlers at runtime.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn trigger(&self) -> &TriggerResolver {
        &self.inner.trigger
    }

    pub fn logger(&self) -> &Logger {
        &self.inner.logger
    }

    pub fn executor(&self) -> &Executor {
        &self.inner.executor
    }

    /// A pool over the configured service store, for [`dispatch_with`](Self::dispatch_with).
    pub fn pool(&self) -> DependencyPool {
        DependencyPool::new(Arc::clone(&self.inner.services))
    }

    /// Waits for every detached invocation spawned so far.
    pub async fn wait_detached(&self) {
        self.inner.executor.wait_detached().await;
    }

    /// Dispatches `message` with the configured service store.
    pub async fn dispatch(&self, message: InboundMessage) -> DispatchOutcome {
        let pool = self.pool();
        self.dispatch_with(message, pool).await
    }

    /// Dispatches `message` with a caller-supplied pool.
    ///
    /// The message itself is added to the pool as an ad-hoc object.
    pub async fn dispatch_with(&self, message: InboundMessage, pool: DependencyPool) -> DispatchOutcome {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            author = %message.author,
            scope = %message.scope
        );
        self.dispatch_inner(message, pool).instrument(span).await
    }

    async fn dispatch_inner(&self, message: InboundMessage, pool: DependencyPool) -> DispatchOutcome {
        let (logger, capture) = self.inner.logger.capturing();
        let snapshot = self.inner.registry.snapshot();

        let message = Arc::new(message);
        let trigger = self.inner.trigger.resolve(&message.content);
        let pool = pool.with(Arc::clone(&message));
        let ctx = Arc::new(DispatchContext::new(message, trigger, pool));

        let (route, results) = self.route(&ctx, &snapshot, &logger).await;
        debug!(route = ?route, results = results.len(), "Dispatch finished");

        DispatchOutcome {
            route,
            results,
            logs: capture.take(),
        }
    }

    async fn route(
        &self,
        ctx: &Arc<DispatchContext>,
        snapshot: &[Arc<HandlerEntry>],
        logger: &Logger,
    ) -> (Route, Vec<ExecutionResult>) {
        if ctx.is_addressed() {
            if let Err((outer, inner)) = self.inner.layers.evaluate(GlobalLayer::Addressed, ctx).await {
                logger.debug(SOURCE, format!("{} ({inner})", outer.reason));
                return (Route::Rejected, vec![outer.into()]);
            }

            if let Some((name, input)) = split_head(ctx.payload()) {
                let candidates: Vec<Arc<HandlerEntry>> = snapshot
                    .iter()
                    .filter(|e| e.definition().kind() == HandlerKind::Command)
                    .filter(|e| e.definition().matches_name(name))
                    .cloned()
                    .collect();
                if !candidates.is_empty() {
                    let result = self.run_command(ctx, &candidates, input, logger).await;
                    return (Route::Command(name.to_owned()), vec![result]);
                }
            }
        }

        (Route::Listeners, self.run_listeners(ctx, snapshot, logger).await)
    }

    async fn run_command(
        &self,
        ctx: &Arc<DispatchContext>,
        candidates: &[Arc<HandlerEntry>],
        input: &str,
        logger: &Logger,
    ) -> ExecutionResult {
        if let Err((outer, inner)) = self.inner.layers.evaluate(GlobalLayer::Command, ctx).await {
            logger.debug(COMMANDS, format!("{} ({inner})", outer.reason));
            return outer.into();
        }

        let (entry, args) = match self.inner.scorer.resolve(ctx, candidates, input, logger).await {
            Resolution::Selected { entry, args, .. } => (entry, args),
            Resolution::Rejected(result) => return result,
        };
        let name = entry.definition().name().to_owned();

        let body = match entry.instantiate(Arc::clone(ctx), args) {
            Ok(body) => body,
            Err(err) => {
                logger.error_with(
                    COMMANDS,
                    format!("Failed to construct command {name}"),
                    Arc::new(err.clone()),
                );
                return err.into();
            }
        };

        logger.verbose(COMMANDS, format!("Executing command {name}"));
        let result = self
            .inner
            .executor
            .execute(entry.definition().run_mode(), Invocation::new(name.clone(), body))
            .await;
        if let ExecutionResult::ExecutionFailure(err) = &result {
            logger.error_with(COMMANDS, format!("Command {name} failed"), err.as_shared());
        }
        result
    }

    async fn run_listeners(
        &self,
        ctx: &Arc<DispatchContext>,
        snapshot: &[Arc<HandlerEntry>],
        logger: &Logger,
    ) -> Vec<ExecutionResult> {
        if let Err((outer, inner)) = self.inner.layers.evaluate(GlobalLayer::Message, ctx).await {
            logger.debug(LISTENERS, format!("{} ({inner})", outer.reason));
            return vec![outer.into()];
        }

        let tasks: Vec<_> = snapshot
            .iter()
            .filter(|e| e.definition().kind() == HandlerKind::Listener)
            .map(|entry| {
                let entry = Arc::clone(entry);
                let ctx = Arc::clone(ctx);
                let logger = logger.clone();
                let executor = self.inner.executor.clone();
                let task = run_listener(entry, ctx, logger, executor);
                tokio::spawn(task.instrument(Span::current()))
            })
            .collect();

        join_all(tasks)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(result) => result,
                Err(err) if err.is_panic() => {
                    ExecutionResult::ExecutionFailure(ExecutionError::from_panic(err.into_panic()))
                }
                Err(err) => ExecutionResult::ExecutionFailure(ExecutionError::Panicked(err.to_string())),
            })
            .collect()
    }
}

async fn run_listener(
    entry: Arc<HandlerEntry>,
    ctx: Arc<DispatchContext>,
    logger: Logger,
    executor: Executor,
) -> ExecutionResult {
    let definition = entry.definition();
    let name = definition.name();

    if let Err(failure) = evaluate_definition(definition, &ctx).await {
        logger.debug(
            LISTENERS,
            format!("Preconditions failed for listener {name}: {failure}"),
        );
        return failure.into();
    }

    let body = match entry.instantiate(Arc::clone(&ctx), ParsedArgs::default()) {
        Ok(body) => body,
        Err(err) => {
            logger.error_with(
                LISTENERS,
                format!("Failed to construct listener {name}"),
                Arc::new(err.clone()),
            );
            return err.into();
        }
    };

    logger.verbose(LISTENERS, format!("Executing listener {name}"));
    let result = executor
        .execute(definition.run_mode(), Invocation::new(name, body))
        .await;
    if let ExecutionResult::ExecutionFailure(err) = &result {
        logger.error_with(LISTENERS, format!("Listener {name} failed"), err.as_shared());
    }
    result
}

impl Service<InboundMessage> for Dispatcher {
    type Response = DispatchOutcome;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<DispatchOutcome, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, message: InboundMessage) -> Self::Future {
        let dispatcher = self.clone();
        async move { Ok(dispatcher.dispatch(message).await) }.boxed()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.inner.registry)
            .field("trigger", &self.inner.trigger)
            .field("scorer", &self.inner.scorer)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// DispatcherBuilder
// ============================================================================

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    prefix: String,
    mention: Option<UserId>,
    default_mode: RunMode,
    log_level: LogSeverity,
    sink: Arc<dyn LogSink>,
    parser: Arc<dyn ArgumentParser>,
    services: Arc<dyn ServiceStore>,
    layers: PreconditionLayers,
    weight: f64,
    deny_bots: bool,
    registrations: Vec<Registration>,
}

impl DispatcherBuilder {
    /// Defaults: prefix `"!"`, blocking, `Info` to a [`TracingSink`],
    /// [`TokenParser`], no services, weight `0.99`.
    pub fn new() -> Self {
        Self {
            prefix: "!".to_owned(),
            mention: None,
            default_mode: RunMode::Blocking,
            log_level: LogSeverity::Info,
            sink: Arc::new(TracingSink),
            parser: Arc::new(TokenParser),
            services: Arc::new(EmptyServices),
            layers: PreconditionLayers::default(),
            weight: DEFAULT_CONFIDENCE_WEIGHT,
            deny_bots: false,
            registrations: Vec::new(),
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Accepts mentions of `id` as a trigger.
    pub fn mention(mut self, id: impl Into<UserId>) -> Self {
        self.mention = Some(id.into());
        self
    }

    /// Run mode for handlers registered with [`RunMode::Default`].
    pub fn default_run_mode(mut self, mode: RunMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Minimum severity forwarded to the sink.
    pub fn log_level(mut self, level: LogSeverity) -> Self {
        self.log_level = level;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn parser(mut self, parser: Arc<dyn ArgumentParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn services(mut self, services: Arc<dyn ServiceStore>) -> Self {
        self.services = services;
        self
    }

    pub fn layers(mut self, layers: PreconditionLayers) -> Self {
        self.layers = layers;
        self
    }

    /// Weight of parse confidence in the composite score; must be in `[0, 1)`.
    pub fn confidence_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Rejects commands from bot authors.
    pub fn deny_bots(mut self, deny: bool) -> Self {
        self.deny_bots = deny;
        self
    }

    /// Registers a handler when the dispatcher is built.
    pub fn handler(mut self, registration: Registration) -> Self {
        self.registrations.push(registration);
        self
    }

    /// Registers every handler of `source` when the dispatcher is built.
    pub fn source(mut self, source: &dyn HandlerSource) -> Self {
        self.registrations.extend(source.registrations());
        self
    }

    pub fn build(self) -> FrameworkResult<Dispatcher> {
        if !(0.0..1.0).contains(&self.weight) {
            return Err(FrameworkError::ConfidenceWeight(self.weight));
        }

        let logger = Logger::new(self.log_level, self.sink);
        let registry = Registry::new(self.default_mode, logger.clone())?.deny_bots(self.deny_bots);
        registry.add_all(self.registrations);

        let mut trigger = TriggerResolver::new(self.prefix);
        if let Some(id) = self.mention {
            trigger = trigger.with_mention(id);
        }

        Ok(Dispatcher {
            inner: Arc::new(DispatcherInner {
                registry,
                trigger,
                layers: self.layers,
                scorer: CandidateScorer::new(self.parser, self.weight),
                executor: Executor::new(logger.clone()),
                services: self.services,
                logger,
            }),
        })
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::precondition::{PreconditionGate, check};
    use herald_core::{ConversationScope, HandlerResult, MemorySink};
    use tower::ServiceExt;

    fn message(content: &str) -> InboundMessage {
        InboundMessage::new(42, ConversationScope::Guild, content)
    }

    fn counting_command(name: &str, counter: &Arc<AtomicUsize>) -> Registration {
        let counter = Arc::clone(counter);
        Registration::command_fn(name.to_owned(), move |_ctx, _args| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                HandlerResult::Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_command_route() {
        let counter = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::builder()
            .sink(Arc::new(MemorySink::new()))
            .handler(counting_command("ping", &counter))
            .build()
            .unwrap();

        let outcome = dispatcher.dispatch(message("!PING")).await;
        assert_eq!(outcome.route, Route::Command("PING".into()));
        assert!(outcome.is_success());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_command_falls_through_to_listeners() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let dispatcher = Dispatcher::builder()
            .sink(Arc::new(MemorySink::new()))
            .handler(Registration::listener_fn("count", move |_ctx| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    HandlerResult::Ok(())
                }
            }))
            .build()
            .unwrap();

        let outcome = dispatcher.dispatch(message("!nothing here")).await;
        assert_eq!(outcome.route, Route::Listeners);
        assert_eq!(outcome.results.len(), 1);

        let outcome = dispatcher.dispatch(message("plain chatter")).await;
        assert_eq!(outcome.route, Route::Listeners);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_addressed_layer_rejects() {
        let dispatcher = Dispatcher::builder()
            .sink(Arc::new(MemorySink::new()))
            .layers(PreconditionLayers {
                addressed: PreconditionGate::new().with(check("closed", |_| false)),
                ..Default::default()
            })
            .build()
            .unwrap();

        let outcome = dispatcher.dispatch(message("!ping")).await;
        assert_eq!(outcome.route, Route::Rejected);
        assert_eq!(
            outcome.result().and_then(ExecutionResult::reason).as_deref(),
            Some("Global preconditions failed.")
        );

        // Unaddressed messages never see the addressed layer.
        let outcome = dispatcher.dispatch(message("ping")).await;
        assert_eq!(outcome.route, Route::Listeners);
    }

    #[tokio::test]
    async fn test_deny_bots() {
        let counter = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::builder()
            .sink(Arc::new(MemorySink::new()))
            .deny_bots(true)
            .handler(counting_command("ping", &counter))
            .build()
            .unwrap();

        let outcome = dispatcher.dispatch(message("!ping").from_bot()).await;
        assert_eq!(
            outcome.result().and_then(ExecutionResult::reason).as_deref(),
            Some("Bots cannot perform ping command.")
        );
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_outcome_captures_logs() {
        let dispatcher = Dispatcher::builder()
            .sink(Arc::new(MemorySink::new()))
            .log_level(LogSeverity::Verbose)
            .handler(Registration::listener_fn("hello", |_ctx| async {
                HandlerResult::Ok(())
            }))
            .build()
            .unwrap();

        let outcome = dispatcher.dispatch(message("hi")).await;
        assert!(
            outcome
                .logs
                .iter()
                .any(|e| e.message == "Executing listener hello")
        );
    }

    #[tokio::test]
    async fn test_invalid_builder_settings() {
        let err = Dispatcher::builder()
            .default_run_mode(RunMode::Default)
            .build()
            .unwrap_err();
        assert_eq!(err, FrameworkError::DefaultRunMode);

        let err = Dispatcher::builder()
            .confidence_weight(1.0)
            .build()
            .unwrap_err();
        assert_eq!(err, FrameworkError::ConfidenceWeight(1.0));
    }

    #[tokio::test]
    async fn test_tower_service() {
        let counter = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::builder()
            .sink(Arc::new(MemorySink::new()))
            .handler(counting_command("ping", &counter))
            .build()
            .unwrap();

        let outcome = dispatcher.oneshot(message("!ping")).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listener_tasks_run_inside_dispatch_span() {
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry());
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let dispatcher = Dispatcher::builder()
            .sink(Arc::new(MemorySink::new()))
            .handler(Registration::listener_fn("traced", move |_ctx| {
                let current = Span::current();
                if current.metadata().map(|m| m.name()) == Some("dispatch") {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
                async { HandlerResult::Ok(()) }
            }))
            .build()
            .unwrap();

        let outcome = dispatcher.dispatch(message("hello")).await;
        assert!(outcome.is_success());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
