//! End-to-end behaviour of the dispatcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::{Ready, ready};
use herald_core::{
    ConversationScope, DispatchContext, ExecutionError, ExecutionResult, HandlerResult,
    InboundMessage, InjectError, LogSeverity, MemorySink, ParsedArgs, ServiceMap,
};
use herald_framework::{
    Command, Component, Dep, Dispatcher, DispatcherBuilder, Factory, Listener, ParamKind,
    ParameterSpec, PreconditionGate, PreconditionLayers, Registration, Route, RunMode, async_trait,
    check,
};
use parking_lot::Mutex;

fn message(content: &str) -> InboundMessage {
    InboundMessage::new(42, ConversationScope::Guild, content)
}

fn builder(sink: &Arc<MemorySink>) -> DispatcherBuilder {
    Dispatcher::builder()
        .prefix("!")
        .log_level(LogSeverity::Debug)
        .sink(sink.clone())
}

fn counting(
    counter: &Arc<AtomicUsize>,
) -> impl Fn(Arc<DispatchContext>, ParsedArgs) -> Ready<HandlerResult> + Send + Sync + 'static {
    let counter = Arc::clone(counter);
    move |_ctx, _args| {
        counter.fetch_add(1, Ordering::SeqCst);
        ready(Ok(()))
    }
}

#[tokio::test]
async fn prefix_trigger_routes_to_command() {
    let sink = Arc::new(MemorySink::new());
    let hits = Arc::new(AtomicUsize::new(0));
    let dispatcher = builder(&sink)
        .handler(Registration::command_fn("foo", counting(&hits)))
        .build()
        .unwrap();

    let addressed = dispatcher.dispatch(message("!foo")).await;
    assert_eq!(addressed.route, Route::Command("foo".into()));

    let plain = dispatcher.dispatch(message("foo")).await;
    assert_eq!(plain.route, Route::Listeners);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn mention_trigger_routes_to_command() {
    let sink = Arc::new(MemorySink::new());
    let hits = Arc::new(AtomicUsize::new(0));
    let dispatcher = builder(&sink)
        .mention(1234_u64)
        .handler(Registration::command_fn("foo", counting(&hits)))
        .build()
        .unwrap();

    dispatcher.dispatch(message("<@1234> foo")).await;
    dispatcher.dispatch(message("<@!1234> foo")).await;
    dispatcher.dispatch(message("<@999> foo")).await;
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn highest_priority_precondition_failure_is_reported() {
    let sink = Arc::new(MemorySink::new());
    let dispatcher = builder(&sink)
        .handler(
            Registration::command_fn("act", |_ctx, _args| async { HandlerResult::Ok(()) })
                .priority(5)
                .precondition(check("priority five refused", |_| false)),
        )
        .handler(
            Registration::command_fn("act", |_ctx, _args| async { HandlerResult::Ok(()) })
                .priority(10)
                .precondition(check("priority ten refused", |_| false)),
        )
        .build()
        .unwrap();

    let outcome = dispatcher.dispatch(message("!act")).await;
    let Some(ExecutionResult::PreconditionFailure(failure)) = outcome.result() else {
        panic!("expected a precondition failure, got {:?}", outcome.results);
    };
    assert_eq!(failure.reason, "priority ten refused");
}

#[tokio::test]
async fn priority_outweighs_parse_confidence() {
    let sink = Arc::new(MemorySink::new());
    let with_param = Arc::new(AtomicUsize::new(0));
    let without_param = Arc::new(AtomicUsize::new(0));
    let dispatcher = builder(&sink)
        .handler(
            Registration::command_fn("pick", counting(&with_param))
                .param(ParameterSpec::optional("word", ParamKind::Text)),
        )
        .handler(Registration::command_fn("pick", counting(&without_param)).priority(1))
        .build()
        .unwrap();

    let outcome = dispatcher.dispatch(message("!pick")).await;
    assert!(outcome.is_success());
    assert_eq!(with_param.load(Ordering::SeqCst), 0);
    assert_eq!(without_param.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ambiguous_choice_overload_beats_failed_integer_overload() {
    let sink = Arc::new(MemorySink::new());
    let numeric = Arc::new(AtomicUsize::new(0));
    let chosen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&chosen);
    let actions = ParamKind::Choice(vec!["start".into(), "status".into(), "stop".into()]);
    let dispatcher = builder(&sink)
        .handler(
            Registration::command_fn("act", counting(&numeric))
                .param(ParameterSpec::required("count", ParamKind::Integer)),
        )
        .handler(
            Registration::command_fn("act", move |_ctx, args: ParsedArgs| {
                record.lock().extend(args.text(0).map(str::to_owned));
                ready(HandlerResult::Ok(()))
            })
            .param(ParameterSpec::required("action", actions)),
        )
        .build()
        .unwrap();

    // "sta" prefixes both "start" and "status"; the closer completion wins.
    let outcome = dispatcher.dispatch(message("!act sta")).await;
    assert!(outcome.is_success(), "{:?}", outcome.results);
    assert_eq!(*chosen.lock(), vec!["start".to_owned()]);
    assert_eq!(numeric.load(Ordering::SeqCst), 0);

    let outcome = dispatcher.dispatch(message("!act 5")).await;
    assert!(outcome.is_success(), "{:?}", outcome.results);
    assert_eq!(numeric.load(Ordering::SeqCst), 1);
    assert_eq!(chosen.lock().len(), 1);
}

// ============================================================================
// Dependency construction
// ============================================================================

struct Greeting(String);

struct Greeter {
    greeting: Option<Dep<Greeting>>,
    seen: Arc<AtomicUsize>,
}

impl Component for Greeter {}

#[async_trait]
impl Listener for Greeter {
    async fn on_message(&mut self) -> HandlerResult {
        if self.greeting.is_none() {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[tokio::test]
async fn optional_dependency_resolves_to_none() {
    let sink = Arc::new(MemorySink::new());
    let absent = Arc::new(AtomicUsize::new(0));
    let tally = Arc::clone(&absent);
    let dispatcher = builder(&sink)
        .handler(Registration::listener(
            "greeter",
            Factory::new().constructor(move |greeting: Option<Dep<Greeting>>| Greeter {
                greeting,
                seen: Arc::clone(&tally),
            }),
        ))
        .build()
        .unwrap();

    let outcome = dispatcher.dispatch(message("hello")).await;
    assert!(outcome.is_success());
    assert_eq!(absent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn required_dependency_missing_is_named() {
    let sink = Arc::new(MemorySink::new());
    let dispatcher = builder(&sink)
        .handler(Registration::listener(
            "greeter",
            Factory::new().constructor(|greeting: Dep<Greeting>| Greeter {
                greeting: Some(greeting),
                seen: Arc::new(AtomicUsize::new(0)),
            }),
        ))
        .build()
        .unwrap();

    let outcome = dispatcher.dispatch(message("hello")).await;
    let Some(ExecutionResult::ExecutionFailure(ExecutionError::Dependency(
        InjectError::DependencyMissing { dependency, .. },
    ))) = outcome.result()
    else {
        panic!("expected a missing dependency, got {:?}", outcome.results);
    };
    assert!(dependency.ends_with("Greeting"));
}

#[async_trait]
impl Command for Greeter {
    async fn execute(&mut self, _args: ParsedArgs) -> HandlerResult {
        self.seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn needs_greeting(seen: &Arc<AtomicUsize>) -> Factory<Greeter> {
    let seen = Arc::clone(seen);
    Factory::new().constructor(move |greeting: Dep<Greeting>| Greeter {
        greeting: Some(greeting),
        seen: Arc::clone(&seen),
    })
}

#[tokio::test]
async fn detached_handlers_report_missing_dependency() {
    let sink = Arc::new(MemorySink::new());
    let ran = Arc::new(AtomicUsize::new(0));
    let dispatcher = builder(&sink)
        .handler(
            Registration::listener("greeter", needs_greeting(&ran)).run_mode(RunMode::Detached),
        )
        .handler(Registration::command("greet", needs_greeting(&ran)).run_mode(RunMode::Detached))
        .build()
        .unwrap();

    for content in ["hello", "!greet"] {
        let outcome = dispatcher.dispatch(message(content)).await;
        let Some(ExecutionResult::ExecutionFailure(ExecutionError::Dependency(
            InjectError::DependencyMissing { dependency, .. },
        ))) = outcome.result()
        else {
            panic!("expected a missing dependency for {content:?}, got {:?}", outcome.results);
        };
        assert!(dependency.ends_with("Greeting"));
    }

    dispatcher.wait_detached().await;
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn services_from_store_and_caller_pool() {
    let sink = Arc::new(MemorySink::new());
    let seen = Arc::new(AtomicUsize::new(0));
    let store = ServiceMap::new().with(Arc::new(Greeting("hi".into())));
    let tally = Arc::clone(&seen);
    let dispatcher = builder(&sink)
        .services(Arc::new(store))
        .handler(Registration::listener_fn("reads", move |ctx| {
            let tally = Arc::clone(&tally);
            async move {
                let greeting = ctx.pool().resolve::<Greeting>().ok_or("no greeting")?;
                let message = ctx.pool().resolve::<InboundMessage>().ok_or("no message")?;
                if greeting.0 == "hi" && message.content == "hello" {
                    tally.fetch_add(1, Ordering::SeqCst);
                }
                HandlerResult::Ok(())
            }
        }))
        .build()
        .unwrap();

    let outcome = dispatcher.dispatch(message("hello")).await;
    assert!(outcome.is_success(), "{:?}", outcome.results);

    let pool = dispatcher.pool().with(Arc::new(Greeting("ad-hoc".into())));
    dispatcher.dispatch_with(message("hello"), pool).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn detached_failure_reaches_only_the_sink() {
    let sink = Arc::new(MemorySink::new());
    let dispatcher = builder(&sink)
        .handler(
            Registration::command_fn("boom", |_ctx, _args| async {
                HandlerResult::Err("detached failure".into())
            })
            .run_mode(RunMode::Detached),
        )
        .handler(
            Registration::command_fn("panic", |_ctx, _args| async {
                panic!("detached panic");
            })
            .run_mode(RunMode::Detached),
        )
        .build()
        .unwrap();

    let failing = dispatcher.dispatch(message("!boom")).await;
    let panicking = dispatcher.dispatch(message("!panic")).await;
    assert!(matches!(failing.result(), Some(ExecutionResult::Success)));
    assert!(matches!(panicking.result(), Some(ExecutionResult::Success)));

    dispatcher.wait_detached().await;

    for outcome in [&failing, &panicking] {
        assert!(outcome.logs.iter().all(|e| e.severity != LogSeverity::Error));
    }
    let errors: Vec<String> = sink
        .events()
        .into_iter()
        .filter(|e| e.severity == LogSeverity::Error)
        .filter_map(|e| e.error.map(|err| err.to_string()))
        .collect();
    assert!(errors.contains(&"detached failure".to_owned()));
    assert!(errors.contains(&"handler panicked: detached panic".to_owned()));
}

#[tokio::test]
async fn default_run_mode_applies_to_unset_handlers() {
    let sink = Arc::new(MemorySink::new());
    let dispatcher = builder(&sink)
        .default_run_mode(RunMode::Detached)
        .handler(Registration::command_fn("later", |_ctx, _args| async {
            HandlerResult::Err("failed later".into())
        }))
        .build()
        .unwrap();

    let outcome = dispatcher.dispatch(message("!later")).await;
    assert!(outcome.is_success());
    dispatcher.wait_detached().await;
    assert!(
        sink.events()
            .iter()
            .any(|e| e.severity == LogSeverity::Error)
    );
}

#[tokio::test]
async fn listener_failures_are_isolated_and_ordered() {
    let sink = Arc::new(MemorySink::new());
    let first = Arc::new(AtomicUsize::new(0));
    let third = Arc::new(AtomicUsize::new(0));
    let (a, c) = (Arc::clone(&first), Arc::clone(&third));
    let dispatcher = builder(&sink)
        .handler(Registration::listener_fn("first", move |_ctx| {
            let a = Arc::clone(&a);
            async move {
                a.fetch_add(1, Ordering::SeqCst);
                HandlerResult::Ok(())
            }
        }))
        .handler(Registration::listener_fn("second", |_ctx| async {
            HandlerResult::Err("second failed".into())
        }))
        .handler(Registration::listener_fn("third", move |_ctx| {
            let c = Arc::clone(&c);
            async move {
                tokio::task::yield_now().await;
                c.fetch_add(1, Ordering::SeqCst);
                HandlerResult::Ok(())
            }
        }))
        .build()
        .unwrap();

    let outcome = dispatcher.dispatch(message("anything")).await;
    assert_eq!(outcome.route, Route::Listeners);
    assert_eq!(outcome.results.len(), 3);
    assert!(outcome.results[0].is_success());
    assert_eq!(outcome.results[1].reason().as_deref(), Some("second failed"));
    assert!(outcome.results[2].is_success());
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(third.load(Ordering::SeqCst), 1);
    assert!(
        outcome
            .logs
            .iter()
            .any(|e| e.severity == LogSeverity::Error && e.message == "Listener second failed")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listener_panic_does_not_affect_others() {
    let sink = Arc::new(MemorySink::new());
    let dispatcher = builder(&sink)
        .handler(Registration::listener_fn("ok", |_ctx| async { HandlerResult::Ok(()) }))
        .handler(Registration::listener_fn("panics", |_ctx| async {
            panic!("listener exploded");
        }))
        .build()
        .unwrap();

    let outcome = dispatcher.dispatch(message("anything")).await;
    assert!(outcome.results[0].is_success());
    assert!(matches!(
        &outcome.results[1],
        ExecutionResult::ExecutionFailure(ExecutionError::Panicked(msg)) if msg == "listener exploded"
    ));
}

// ============================================================================
// Preconditions
// ============================================================================

#[tokio::test]
async fn failing_check_short_circuits_later_checks() {
    let sink = Arc::new(MemorySink::new());
    let tally = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&tally);
    let dispatcher = builder(&sink)
        .layers(PreconditionLayers {
            message: PreconditionGate::new()
                .with(check("muted", |_| false))
                .with(check("counted", move |_| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    true
                })),
            ..Default::default()
        })
        .handler(Registration::listener_fn("never", |_ctx| async {
            HandlerResult::Ok(())
        }))
        .build()
        .unwrap();

    let outcome = dispatcher.dispatch(message("hello")).await;
    assert_eq!(
        outcome.result().and_then(ExecutionResult::reason).as_deref(),
        Some("Global message preconditions failed.")
    );
    assert_eq!(tally.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn listener_preconditions_filter_by_scope_and_user() {
    let sink = Arc::new(MemorySink::new());
    let dispatcher = builder(&sink)
        .handler(
            Registration::listener_fn("dm-only", |_ctx| async { HandlerResult::Ok(()) })
                .contexts(herald_core::ContextFlags::DIRECT),
        )
        .handler(
            Registration::listener_fn("owner-only", |_ctx| async { HandlerResult::Ok(()) })
                .allow_users([1_u64]),
        )
        .build()
        .unwrap();

    let outcome = dispatcher.dispatch(message("hello")).await;
    assert_eq!(
        outcome.results[0].reason().as_deref(),
        Some("Invalid context for command; accepted contexts: Direct")
    );
    assert_eq!(
        outcome.results[1].reason().as_deref(),
        Some("Command can only be run by users with these ids: 1")
    );
}

#[tokio::test]
async fn registry_changes_apply_to_later_dispatches() {
    let sink = Arc::new(MemorySink::new());
    let dispatcher = builder(&sink).build().unwrap();
    let id = dispatcher
        .registry()
        .add(Registration::listener_fn("late", |_ctx| async { HandlerResult::Ok(()) }));

    assert_eq!(dispatcher.dispatch(message("hi")).await.results.len(), 1);
    assert!(dispatcher.registry().remove(id));
    assert!(dispatcher.dispatch(message("hi")).await.results.is_empty());
}
