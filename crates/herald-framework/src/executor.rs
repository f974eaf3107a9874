//! Run-mode execution of handler bodies.
//!
//! Execution is expressed as tower services over an [`Invocation`]:
//!
//! - [`InlineService`] runs the body and converts an `Err` return or a panic
//!   into an [`ExecutionError`]
//! - [`DetachLayer`] wraps any such service so that the call is spawned as a
//!   background task and answers `Ok` immediately; the eventual failure is
//!   only logged
//!
//! ```text
//! Blocking:  Invocation ──▶ InlineService ──▶ Result<(), ExecutionError>
//! Detached:  Invocation ──▶ DetachService ──spawn──▶ InlineService ──▶ log sink
//!                                │
//!                                └──▶ Ok(()) right away
//! ```
//!
//! Detached tasks cannot be cancelled. They are tracked only so that a
//! runtime can wait for them to drain on shutdown.

use std::panic::AssertUnwindSafe;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{BoxFuture, ready};
use herald_core::{ExecutionError, ExecutionResult, HandlerResult, Logger};
use tokio_util::task::TaskTracker;
use tower::{Service, ServiceExt};
use tower_layer::Layer;
use tracing::trace;

use crate::definition::RunMode;

const SOURCE: &str = "Executor";

/// One call of a handler body.
pub struct Invocation {
    /// Handler name, for diagnostics.
    pub handler: String,
    pub body: BoxFuture<'static, HandlerResult>,
}

impl Invocation {
    pub fn new(handler: impl Into<String>, body: BoxFuture<'static, HandlerResult>) -> Self {
        Self {
            handler: handler.into(),
            body,
        }
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// InlineService
// ============================================================================

/// Runs an invocation to completion in the caller's task.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineService;

impl Service<Invocation> for InlineService {
    type Response = ();
    type Error = ExecutionError;
    type Future = BoxFuture<'static, Result<(), ExecutionError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        async move {
            match AssertUnwindSafe(invocation.body).catch_unwind().await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(ExecutionError::handler(err)),
                Err(panic) => Err(ExecutionError::from_panic(panic)),
            }
        }
        .boxed()
    }
}

// ============================================================================
// DetachLayer
// ============================================================================

/// A [`Layer`] that detaches the wrapped service from its caller.
#[derive(Debug, Clone)]
pub struct DetachLayer {
    tracker: TaskTracker,
    logger: Logger,
}

impl DetachLayer {
    /// Spawned tasks are tracked by `tracker`; failures go to `logger`.
    pub fn new(tracker: TaskTracker, logger: Logger) -> Self {
        Self { tracker, logger }
    }
}

impl<S> Layer<S> for DetachLayer {
    type Service = DetachService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DetachService {
            inner,
            tracker: self.tracker.clone(),
            logger: self.logger.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetachService<S> {
    inner: S,
    tracker: TaskTracker,
    logger: Logger,
}

impl<S> Service<Invocation> for DetachService<S>
where
    S: Service<Invocation, Response = (), Error = ExecutionError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = ();
    type Error = ExecutionError;
    type Future = BoxFuture<'static, Result<(), ExecutionError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        // Take the readied service and leave a fresh clone in its place.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let logger = self.logger.clone();
        let handler = invocation.handler.clone();

        self.tracker.spawn(async move {
            if let Err(err) = inner.oneshot(invocation).await {
                logger.error_with(
                    SOURCE,
                    format!("Detached handler {handler} failed: {err}"),
                    err.as_shared(),
                );
            } else {
                trace!(handler = %handler, "Detached handler finished");
            }
        });

        ready(Ok(())).boxed()
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Runs invocations according to their run mode.
#[derive(Debug, Clone)]
pub struct Executor {
    tracker: TaskTracker,
    logger: Logger,
}

impl Executor {
    /// Failures of detached invocations are reported to `logger`.
    pub fn new(logger: Logger) -> Self {
        let tracker = TaskTracker::new();
        // Closed for good: `wait` then resolves whenever nothing is running,
        // and spawning still works.
        tracker.close();
        Self { tracker, logger }
    }

    /// Executes `invocation`.
    ///
    /// `Blocking` waits for the body and reports its failure; `Detached`
    /// returns `Success` immediately. `Default` is treated as `Blocking`,
    /// though registered handlers never carry it.
    pub async fn execute(&self, mode: RunMode, invocation: Invocation) -> ExecutionResult {
        let outcome = match mode {
            RunMode::Detached => {
                DetachLayer::new(self.tracker.clone(), self.logger.clone())
                    .layer(InlineService)
                    .oneshot(invocation)
                    .await
            }
            RunMode::Blocking | RunMode::Default => InlineService.oneshot(invocation).await,
        };
        match outcome {
            Ok(()) => ExecutionResult::Success,
            Err(err) => ExecutionResult::ExecutionFailure(err),
        }
    }

    /// Number of detached invocations still running.
    pub fn detached_count(&self) -> usize {
        self.tracker.len()
    }

    /// Waits until no detached invocation is running.
    pub async fn wait_detached(&self) {
        self.tracker.wait().await;
    }
}
