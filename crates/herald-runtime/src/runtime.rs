//! Runtime orchestration: configuration in, a running dispatcher out.
//!
//! ```rust,ignore
//! use herald_runtime::HeraldRuntime;
//!
//! let runtime = HeraldRuntime::builder()
//!     .config_file("config/herald.toml")
//!     .handler(ping())
//!     .on_result(|message, outcome| println!("{}: {:?}", message.content, outcome.route))
//!     .build()?;
//!
//! let (tx, rx) = tokio::sync::mpsc::channel(64);
//! // hand `tx` to whatever produces messages
//! runtime.run(rx).await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use herald_core::{InboundMessage, LogSink, ServiceStore};
use herald_framework::{
    ArgumentParser, DispatchOutcome, Dispatcher, DispatcherBuilder, HandlerSource,
    PreconditionLayers, Registration,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, HandlerOverride, HeraldConfig, validate_config};
use crate::error::RuntimeResult;
use crate::logging;

/// Called with every message and its outcome once dispatch returns.
pub type ResultCallback = Arc<dyn Fn(&InboundMessage, &DispatchOutcome) + Send + Sync>;

/// A configured [`Dispatcher`] plus the loop that feeds it.
///
/// Cheap to clone; clones share the dispatcher.
#[derive(Clone)]
pub struct HeraldRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    config: HeraldConfig,
    dispatcher: Dispatcher,
    on_result: Option<ResultCallback>,
}

impl HeraldRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &HeraldConfig {
        &self.inner.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Dispatches one message and reports the outcome to the result callback.
    pub async fn handle(&self, message: InboundMessage) -> DispatchOutcome {
        match &self.inner.on_result {
            Some(callback) => {
                let outcome = self.inner.dispatcher.dispatch(message.clone()).await;
                callback(&message, &outcome);
                outcome
            }
            None => self.inner.dispatcher.dispatch(message).await,
        }
    }

    /// Runs until `messages` closes or Ctrl-C is received.
    pub async fn run(&self, messages: mpsc::Receiver<InboundMessage>) -> RuntimeResult<()> {
        info!("Herald runtime is now running. Press Ctrl+C to stop.");
        self.run_until(messages, signal::ctrl_c()).await
    }

    /// Runs until `messages` closes or `shutdown` resolves.
    ///
    /// Each message is handled on its own task. Before returning, in-flight
    /// dispatches are awaited and then detached invocations are waited for.
    pub async fn run_until<F>(
        &self,
        mut messages: mpsc::Receiver<InboundMessage>,
        shutdown: F,
    ) -> RuntimeResult<()>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        let mut in_flight = JoinSet::new();
        tokio::pin!(shutdown);

        let stopped = loop {
            tokio::select! {
                received = messages.recv() => match received {
                    Some(message) => {
                        let runtime = self.clone();
                        in_flight.spawn(async move {
                            runtime.handle(message).await;
                        });
                    }
                    None => {
                        debug!("Message channel closed");
                        break Ok(());
                    }
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_join(joined);
                }
                signalled = &mut shutdown => {
                    info!("Shutdown requested");
                    break signalled;
                }
            }
        };

        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
        }
        self.shutdown().await;
        stopped.map_err(Into::into)
    }

    /// Waits for every detached invocation to finish.
    pub async fn shutdown(&self) {
        let pending = self.inner.dispatcher.executor().detached_count();
        if pending > 0 {
            info!(pending, "Waiting for detached handlers");
        }
        self.inner.dispatcher.wait_detached().await;
        info!("Runtime stopped");
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        error!(error = %err, "Dispatch task failed");
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`HeraldRuntime`].
///
/// Configuration comes from a [`ConfigLoader`] unless one is supplied with
/// [`config`](Self::config). Handler overrides from the `handlers` section
/// are applied to every registration by name.
pub struct RuntimeBuilder {
    loader: ConfigLoader,
    config: Option<HeraldConfig>,
    dispatcher: DispatcherBuilder,
    registrations: Vec<Registration>,
    on_result: Option<ResultCallback>,
    init_logging: bool,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            loader: ConfigLoader::new(),
            config: None,
            dispatcher: Dispatcher::builder(),
            registrations: Vec::new(),
            on_result: None,
            init_logging: true,
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.loader = self.loader.without_env();
        self
    }

    /// Merges `config` over the loaded sources.
    pub fn merge(mut self, config: HeraldConfig) -> Self {
        self.loader = self.loader.merge(config);
        self
    }

    /// Uses `config` as is; no files or environment variables are read.
    pub fn config(mut self, config: HeraldConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Leaves the global `tracing` subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn handler(mut self, registration: Registration) -> Self {
        self.registrations.push(registration);
        self
    }

    pub fn source(mut self, source: &dyn HandlerSource) -> Self {
        self.registrations.extend(source.registrations());
        self
    }

    pub fn services(mut self, services: Arc<dyn ServiceStore>) -> Self {
        self.dispatcher = self.dispatcher.services(services);
        self
    }

    pub fn layers(mut self, layers: PreconditionLayers) -> Self {
        self.dispatcher = self.dispatcher.layers(layers);
        self
    }

    pub fn parser(mut self, parser: Arc<dyn ArgumentParser>) -> Self {
        self.dispatcher = self.dispatcher.parser(parser);
        self
    }

    /// Replaces the default [`TracingSink`](herald_core::TracingSink).
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.dispatcher = self.dispatcher.sink(sink);
        self
    }

    pub fn on_result<F>(mut self, callback: F) -> Self
    where
        F: Fn(&InboundMessage, &DispatchOutcome) + Send + Sync + 'static,
    {
        self.on_result = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> RuntimeResult<HeraldRuntime> {
        let config = match self.config {
            Some(config) => {
                validate_config(&config)?;
                config
            }
            None => self.loader.load()?,
        };

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let settings = &config.dispatch;
        let mut dispatcher = self
            .dispatcher
            .prefix(settings.prefix.clone())
            .default_run_mode(settings.default_run_mode)
            .log_level(settings.log_level)
            .confidence_weight(settings.confidence_weight)
            .deny_bots(settings.deny_bots);
        if let Some(id) = settings.mention_id {
            dispatcher = dispatcher.mention(id);
        }
        for registration in self.registrations {
            if let Some(registration) = apply_override(registration, &config.handlers) {
                dispatcher = dispatcher.handler(registration);
            }
        }
        let dispatcher = dispatcher.build()?;

        info!(
            prefix = %config.dispatch.prefix,
            mention = config.dispatch.mention_id.is_some(),
            handlers = dispatcher.registry().len(),
            "Runtime initialized from configuration"
        );

        Ok(HeraldRuntime {
            inner: Arc::new(RuntimeInner {
                config,
                dispatcher,
                on_result: self.on_result,
            }),
        })
    }
}

/// Applies the configured override for `registration`, or drops it when disabled.
fn apply_override(
    registration: Registration,
    overrides: &HashMap<String, HandlerOverride>,
) -> Option<Registration> {
    let Some(settings) = overrides.get(registration.name()) else {
        return Some(registration);
    };
    if !settings.enabled {
        warn!(handler = registration.name(), "Handler disabled by configuration");
        return None;
    }

    let mut registration = registration;
    if let Some(priority) = settings.priority {
        registration = registration.priority(priority);
    }
    if let Some(mode) = settings.run_mode {
        registration = registration.run_mode(mode);
    }
    Some(registration)
}
