//! Dispatcher log events and the filtering [`Logger`].
//!
//! The dispatcher reports through a [`LogSink`] rather than straight to
//! `tracing`, so callers can capture events per dispatch or route them
//! somewhere else entirely. [`TracingSink`] forwards to `tracing`.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Event severity. Lower is more severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Critical = 0,
    Error = 1,
    Warning = 2,
    #[default]
    Info = 3,
    Verbose = 4,
    Debug = 5,
}

impl LogSeverity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Verbose => "verbose",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured log event.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub severity: LogSeverity,
    /// The emitting component, e.g. `"Listeners"`.
    pub source: Cow<'static, str>,
    pub message: String,
    pub error: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl LogEvent {
    pub fn new(
        severity: LogSeverity,
        source: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            source: source.into(),
            message: message.into(),
            error: None,
        }
    }

    /// Attaches an error (builder pattern).
    pub fn with_error(mut self, error: Arc<dyn std::error::Error + Send + Sync>) -> Self {
        self.error = Some(error);
        self
    }
}

/// Destination for log events.
pub trait LogSink: Send + Sync {
    fn emit(&self, event: &LogEvent);
}

/// Severity-filtering front end over a [`LogSink`].
///
/// An event is forwarded only when `event.severity <= minimum`.
#[derive(Clone)]
pub struct Logger {
    minimum: LogSeverity,
    sink: Arc<dyn LogSink>,
    capture: Option<Arc<Mutex<Vec<LogEvent>>>>,
}

impl Logger {
    pub fn new(minimum: LogSeverity, sink: Arc<dyn LogSink>) -> Self {
        Self {
            minimum,
            sink,
            capture: None,
        }
    }

    /// A logger that drops everything.
    pub fn disabled() -> Self {
        Self::new(LogSeverity::Critical, Arc::new(NullSink))
    }

    pub fn minimum(&self) -> LogSeverity {
        self.minimum
    }

    /// Returns `true` if events at `severity` would be forwarded.
    pub fn enabled(&self, severity: LogSeverity) -> bool {
        severity <= self.minimum
    }

    /// A copy of this logger that also records every forwarded event.
    ///
    /// The returned [`LogCapture`] collects events from the copy and from any
    /// clone of it.
    pub fn capturing(&self) -> (Logger, LogCapture) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let logger = Self {
            minimum: self.minimum,
            sink: Arc::clone(&self.sink),
            capture: Some(Arc::clone(&buffer)),
        };
        (logger, LogCapture(buffer))
    }

    /// Forwards `event` if it passes the severity filter.
    pub fn log(&self, event: LogEvent) {
        if !self.enabled(event.severity) {
            return;
        }
        self.sink.emit(&event);
        if let Some(capture) = &self.capture {
            capture.lock().push(event);
        }
    }

    pub fn critical(&self, source: &'static str, message: impl Into<String>) {
        self.log(LogEvent::new(LogSeverity::Critical, source, message));
    }

    pub fn error(&self, source: &'static str, message: impl Into<String>) {
        self.log(LogEvent::new(LogSeverity::Error, source, message));
    }

    /// Logs at `Error` with an attached error value.
    pub fn error_with(
        &self,
        source: &'static str,
        message: impl Into<String>,
        error: Arc<dyn std::error::Error + Send + Sync>,
    ) {
        self.log(LogEvent::new(LogSeverity::Error, source, message).with_error(error));
    }

    pub fn warn(&self, source: &'static str, message: impl Into<String>) {
        self.log(LogEvent::new(LogSeverity::Warning, source, message));
    }

    pub fn info(&self, source: &'static str, message: impl Into<String>) {
        self.log(LogEvent::new(LogSeverity::Info, source, message));
    }

    pub fn verbose(&self, source: &'static str, message: impl Into<String>) {
        self.log(LogEvent::new(LogSeverity::Verbose, source, message));
    }

    pub fn debug(&self, source: &'static str, message: impl Into<String>) {
        self.log(LogEvent::new(LogSeverity::Debug, source, message));
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("minimum", &self.minimum)
            .field("capturing", &self.capture.is_some())
            .finish_non_exhaustive()
    }
}

/// Events recorded by a capturing [`Logger`].
#[derive(Debug, Clone)]
pub struct LogCapture(Arc<Mutex<Vec<LogEvent>>>);

impl LogCapture {
    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<LogEvent> {
        std::mem::take(&mut *self.0.lock())
    }
}

// ─── Sinks ──────────────────────────────────────────────────────────────────

/// Forwards events to `tracing`, mapping severities onto tracing levels.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

macro_rules! forward {
    ($level:ident, $event:expr) => {
        match &$event.error {
            Some(err) => tracing::$level!(
                source = %$event.source,
                error = %err,
                "{}",
                $event.message
            ),
            None => tracing::$level!(source = %$event.source, "{}", $event.message),
        }
    };
}

impl LogSink for TracingSink {
    fn emit(&self, event: &LogEvent) {
        match event.severity {
            LogSeverity::Critical | LogSeverity::Error => forward!(error, event),
            LogSeverity::Warning => forward!(warn, event),
            LogSeverity::Info => forward!(info, event),
            LogSeverity::Verbose => forward!(debug, event),
            LogSeverity::Debug => forward!(trace, event),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the recorded events.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }

    /// Removes and returns the recorded events.
    pub fn take(&self) -> Vec<LogEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, event: &LogEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn emit(&self, _event: &LogEvent) {}
}
