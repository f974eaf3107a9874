//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use herald_core::LogSeverity;
use herald_framework::{DEFAULT_CONFIDENCE_WEIGHT, RunMode};
use serde::{Deserialize, Serialize};

/// Root configuration structure.
///
/// ```toml
/// [dispatch]
/// prefix = "?"
/// mention_id = 1234
/// default_run_mode = "detached"
///
/// [logging]
/// level = "debug"
///
/// [handlers.ping]
/// priority = 5
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeraldConfig {
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
    /// Per-handler overrides keyed by handler name.
    pub handlers: HashMap<String, HandlerOverride>,
}

// =============================================================================
// Dispatch
// =============================================================================

/// Settings for the dispatcher itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Literal prefix that addresses the bot. Must not be empty.
    pub prefix: String,

    /// The bot's own user id; enables the mention trigger when set.
    pub mention_id: Option<u64>,

    /// Run mode for handlers that do not choose one.
    pub default_run_mode: RunMode,

    /// Minimum severity passed to the dispatcher's log sink.
    pub log_level: LogSeverity,

    /// Weight of parse confidence in candidate scoring, in `[0, 1)`.
    pub confidence_weight: f64,

    /// Rejects commands whose author is a bot.
    pub deny_bots: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            mention_id: None,
            default_run_mode: RunMode::Blocking,
            log_level: LogSeverity::Info,
            confidence_weight: DEFAULT_CONFIDENCE_WEIGHT,
            deny_bots: true,
        }
    }
}

/// Registration-time overrides for a single handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerOverride {
    /// When `false` the handler is not registered at all.
    pub enabled: bool,
    pub priority: Option<i32>,
    pub run_mode: Option<RunMode>,
}

impl Default for HandlerOverride {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: None,
            run_mode: None,
        }
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Level for the global `tracing` subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Requires [`LoggingConfig::file_path`].
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

/// Settings for the global `tracing` subscriber.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    pub file_path: Option<PathBuf>,
    pub span_events: SpanEventConfig,
    pub thread_ids: bool,
    /// Include file and line of the emitting call site.
    pub file_location: bool,
    /// Per-target levels, e.g. `herald_framework = "debug"`.
    pub filters: HashMap<String, LogLevel>,
}
