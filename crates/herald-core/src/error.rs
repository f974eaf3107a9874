//! Error taxonomy for dispatch.
//!
//! Every failure that can reach a caller is one of these types; each maps onto
//! exactly one [`ExecutionResult`](crate::ExecutionResult) variant.

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error returned by handler bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Return type of listener and command bodies.
pub type HandlerResult = Result<(), BoxError>;

/// Result type for handler construction.
pub type InjectResult<T> = Result<T, InjectError>;

/// Failure to construct a handler instance from a dependency pool.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InjectError {
    /// A required dependency was not present anywhere in the pool.
    #[error("failed to create {target}: required dependency {dependency} could not be found")]
    DependencyMissing {
        target: &'static str,
        dependency: &'static str,
    },

    /// The handler type declares no constructor at all.
    #[error("no constructors were found for {target}")]
    NoConstructor { target: &'static str },

    /// Every declared constructor had at least one missing dependency.
    #[error("failed to create {target}: none of its {attempted} constructors could be satisfied")]
    NoViableConstructor {
        target: &'static str,
        attempted: usize,
    },
}

/// Which stage of command parsing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    /// No command carries the requested name.
    UnknownCommand,
    /// Too few or too many argument tokens.
    BadArgCount,
    /// A token could not be read as its parameter's kind.
    ParseFailed,
    /// More than one interpretation survived and none could be preferred.
    MultipleMatches,
}

/// A command's arguments could not be read from the message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub reason: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    pub fn unknown_command(name: &str) -> Self {
        Self::new(ParseErrorKind::UnknownCommand, format!("Unknown command: {name}"))
    }

    pub fn bad_arg_count(reason: impl Into<String>) -> Self {
        Self::new(ParseErrorKind::BadArgCount, reason)
    }

    pub fn parse_failed(reason: impl Into<String>) -> Self {
        Self::new(ParseErrorKind::ParseFailed, reason)
    }
}

/// A precondition rejected the message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct PreconditionFailure {
    pub reason: String,
}

impl PreconditionFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A handler could not be built, failed, or panicked.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    /// Construction from the dependency pool failed.
    #[error(transparent)]
    Dependency(#[from] InjectError),

    /// The handler body returned an error.
    #[error("{0}")]
    Handler(Arc<dyn std::error::Error + Send + Sync>),

    /// The handler body panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl ExecutionError {
    /// Wraps an error returned by a handler body.
    pub fn handler(err: BoxError) -> Self {
        Self::Handler(Arc::from(err))
    }

    /// Builds an error from a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_owned()
        };
        Self::Panicked(message)
    }

    /// The error as a shareable trait object, for attaching to log events.
    pub fn as_shared(&self) -> Arc<dyn std::error::Error + Send + Sync> {
        match self {
            Self::Handler(inner) => Arc::clone(inner),
            other => Arc::new(other.clone()),
        }
    }
}
