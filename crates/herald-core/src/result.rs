//! The outcome of one handler invocation.

use crate::error::{ExecutionError, InjectError, ParseError, PreconditionFailure};

/// The outcome of a single handler within a dispatch.
///
/// Detached handlers always report `Success`: their eventual failures only
/// reach the log sink.
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    Success,
    PreconditionFailure(PreconditionFailure),
    ParseFailure(ParseError),
    ExecutionFailure(ExecutionError),
}

impl ExecutionResult {
    /// A precondition failure with the given reason.
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::PreconditionFailure(PreconditionFailure::new(reason))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Human-readable failure reason, `None` on success.
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Success => None,
            Self::PreconditionFailure(f) => Some(f.reason.clone()),
            Self::ParseFailure(e) => Some(e.reason.clone()),
            Self::ExecutionFailure(e) => Some(e.to_string()),
        }
    }
}

impl From<PreconditionFailure> for ExecutionResult {
    fn from(failure: PreconditionFailure) -> Self {
        Self::PreconditionFailure(failure)
    }
}

impl From<ParseError> for ExecutionResult {
    fn from(err: ParseError) -> Self {
        Self::ParseFailure(err)
    }
}

impl From<ExecutionError> for ExecutionResult {
    fn from(err: ExecutionError) -> Self {
        Self::ExecutionFailure(err)
    }
}

impl From<InjectError> for ExecutionResult {
    fn from(err: InjectError) -> Self {
        Self::ExecutionFailure(ExecutionError::Dependency(err))
    }
}
