//! Framework construction errors.
//!
//! Dispatch itself never fails: every dispatch failure is reported as an
//! [`ExecutionResult`](herald_core::ExecutionResult). These errors cover
//! misconfiguration detected while a dispatcher is being built.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FrameworkError {
    /// The registry-wide default run mode must be a concrete mode.
    #[error("cannot set the default run mode to Default")]
    DefaultRunMode,

    /// The confidence weight must lie in `[0, 1)`.
    #[error("confidence weight must be in [0, 1), got {0}")]
    ConfidenceWeight(f64),
}

pub type FrameworkResult<T> = Result<T, FrameworkError>;
