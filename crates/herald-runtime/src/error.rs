//! Runtime error types.

use herald_framework::FrameworkError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while assembling or running a [`HeraldRuntime`](crate::HeraldRuntime).
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The dispatcher rejected its settings.
    #[error("Dispatcher error: {0}")]
    Dispatcher(#[from] FrameworkError),

    /// A signal handler could not be installed.
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
