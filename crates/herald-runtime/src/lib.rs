//! Herald Runtime - configuration, logging and the message loop.
//!
//! This crate provides:
//! - Layered configuration (`HeraldConfig`, `ConfigLoader`)
//! - Global `tracing` subscriber setup (`LoggingBuilder`)
//! - `HeraldRuntime`, which builds a dispatcher from configuration and feeds
//!   it inbound messages
//!
//! ```ignore
//! use herald_runtime::HeraldRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (tx, rx) = tokio::sync::mpsc::channel(64);
//!     spawn_gateway(tx);
//!
//!     HeraldRuntime::builder()
//!         .source(&herald_framework::ModuleScan::all())
//!         .build()?
//!         .run(rx)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, DispatchConfig, HandlerOverride, HeraldConfig,
    LoggingConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{HeraldRuntime, ResultCallback, RuntimeBuilder};

pub use tracing;
pub use tracing_subscriber;

/// Logging macros, re-exported for handler crates.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
