//! Configuration for the Herald runtime.
//!
//! Settings are layered with figment: built-in defaults, then config files,
//! then `HERALD_*` environment variables. See [`ConfigLoader`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    DispatchConfig, HandlerOverride, HeraldConfig, LogFormat, LogLevel, LogOutput,
    LoggingConfig, SpanEventConfig,
};
pub use validation::validate_config;
