//! # Herald
//!
//! Prefix- and mention-triggered command and listener dispatch for chat bots.
//!
//! ## Overview
//!
//! Every inbound message is checked for a trigger (a literal prefix or a
//! mention of the bot). Addressed messages whose first word names a command
//! are resolved to the best-scoring command overload; everything else fans
//! out to every listener concurrently.
//!
//! ```text
//! ┌─────────┐     ┌────────────┐  addressed  ┌──────────────────────────────┐
//! │ Runtime │────▶│ Dispatcher │────────────▶│ preconditions → score → run  │ one command
//! └─────────┘     └────────────┘             └──────────────────────────────┘
//!                       │        otherwise   ┌──────────────────────────────┐
//!                       └───────────────────▶│ listener (own task)  × N     │ every listener
//!                                            └──────────────────────────────┘
//! ```
//!
//! - **Runtime**: configuration, logging and the message loop
//! - **Dispatcher**: trigger resolution, routing and result reporting
//! - **Registry**: the live set of commands and listeners
//! - **Handlers**: closures or types built from the dependency pool
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use herald::prelude::*;
//!
//! fn ping() -> Registration {
//!     Registration::command_fn("ping", |_ctx, _args| async { HandlerResult::Ok(()) })
//!         .summary("Replies with pong")
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = HeraldRuntime::builder().handler(ping()).build()?;
//!     let outcome = runtime.handle(InboundMessage::new(1, ConversationScope::Direct, "!ping")).await;
//!     assert!(outcome.is_success());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: load `herald.toml` (default)
//! - `yaml-config`: load `herald.yaml`
//! - `json-log`: JSON log lines

pub use herald_core as core;
pub use herald_framework as framework;
pub use herald_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use herald::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use herald_runtime::{HeraldConfig, HeraldRuntime};

    // Dispatch
    pub use herald_framework::{DispatchOutcome, Dispatcher, Route};

    // Handler declaration
    pub use herald_framework::{
        Command, Component, Dep, Factory, Listener, ParamKind, ParameterSpec, Registration,
        RunMode, async_trait,
    };

    // Preconditions
    pub use herald_framework::{Precondition, PreconditionGate, PreconditionLayers, check};

    // Core types
    pub use herald_core::prelude::*;
}
