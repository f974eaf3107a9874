//! # Herald Framework
//!
//! The resolution-and-dispatch core of Herald.
//!
//! This layer provides:
//! - Handler traits ([`Listener`], [`Command`]) and the [`Registration`] builder
//! - Constructor-fallback dependency injection ([`Factory`], [`Dep`])
//! - The mutable, snapshot-read [`Registry`] and the link-time handler table
//! - Trigger resolution, precondition gates and candidate scoring
//! - Blocking and detached execution as tower services
//! - The [`Dispatcher`], itself a `tower::Service<InboundMessage>`
//!
//! ```text
//! InboundMessage
//!     │
//!     ▼
//! TriggerResolver ──addressed──▶ command? ──▶ CandidateScorer ──▶ Factory ──▶ Executor
//!     │                               │
//!     └──────────── listeners ◀───────┘ (fan-out, one task per listener)
//! ```

pub mod definition;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod handler;
pub mod inject;
pub mod parser;
pub mod precondition;
pub mod registry;
pub mod scoring;
pub mod trigger;

pub use async_trait::async_trait;
pub use linkme;

pub use definition::{HandlerDefinition, HandlerId, HandlerKind, ParamKind, ParameterSpec, RunMode};
pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherBuilder, Route};
pub use error::{FrameworkError, FrameworkResult};
pub use executor::{DetachLayer, DetachService, Executor, InlineService, Invocation};
pub use handler::{Command, HandlerEntry, Listener, Registration};
pub use inject::{Component, Constructor, Dep, Factory, FieldInjector, FromPool, MissingDependency};
pub use parser::{ArgumentParser, TokenParser};
pub use precondition::{
    DenyBots, GlobalLayer, Precondition, PreconditionGate, PreconditionLayers, RequiredContext,
    RequiredUsers, check, check_async,
};
pub use registry::{HANDLER_TABLE, HandlerSource, ModuleScan, Registry, StaticHandler};
pub use scoring::{CandidateScorer, DEFAULT_CONFIDENCE_WEIGHT, Resolution, composite_score};
pub use trigger::TriggerResolver;
