//! # Herald Core
//!
//! Foundation types shared by every layer of the Herald dispatcher.
//!
//! This crate has no opinion about *how* messages are routed; it only
//! describes the data that flows through routing:
//!
//! - **Identities and scopes**: [`UserId`], [`ChannelId`], [`ConversationScope`]
//!   and the [`ContextFlags`] set handlers use to declare where they may run
//! - **Messages and context**: [`InboundMessage`] and the per-dispatch
//!   [`DispatchContext`]
//! - **Dependencies**: the keyed [`ServiceStore`] and the fallback-chained
//!   [`DependencyPool`] handlers are constructed from
//! - **Arguments**: parser output ([`ParseOutcome`], [`ParsedArgs`], [`ArgValue`])
//! - **Results and errors**: [`ExecutionResult`] and the error taxonomy
//! - **Log events**: [`LogEvent`], [`LogSink`] and the filtering [`Logger`]
//!
//! ```text
//! ┌──────────────┐     ┌────────────┐     ┌──────────────────┐
//! │InboundMessage│────▶│ Dispatcher │────▶│ ExecutionResult  │
//! └──────────────┘     │ (framework)│────▶│ LogEvent (sink)  │
//!                      └────────────┘     └──────────────────┘
//! ```

pub mod args;
pub mod context;
pub mod error;
pub mod identity;
pub mod log;
pub mod message;
pub mod result;
pub mod scope;
pub mod services;

pub use args::{ArgValue, ParseOutcome, ParsedArgs, SlotParse, SlotValue};
pub use context::{DispatchContext, TriggerKind, TriggerMatch};
pub use error::{
    BoxError, ExecutionError, HandlerResult, InjectError, InjectResult, ParseError,
    ParseErrorKind, PreconditionFailure,
};
pub use identity::{ChannelId, UserId};
pub use log::{
    LogCapture, LogEvent, LogSeverity, LogSink, Logger, MemorySink, NullSink, TracingSink,
};
pub use message::InboundMessage;
pub use result::ExecutionResult;
pub use scope::{ContextFlags, ConversationScope};
pub use services::{DependencyPool, EmptyServices, ServiceArc, ServiceMap, ServiceStore};

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        ArgValue, ContextFlags, ConversationScope, DependencyPool, DispatchContext,
        ExecutionResult, HandlerResult, InboundMessage, LogSeverity, ParsedArgs, ServiceMap,
        UserId,
    };
}
