//! Immutable handler metadata.
//!
//! A [`HandlerDefinition`] is created once, when a
//! [`Registration`](crate::handler::Registration) is added to the
//! [`Registry`](crate::registry::Registry), and is never mutated afterwards.
//! In particular its run mode is resolved from [`RunMode::Default`] to a
//! concrete mode at that point.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use herald_core::{ContextFlags, UserId};
use serde::{Deserialize, Serialize};

use crate::precondition::Precondition;
use crate::trigger::eq_ignore_case;

/// How a handler is executed relative to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Use the registry-wide default.
    #[default]
    Default,
    /// Run inline; the caller waits and sees every failure.
    Blocking,
    /// Spawn and return immediately; failures only reach the log sink.
    Detached,
}

impl RunMode {
    /// Replaces `Default` with `fallback`.
    pub fn resolve(self, fallback: RunMode) -> RunMode {
        match self {
            RunMode::Default => fallback,
            mode => mode,
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::Default => "default",
            RunMode::Blocking => "blocking",
            RunMode::Detached => "detached",
        })
    }
}

/// The shape of one declared command parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    Text,
    Integer,
    Float,
    Bool,
    /// A user mention (`<@id>`, `<@!id>`) or a bare id.
    User,
    /// One of a fixed set of words; unambiguous prefixes are accepted.
    Choice(Vec<String>),
    /// Everything left in the input. Only valid as the last parameter.
    Remainder,
}

/// A declared command parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    pub optional: bool,
}

impl ParameterSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: true,
        }
    }
}

/// Whether a handler is a structured command or a free-form listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Command,
    Listener,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandlerKind::Command => "command",
            HandlerKind::Listener => "listener",
        })
    }
}

/// Registry identity of a handler. Names may collide; ids never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Metadata describing one registered handler.
#[derive(Clone)]
pub struct HandlerDefinition {
    pub(crate) id: HandlerId,
    pub(crate) name: String,
    pub(crate) aliases: Vec<String>,
    pub(crate) kind: HandlerKind,
    pub(crate) priority: i32,
    pub(crate) parameters: Vec<ParameterSpec>,
    pub(crate) contexts: Option<ContextFlags>,
    pub(crate) allowed_users: Option<Vec<UserId>>,
    pub(crate) run_mode: RunMode,
    pub(crate) summary: Option<String>,
    pub(crate) remarks: Option<String>,
    pub(crate) preconditions: Vec<Arc<dyn Precondition>>,
}

impl HandlerDefinition {
    pub(crate) fn new(name: String, kind: HandlerKind) -> Self {
        Self {
            id: HandlerId::next(),
            name,
            aliases: Vec::new(),
            kind,
            priority: 0,
            parameters: Vec::new(),
            contexts: None,
            allowed_users: None,
            run_mode: RunMode::Default,
            summary: None,
            remarks: None,
            preconditions: Vec::new(),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// Higher priority wins selection and tie-breaks.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// Scopes the handler may run in; `None` means every scope.
    pub fn contexts(&self) -> Option<ContextFlags> {
        self.contexts
    }

    /// Identities allowed to trigger the handler; `None` means everyone.
    pub fn allowed_users(&self) -> Option<&[UserId]> {
        self.allowed_users.as_deref()
    }

    /// The concrete run mode. Never `Default` once registered.
    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn remarks(&self) -> Option<&str> {
        self.remarks.as_deref()
    }

    /// Custom checks, evaluated after the context and identity checks.
    pub fn preconditions(&self) -> &[Arc<dyn Precondition>] {
        &self.preconditions
    }

    /// Case-insensitive match against the name and every alias.
    pub fn matches_name(&self, name: &str) -> bool {
        eq_ignore_case(&self.name, name) || self.aliases.iter().any(|a| eq_ignore_case(a, name))
    }
}

impl fmt::Debug for HandlerDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("parameters", &self.parameters)
            .field("contexts", &self.contexts)
            .field("allowed_users", &self.allowed_users)
            .field("run_mode", &self.run_mode)
            .field("preconditions", &self.preconditions.len())
            .finish_non_exhaustive()
    }
}
