//! Handler traits and the registration builder.
//!
//! A handler is either a **listener** (runs on every message that passes its
//! preconditions) or a **command** (runs when addressed by name with
//! arguments that parse). Both are constructed fresh for each invocation by
//! a [`Factory`], then called once.
//!
//! ```rust,ignore
//! struct Echo {
//!     ctx: Option<Arc<DispatchContext>>,
//! }
//!
//! impl Component for Echo {
//!     fn bind_context(&mut self, ctx: Arc<DispatchContext>) {
//!         self.ctx = Some(ctx);
//!     }
//! }
//!
//! #[async_trait]
//! impl Command for Echo {
//!     async fn execute(&mut self, args: ParsedArgs) -> HandlerResult {
//!         println!("{}", args.text(0).unwrap_or_default());
//!         Ok(())
//!     }
//! }
//!
//! let registration = Registration::command("echo", Factory::new().constructor(|| Echo { ctx: None }))
//!     .param(ParameterSpec::required("text", ParamKind::Remainder))
//!     .summary("Repeats its input");
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use herald_core::{ContextFlags, DispatchContext, HandlerResult, InjectResult, ParsedArgs, UserId};

use crate::definition::{HandlerDefinition, HandlerKind, ParameterSpec, RunMode};
use crate::inject::{Component, Factory};
use crate::precondition::Precondition;

/// A free-form handler that may run on any message.
#[async_trait]
pub trait Listener: Component {
    async fn on_message(&mut self) -> HandlerResult;
}

/// A structured handler invoked by name with parsed arguments.
#[async_trait]
pub trait Command: Component {
    async fn execute(&mut self, args: ParsedArgs) -> HandlerResult;
}

/// Builds a handler instance and returns the future that runs its body.
///
/// Construction happens before the future is returned, so dependency
/// failures surface to the caller even for detached handlers.
pub(crate) type InvokeFn = Arc<
    dyn Fn(Arc<DispatchContext>, ParsedArgs) -> InjectResult<BoxFuture<'static, HandlerResult>>
        + Send
        + Sync,
>;

// ============================================================================
// Registration
// ============================================================================

/// A handler plus its metadata, ready to be added to a registry.
pub struct Registration {
    definition: HandlerDefinition,
    invoke: InvokeFn,
}

impl Registration {
    fn new(name: impl Into<String>, kind: HandlerKind, invoke: InvokeFn) -> Self {
        Self {
            definition: HandlerDefinition::new(name.into(), kind),
            invoke,
        }
    }

    /// Registers a [`Listener`] type.
    pub fn listener<H: Listener>(name: impl Into<String>, factory: Factory<H>) -> Self {
        let invoke: InvokeFn = Arc::new(move |ctx: Arc<DispatchContext>, _args: ParsedArgs| {
            let mut handler = factory.instantiate(&ctx)?;
            Ok(async move { handler.on_message().await }.boxed())
        });
        Self::new(name, HandlerKind::Listener, invoke)
    }

    /// Registers a [`Command`] type.
    pub fn command<H: Command>(name: impl Into<String>, factory: Factory<H>) -> Self {
        let invoke: InvokeFn = Arc::new(move |ctx: Arc<DispatchContext>, args: ParsedArgs| {
            let mut handler = factory.instantiate(&ctx)?;
            Ok(async move { handler.execute(args).await }.boxed())
        });
        Self::new(name, HandlerKind::Command, invoke)
    }

    /// Registers a closure as a listener. Dependencies come from `ctx.pool()`.
    pub fn listener_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<DispatchContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let invoke: InvokeFn =
            Arc::new(move |ctx: Arc<DispatchContext>, _args: ParsedArgs| Ok(f(ctx).boxed()));
        Self::new(name, HandlerKind::Listener, invoke)
    }

    /// Registers a closure as a command.
    pub fn command_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<DispatchContext>, ParsedArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let invoke: InvokeFn = Arc::new(move |ctx: Arc<DispatchContext>, args: ParsedArgs| {
            Ok(f(ctx, args).boxed())
        });
        Self::new(name, HandlerKind::Command, invoke)
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn kind(&self) -> HandlerKind {
        self.definition.kind
    }

    /// The metadata as it will be registered (run mode not yet resolved).
    pub fn definition(&self) -> &HandlerDefinition {
        &self.definition
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.definition.priority = priority;
        self
    }

    /// Adds an alternative command name.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.definition.aliases.push(alias.into());
        self
    }

    /// Declares the next command parameter.
    pub fn param(mut self, spec: ParameterSpec) -> Self {
        self.definition.parameters.push(spec);
        self
    }

    /// Restricts the conversation scopes the handler may run in.
    pub fn contexts(mut self, contexts: ContextFlags) -> Self {
        self.definition.contexts = Some(contexts);
        self
    }

    /// Restricts the handler to the given identities.
    pub fn allow_users<I, U>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<UserId>,
    {
        self.definition.allowed_users = Some(users.into_iter().map(Into::into).collect());
        self
    }

    pub fn run_mode(mut self, mode: RunMode) -> Self {
        self.definition.run_mode = mode;
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.definition.summary = Some(summary.into());
        self
    }

    pub fn remarks(mut self, remarks: impl Into<String>) -> Self {
        self.definition.remarks = Some(remarks.into());
        self
    }

    /// Adds a custom check, evaluated after the context and identity checks.
    pub fn precondition(mut self, check: impl Precondition + 'static) -> Self {
        self.definition.preconditions.push(Arc::new(check));
        self
    }

    pub(crate) fn precondition_arc(mut self, check: Arc<dyn Precondition>) -> Self {
        self.definition.preconditions.push(check);
        self
    }

    /// Freezes the registration with a concrete run mode.
    pub(crate) fn into_entry(mut self, default_mode: RunMode) -> HandlerEntry {
        self.definition.run_mode = self.definition.run_mode.resolve(default_mode);
        HandlerEntry {
            definition: self.definition,
            invoke: self.invoke,
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// HandlerEntry
// ============================================================================

/// A registered handler: frozen metadata plus its erased invoker.
pub struct HandlerEntry {
    definition: HandlerDefinition,
    invoke: InvokeFn,
}

impl HandlerEntry {
    pub fn definition(&self) -> &HandlerDefinition {
        &self.definition
    }

    /// Constructs the handler and returns the future running its body.
    pub fn instantiate(
        &self,
        ctx: Arc<DispatchContext>,
        args: ParsedArgs,
    ) -> InjectResult<BoxFuture<'static, HandlerResult>> {
        (self.invoke)(ctx, args)
    }
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}
