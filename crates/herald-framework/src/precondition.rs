//! Preconditions: ordered gates that must pass before a handler runs.
//!
//! Checks are always evaluated **sequentially** and stop at the first
//! failure; no check after a failing one is ever invoked.
//!
//! There are two scopes of checks:
//!
//! - registry-wide layers ([`PreconditionLayers`]) that apply to every
//!   addressed message, every command or every listener pass
//! - definition-scoped checks ([`evaluate_definition`]): the required
//!   context, the identity allow-list, then the handler's own custom checks

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use herald_core::{ContextFlags, DispatchContext, PreconditionFailure, UserId};

use crate::definition::HandlerDefinition;

/// A single check over a dispatch context.
///
/// `definition` is the handler being considered, or `None` for
/// registry-wide layers.
#[async_trait]
pub trait Precondition: Send + Sync {
    async fn check(
        &self,
        ctx: &Arc<DispatchContext>,
        definition: Option<&HandlerDefinition>,
    ) -> Result<(), PreconditionFailure>;
}

// ============================================================================
// Closure checks
// ============================================================================

/// A synchronous predicate check. See [`check`].
pub struct FnCheck<F> {
    reason: String,
    predicate: F,
}

/// Wraps a synchronous predicate; `reason` is reported when it returns `false`.
pub fn check<F>(reason: impl Into<String>, predicate: F) -> FnCheck<F>
where
    F: Fn(&DispatchContext) -> bool + Send + Sync + 'static,
{
    FnCheck {
        reason: reason.into(),
        predicate,
    }
}

#[async_trait]
impl<F> Precondition for FnCheck<F>
where
    F: Fn(&DispatchContext) -> bool + Send + Sync + 'static,
{
    async fn check(
        &self,
        ctx: &Arc<DispatchContext>,
        _definition: Option<&HandlerDefinition>,
    ) -> Result<(), PreconditionFailure> {
        if (self.predicate)(ctx.as_ref()) {
            Ok(())
        } else {
            Err(PreconditionFailure::new(self.reason.clone()))
        }
    }
}

/// An asynchronous predicate check. See [`check_async`].
pub struct AsyncFnCheck<F> {
    reason: String,
    predicate: F,
}

/// Wraps an asynchronous predicate, e.g. a remote permission lookup.
pub fn check_async<F, Fut>(reason: impl Into<String>, predicate: F) -> AsyncFnCheck<F>
where
    F: Fn(Arc<DispatchContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    AsyncFnCheck {
        reason: reason.into(),
        predicate,
    }
}

#[async_trait]
impl<F, Fut> Precondition for AsyncFnCheck<F>
where
    F: Fn(Arc<DispatchContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    async fn check(
        &self,
        ctx: &Arc<DispatchContext>,
        _definition: Option<&HandlerDefinition>,
    ) -> Result<(), PreconditionFailure> {
        if (self.predicate)(Arc::clone(ctx)).await {
            Ok(())
        } else {
            Err(PreconditionFailure::new(self.reason.clone()))
        }
    }
}

// ============================================================================
// Built-in checks
// ============================================================================

/// Passes when the message scope is in the flag set. `None` passes everything.
#[derive(Debug, Clone, Copy)]
pub struct RequiredContext(pub Option<ContextFlags>);

#[async_trait]
impl Precondition for RequiredContext {
    async fn check(
        &self,
        ctx: &Arc<DispatchContext>,
        _definition: Option<&HandlerDefinition>,
    ) -> Result<(), PreconditionFailure> {
        match self.0 {
            Some(flags) if !flags.contains(ctx.scope()) => Err(PreconditionFailure::new(format!(
                "Invalid context for command; accepted contexts: {flags}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Passes when no allow-list is set or the author is on it.
#[derive(Debug, Clone)]
pub struct RequiredUsers(pub Option<Vec<UserId>>);

#[async_trait]
impl Precondition for RequiredUsers {
    async fn check(
        &self,
        ctx: &Arc<DispatchContext>,
        _definition: Option<&HandlerDefinition>,
    ) -> Result<(), PreconditionFailure> {
        match &self.0 {
            Some(users) if !users.contains(&ctx.author()) => {
                let ids: Vec<String> = users.iter().map(ToString::to_string).collect();
                Err(PreconditionFailure::new(format!(
                    "Command can only be run by users with these ids: {}",
                    ids.join(", ")
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Rejects messages from automated accounts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyBots;

#[async_trait]
impl Precondition for DenyBots {
    async fn check(
        &self,
        ctx: &Arc<DispatchContext>,
        definition: Option<&HandlerDefinition>,
    ) -> Result<(), PreconditionFailure> {
        if !ctx.message().author_is_bot {
            return Ok(());
        }
        let name = definition.map_or("this", HandlerDefinition::name);
        Err(PreconditionFailure::new(format!(
            "Bots cannot perform {name} command."
        )))
    }
}

// ============================================================================
// Gates
// ============================================================================

async fn run_sequence(
    checks: &[Arc<dyn Precondition>],
    ctx: &Arc<DispatchContext>,
    definition: Option<&HandlerDefinition>,
) -> Result<(), PreconditionFailure> {
    for check in checks {
        check.check(ctx, definition).await?;
    }
    Ok(())
}

/// An ordered list of checks evaluated with short-circuiting.
#[derive(Clone, Default)]
pub struct PreconditionGate {
    checks: Vec<Arc<dyn Precondition>>,
}

impl PreconditionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, check: impl Precondition + 'static) {
        self.checks.push(Arc::new(check));
    }

    /// Appends a check (builder pattern).
    pub fn with(mut self, check: impl Precondition + 'static) -> Self {
        self.push(check);
        self
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Runs the checks in order and returns the first failure.
    pub async fn evaluate(
        &self,
        ctx: &Arc<DispatchContext>,
        definition: Option<&HandlerDefinition>,
    ) -> Result<(), PreconditionFailure> {
        run_sequence(&self.checks, ctx, definition).await
    }
}

impl std::fmt::Debug for PreconditionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreconditionGate")
            .field("checks", &self.checks.len())
            .finish()
    }
}

/// Runs a definition's own checks: context, identity, then custom checks.
pub async fn evaluate_definition(
    definition: &HandlerDefinition,
    ctx: &Arc<DispatchContext>,
) -> Result<(), PreconditionFailure> {
    RequiredContext(definition.contexts())
        .check(ctx, Some(definition))
        .await?;
    RequiredUsers(definition.allowed_users().map(<[UserId]>::to_vec))
        .check(ctx, Some(definition))
        .await?;
    run_sequence(definition.preconditions(), ctx, Some(definition)).await
}

/// Which registry-wide layer rejected a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalLayer {
    Addressed,
    Command,
    Message,
}

impl GlobalLayer {
    /// The reason reported to the caller when this layer fails.
    pub fn reason(self) -> &'static str {
        match self {
            GlobalLayer::Addressed => "Global preconditions failed.",
            GlobalLayer::Command => "Global command preconditions failed.",
            GlobalLayer::Message => "Global message preconditions failed.",
        }
    }
}

/// The three registry-wide precondition layers.
#[derive(Debug, Clone, Default)]
pub struct PreconditionLayers {
    /// Every message that matched a trigger.
    pub addressed: PreconditionGate,
    /// Every structured-command resolution.
    pub command: PreconditionGate,
    /// Every listener pass, evaluated once per message.
    pub message: PreconditionGate,
}

impl PreconditionLayers {
    pub fn gate(&self, layer: GlobalLayer) -> &PreconditionGate {
        match layer {
            GlobalLayer::Addressed => &self.addressed,
            GlobalLayer::Command => &self.command,
            GlobalLayer::Message => &self.message,
        }
    }

    /// Evaluates one layer.
    ///
    /// On failure the layer's fixed reason is returned together with the
    /// failing check's own reason.
    pub async fn evaluate(
        &self,
        layer: GlobalLayer,
        ctx: &Arc<DispatchContext>,
    ) -> Result<(), (PreconditionFailure, PreconditionFailure)> {
        self.gate(layer)
            .evaluate(ctx, None)
            .await
            .map_err(|inner| (PreconditionFailure::new(layer.reason()), inner))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::definition::HandlerKind;
    use herald_core::{ConversationScope, DependencyPool, InboundMessage};

    fn ctx(message: InboundMessage) -> Arc<DispatchContext> {
        Arc::new(DispatchContext::new(
            Arc::new(message),
            None,
            DependencyPool::empty(),
        ))
    }

    fn guild_message() -> Arc<DispatchContext> {
        ctx(InboundMessage::new(7, ConversationScope::Guild, "!hi"))
    }

    #[tokio::test]
    async fn test_gate_short_circuits() {
        let tally = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&tally);
        let gate = PreconditionGate::new()
            .with(check("first", |_| false))
            .with(check("second", move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
                true
            }));

        let failure = gate.evaluate(&guild_message(), None).await.unwrap_err();
        assert_eq!(failure.reason, "first");
        assert_eq!(tally.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_async_check() {
        let gate = PreconditionGate::new()
            .with(check_async("remote says no", |ctx| async move {
                ctx.author() == UserId(7)
            }));
        assert!(gate.evaluate(&guild_message(), None).await.is_ok());

        let other = ctx(InboundMessage::new(8, ConversationScope::Guild, "!hi"));
        assert_eq!(
            gate.evaluate(&other, None).await.unwrap_err().reason,
            "remote says no"
        );
    }

    #[tokio::test]
    async fn test_required_context() {
        let dm = ctx(InboundMessage::new(7, ConversationScope::Direct, "hi"));
        let open = RequiredContext(None);
        assert!(open.check(&dm, None).await.is_ok());

        let guild_only = RequiredContext(Some(ContextFlags::GUILD | ContextFlags::GROUP));
        assert!(guild_only.check(&guild_message(), None).await.is_ok());
        assert_eq!(
            guild_only.check(&dm, None).await.unwrap_err().reason,
            "Invalid context for command; accepted contexts: Guild, Group"
        );
    }

    #[tokio::test]
    async fn test_required_users() {
        let allowed = RequiredUsers(Some(vec![UserId(1), UserId(2)]));
        assert_eq!(
            allowed.check(&guild_message(), None).await.unwrap_err().reason,
            "Command can only be run by users with these ids: 1, 2"
        );
        assert!(RequiredUsers(None).check(&guild_message(), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_deny_bots_names_command() {
        let def = HandlerDefinition::new("ban".into(), HandlerKind::Command);
        let bot = ctx(InboundMessage::new(7, ConversationScope::Guild, "!ban").from_bot());
        assert_eq!(
            DenyBots.check(&bot, Some(&def)).await.unwrap_err().reason,
            "Bots cannot perform ban command."
        );
        assert!(DenyBots.check(&guild_message(), Some(&def)).await.is_ok());
    }

    #[tokio::test]
    async fn test_definition_order_context_first() {
        let tally = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&tally);
        let mut def = HandlerDefinition::new("admin".into(), HandlerKind::Command);
        def.contexts = Some(ContextFlags::DIRECT);
        def.allowed_users = Some(vec![UserId(1)]);
        def.preconditions.push(Arc::new(check("custom", move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            true
        })));

        let failure = evaluate_definition(&def, &guild_message()).await.unwrap_err();
        assert!(failure.reason.starts_with("Invalid context"));
        assert_eq!(tally.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_layers_report_fixed_reason() {
        let layers = PreconditionLayers {
            command: PreconditionGate::new().with(check("maintenance", |_| false)),
            ..Default::default()
        };
        assert!(layers.evaluate(GlobalLayer::Addressed, &guild_message()).await.is_ok());

        let (outer, inner) = layers
            .evaluate(GlobalLayer::Command, &guild_message())
            .await
            .unwrap_err();
        assert_eq!(outer.reason, "Global command preconditions failed.");
        assert_eq!(inner.reason, "maintenance");
    }
}
