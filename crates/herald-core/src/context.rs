//! Per-message dispatch context.

use std::sync::Arc;

use crate::identity::UserId;
use crate::message::InboundMessage;
use crate::scope::ConversationScope;
use crate::services::DependencyPool;

/// How a message was recognised as addressed to the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// The message starts with the configured literal prefix.
    Prefix,
    /// The message starts with a mention of the bot.
    Mention,
}

/// A successful trigger match: what matched, and where the payload begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerMatch {
    /// Which trigger form matched.
    pub kind: TriggerKind,
    /// Byte offset into the message content where the payload starts.
    pub offset: usize,
}

/// Everything a precondition, parser or handler may know about one dispatch.
///
/// Created once per inbound message and dropped when dispatch completes
/// (detached invocations keep their own `Arc` alive until they finish).
#[derive(Debug, Clone)]
pub struct DispatchContext {
    message: Arc<InboundMessage>,
    trigger: Option<TriggerMatch>,
    pool: DependencyPool,
}

impl DispatchContext {
    /// Creates a context for `message`.
    pub fn new(
        message: Arc<InboundMessage>,
        trigger: Option<TriggerMatch>,
        pool: DependencyPool,
    ) -> Self {
        Self {
            message,
            trigger,
            pool,
        }
    }

    /// The message being dispatched.
    pub fn message(&self) -> &InboundMessage {
        &self.message
    }

    /// A clone of the shared message handle.
    pub fn message_arc(&self) -> Arc<InboundMessage> {
        Arc::clone(&self.message)
    }

    /// The originating identity.
    pub fn author(&self) -> UserId {
        self.message.author
    }

    /// The conversation scope the message arrived in.
    pub fn scope(&self) -> ConversationScope {
        self.message.scope
    }

    /// Raw message text.
    pub fn content(&self) -> &str {
        &self.message.content
    }

    /// The trigger match, if the message was addressed to the bot.
    pub fn trigger(&self) -> Option<TriggerMatch> {
        self.trigger
    }

    /// Returns `true` if the message was addressed to the bot.
    pub fn is_addressed(&self) -> bool {
        self.trigger.is_some()
    }

    /// The text after the trigger, or the whole content when not addressed.
    pub fn payload(&self) -> &str {
        let offset = self.trigger.map_or(0, |t| t.offset);
        self.message.content.get(offset..).unwrap_or_default()
    }

    /// The dependency pool handlers of this dispatch are constructed from.
    pub fn pool(&self) -> &DependencyPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_after_offset() {
        let message = Arc::new(InboundMessage::new(1, ConversationScope::Guild, "!ping now"));
        let ctx = DispatchContext::new(
            message,
            Some(TriggerMatch {
                kind: TriggerKind::Prefix,
                offset: 1,
            }),
            DependencyPool::empty(),
        );
        assert_eq!(ctx.payload(), "ping now");
        assert!(ctx.is_addressed());
    }

    #[test]
    fn test_payload_unaddressed() {
        let message = Arc::new(InboundMessage::new(1, ConversationScope::Direct, "hello"));
        let ctx = DispatchContext::new(message, None, DependencyPool::empty());
        assert_eq!(ctx.payload(), "hello");
        assert!(!ctx.is_addressed());
    }
}
