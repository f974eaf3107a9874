//! Inbound messages as seen by the dispatcher.

use crate::identity::{ChannelId, UserId};
use crate::scope::ConversationScope;

/// A message delivered to the dispatcher by the (external) platform layer.
///
/// The dispatcher never mutates a message; it is shared behind an `Arc` for
/// the lifetime of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Who sent the message.
    pub author: UserId,
    /// Whether the author is an automated account.
    pub author_is_bot: bool,
    /// Where the message was posted.
    pub channel: ChannelId,
    /// The kind of conversation the channel belongs to.
    pub scope: ConversationScope,
    /// Raw message text.
    pub content: String,
}

impl InboundMessage {
    /// Creates a message from a human author.
    pub fn new(
        author: impl Into<UserId>,
        scope: ConversationScope,
        content: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            author_is_bot: false,
            channel: ChannelId(0),
            scope,
            content: content.into(),
        }
    }

    /// Sets the channel (builder pattern).
    pub fn in_channel(mut self, channel: impl Into<ChannelId>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Marks the author as an automated account (builder pattern).
    pub fn from_bot(mut self) -> Self {
        self.author_is_bot = true;
        self
    }
}
