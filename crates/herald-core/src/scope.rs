//! Conversation scopes and the flag set handlers use to restrict them.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// The kind of conversation a message arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationScope {
    /// A channel inside a guild (server).
    Guild,
    /// A one-to-one direct message.
    Direct,
    /// A multi-user group conversation outside any guild.
    Group,
}

impl ConversationScope {
    const fn bit(self) -> u8 {
        match self {
            Self::Guild => 0b001,
            Self::Direct => 0b010,
            Self::Group => 0b100,
        }
    }
}

impl fmt::Display for ConversationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Guild => "Guild",
            Self::Direct => "Direct",
            Self::Group => "Group",
        })
    }
}

/// A set of [`ConversationScope`]s, combined with `|`.
///
/// An empty set matches nothing; handlers that accept every scope either use
/// [`ContextFlags::ALL`] or leave their context requirement unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextFlags(u8);

impl ContextFlags {
    /// No scope at all.
    pub const NONE: Self = Self(0);
    /// Guild channels.
    pub const GUILD: Self = Self(ConversationScope::Guild.bit());
    /// Direct messages.
    pub const DIRECT: Self = Self(ConversationScope::Direct.bit());
    /// Group conversations.
    pub const GROUP: Self = Self(ConversationScope::Group.bit());
    /// Every scope.
    pub const ALL: Self = Self(0b111);

    /// Returns `true` if `scope` is a member of this set.
    pub const fn contains(self, scope: ConversationScope) -> bool {
        self.0 & scope.bit() != 0
    }

    /// Returns `true` if the set is empty.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates the member scopes in declaration order.
    pub fn scopes(self) -> impl Iterator<Item = ConversationScope> {
        [
            ConversationScope::Guild,
            ConversationScope::Direct,
            ConversationScope::Group,
        ]
        .into_iter()
        .filter(move |scope| self.contains(*scope))
    }
}

impl From<ConversationScope> for ContextFlags {
    fn from(scope: ConversationScope) -> Self {
        Self(scope.bit())
    }
}

impl BitOr for ContextFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ContextFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ContextFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("None");
        }
        let names: Vec<String> = self.scopes().map(|s| s.to_string()).collect();
        f.write_str(&names.join(", "))
    }
}
