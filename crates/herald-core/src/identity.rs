//! Platform identities.
//!
//! Identities are opaque 64-bit snowflakes. They are kept as newtypes so a
//! channel id can never be passed where a user id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The identity of a message author (or of the bot itself, for mentions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// Returns the raw id.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The plain mention token for this user, `<@id>`.
    pub fn mention(self) -> String {
        format!("<@{}>", self.0)
    }

    /// The nickname mention token for this user, `<@!id>`.
    pub fn nickname_mention(self) -> String {
        format!("<@!{}>", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity of the channel a message arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl From<u64> for ChannelId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
