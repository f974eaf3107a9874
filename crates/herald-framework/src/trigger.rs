//! Trigger resolution: is a message addressed to the bot, and where does
//! its payload start?
//!
//! The literal prefix is tried first (case-insensitively), then a mention of
//! the bot in either of its surface forms, `<@id>` and `<@!id>`. The first
//! match wins.

use herald_core::{TriggerKind, TriggerMatch, UserId};

#[derive(Debug, Clone)]
pub struct TriggerResolver {
    prefix: String,
    mention: Option<UserId>,
}

impl TriggerResolver {
    /// A resolver for a literal prefix. An empty prefix never matches.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            mention: None,
        }
    }

    /// Also accepts messages that start with a mention of `id` (builder pattern).
    pub fn with_mention(mut self, id: UserId) -> Self {
        self.mention = Some(id);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn mention(&self) -> Option<UserId> {
        self.mention
    }

    /// Returns the trigger match for `content`, or `None` if the message is
    /// not addressed to the bot. Offsets are byte offsets into `content`.
    pub fn resolve(&self, content: &str) -> Option<TriggerMatch> {
        self.match_prefix(content)
            .map(|offset| TriggerMatch {
                kind: TriggerKind::Prefix,
                offset,
            })
            .or_else(|| {
                self.match_mention(content).map(|offset| TriggerMatch {
                    kind: TriggerKind::Mention,
                    offset,
                })
            })
    }

    fn match_prefix(&self, content: &str) -> Option<usize> {
        if self.prefix.is_empty() {
            return None;
        }
        strip_prefix_ignore_case(content, &self.prefix)
    }

    fn match_mention(&self, content: &str) -> Option<usize> {
        let id = self.mention?;
        let trimmed = content.trim_start();
        let leading = content.len() - trimmed.len();
        [id.mention(), id.nickname_mention()]
            .into_iter()
            .find(|form| trimmed.starts_with(form.as_str()))
            .map(|form| leading + form.len())
    }
}

/// Unicode case-insensitive equality, folding through `char::to_lowercase`.
pub(crate) fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

/// Byte length of the part of `text` that case-insensitively equals `prefix`.
fn strip_prefix_ignore_case(text: &str, prefix: &str) -> Option<usize> {
    let mut chars = text.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    Some(chars.next().map_or(text.len(), |(index, _)| index))
}
