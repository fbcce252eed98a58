//! Conversation transcripts extracted from HTML captures.

use serde::{Deserialize, Serialize};

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who sent the message ("user" or "bot" in practice)
    pub author: String,
    /// Message text
    pub message: String,
}

impl Turn {
    /// Turn by `author`.
    pub fn new(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            message: message.into(),
        }
    }

    /// Turn sent by the user.
    pub fn user(message: impl Into<String>) -> Self {
        Self::new("user", message)
    }

    /// Turn sent by the bot.
    pub fn bot(message: impl Into<String>) -> Self {
        Self::new("bot", message)
    }
}

/// Ordered list of turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript(Vec<Turn>);

impl Transcript {
    /// Wrap `turns` in order.
    pub fn new(turns: Vec<Turn>) -> Self {
        Self(turns)
    }

    /// Turns in conversation order.
    pub fn turns(&self) -> &[Turn] {
        &self.0
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// An empty transcript counts as a failed extraction.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|turn| turn.message.trim().is_empty())
    }
}

impl From<Vec<Turn>> for Transcript {
    fn from(turns: Vec<Turn>) -> Self {
        Self(turns)
    }
}

impl FromIterator<Turn> for Transcript {
    fn from_iter<I: IntoIterator<Item = Turn>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
