//! Conversation sessions and transcript records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{IdParseError, Timestamp, new_uuid, now};

/// Unique identifier for a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(new_uuid())
    }

    /// Parse an id from its string form.
    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| IdParseError(s.to_string()))
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Speaker role in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// String form used when rendering transcripts into prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// A single role-tagged utterance in a transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub role: Role,
    pub text: String,
}

impl Utterance {
    /// A user utterance.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// An assistant utterance.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// An extraction session grouping the memories it produced.
///
/// Created when extraction begins; immutable once closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub started_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
    pub message_count: usize,
}

impl Conversation {
    /// Open a new conversation starting now.
    pub fn new() -> Self {
        Self {
            id: ConversationId::new(),
            started_at: now(),
            ended_at: None,
            message_count: 0,
        }
    }

    /// Open a conversation at a specific start time.
    pub fn started_at(started_at: Timestamp) -> Self {
        Self {
            id: ConversationId::new(),
            started_at,
            ended_at: None,
            message_count: 0,
        }
    }

    /// Close the conversation with its final message count.
    pub fn close(mut self, ended_at: Timestamp, message_count: usize) -> Self {
        self.ended_at = Some(ended_at);
        self.message_count = message_count;
        self
    }

    /// Whether the conversation has been closed.
    pub fn is_closed(&self) -> bool {
        self.ended_at.is_some()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_lifecycle() {
        let conv = Conversation::new();
        assert!(!conv.is_closed());
        assert_eq!(conv.message_count, 0);

        let ended = now();
        let closed = conv.close(ended, 12);
        assert!(closed.is_closed());
        assert_eq!(closed.ended_at, Some(ended));
        assert_eq!(closed.message_count, 12);
    }

    #[test]
    fn test_utterance_constructors() {
        let u = Utterance::user("I have 3 Proxmox nodes");
        assert_eq!(u.role, Role::User);
        let a = Utterance::assistant("Noted.");
        assert_eq!(a.role, Role::Assistant);
    }

    #[test]
    fn test_role_as_str() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.as_str(), "assistant");
        assert_eq!(Role::System.as_str(), "system");
    }
}
