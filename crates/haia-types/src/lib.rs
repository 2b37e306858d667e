//! Shared types for the HAIA memory subsystem.
//!
//! This crate defines the domain model shared by every memory component:
//! memories with temporal validity and supersession links, conversation
//! transcripts, and derived type clusters. It carries no I/O and no
//! component logic.

pub mod cluster;
pub mod conversation;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use cluster::TypeCluster;
pub use conversation::{Conversation, ConversationId, Role, Utterance};
pub use memory::{Memory, MemoryId, MemoryTier};

/// Timestamp type used for all temporal attributes.
pub type Timestamp = DateTime<Utc>;

/// The current time.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Generate a fresh random UUID.
pub(crate) fn new_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Error returned when parsing a typed id from a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdParseError(pub String);

impl std::fmt::Display for IdParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid id: {}", self.0)
    }
}

impl std::error::Error for IdParseError {}
