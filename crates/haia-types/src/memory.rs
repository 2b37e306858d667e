//! Memory entries with temporal validity and lifecycle metadata.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation::ConversationId;
use crate::{IdParseError, Timestamp, new_uuid, now};

// ─────────────────────────────────────────────────────────────────────────────
// Memory Id
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for a memory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
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

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle Tier
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle stage of a memory.
///
/// New memories start in `ShortTerm`. Consolidation promotes high-priority
/// memories to `LongTerm` and demotes cold long-term memories to `Archived`.
/// Archived memories stay queryable but are excluded from retrieval by
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    ShortTerm,
    LongTerm,
    Archived,
}

impl MemoryTier {
    /// String form used in store property maps and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShortTerm => "short_term",
            Self::LongTerm => "long_term",
            Self::Archived => "archived",
        }
    }

    /// Parse from the string form. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "short_term" => Some(Self::ShortTerm),
            "long_term" => Some(Self::LongTerm),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory
// ─────────────────────────────────────────────────────────────────────────────

/// A single structured fact, preference, or decision extracted from a
/// conversation.
///
/// `memory_type` is a free-form string: types emerge from extraction and
/// are never validated against a fixed vocabulary. Temporal semantics:
/// `valid_from`/`valid_until` describe when the fact is true in the user's
/// timeline, `learned_at` records when the system ingested it. A memory is
/// never deleted on contradiction; its validity window is closed and a
/// supersession link points at the replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: MemoryId,
    /// Free-form type label (e.g. "infrastructure", "preference.editor").
    pub memory_type: String,
    /// Human-readable summary of the fact.
    pub content: String,
    /// Extraction certainty in [0, 1].
    pub confidence: f32,
    /// When the fact became true in the user's timeline.
    pub valid_from: Timestamp,
    /// When the fact stopped being true. `None` = still current.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<Timestamp>,
    /// When the system ingested this memory.
    pub learned_at: Timestamp,
    /// The older memory this one replaced, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<MemoryId>,
    /// The newer memory that replaced this one, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<MemoryId>,
    /// Content embedding, populated at ingest or by the backfill job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Whether `embedding` is populated and usable for vector search.
    pub has_embedding: bool,
    /// Embedder name/version the vector came from, for staleness checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_version: Option<String>,
    /// When the embedding was computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded_at: Option<Timestamp>,
    pub tier: MemoryTier,
    pub access_count: u32,
    pub last_accessed: Timestamp,
    /// The extraction session this memory came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_conversation_id: Option<ConversationId>,
}

impl Memory {
    /// Create a new short-term memory learned now, valid from now.
    pub fn new(memory_type: impl Into<String>, content: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: MemoryId::new(),
            memory_type: memory_type.into(),
            content: content.into(),
            confidence: 1.0,
            valid_from: ts,
            valid_until: None,
            learned_at: ts,
            supersedes: None,
            superseded_by: None,
            embedding: None,
            has_embedding: false,
            embedding_version: None,
            embedded_at: None,
            tier: MemoryTier::ShortTerm,
            access_count: 0,
            last_accessed: ts,
            source_conversation_id: None,
        }
    }

    /// Set the extraction confidence.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Set when the fact became true.
    pub fn with_valid_from(mut self, valid_from: Timestamp) -> Self {
        self.valid_from = valid_from;
        self
    }

    /// Close the validity window.
    pub fn with_valid_until(mut self, valid_until: Timestamp) -> Self {
        self.valid_until = Some(valid_until);
        self
    }

    /// Set the ingestion timestamp (also aligns `last_accessed`).
    pub fn with_learned_at(mut self, learned_at: Timestamp) -> Self {
        self.learned_at = learned_at;
        self.last_accessed = learned_at;
        self
    }

    /// Attach the originating conversation.
    pub fn with_conversation(mut self, conversation_id: ConversationId) -> Self {
        self.source_conversation_id = Some(conversation_id);
        self
    }

    /// Set the lifecycle tier.
    pub fn with_tier(mut self, tier: MemoryTier) -> Self {
        self.tier = tier;
        self
    }

    /// Attach an embedding vector computed by the named embedder.
    pub fn with_embedding(mut self, embedding: Vec<f32>, version: impl Into<String>) -> Self {
        self.embedding = Some(embedding);
        self.has_embedding = true;
        self.embedding_version = Some(version.into());
        self.embedded_at = Some(now());
        self
    }

    /// Whether this memory is still current (validity window open).
    pub fn is_current(&self) -> bool {
        self.valid_until.is_none()
    }

    /// Whether the fact was true at `as_of`.
    ///
    /// A memory is valid at a point in time when
    /// `valid_from <= as_of < valid_until` (open-ended when `valid_until`
    /// is `None`).
    pub fn is_valid_at(&self, as_of: Timestamp) -> bool {
        if as_of < self.valid_from {
            return false;
        }
        match self.valid_until {
            Some(until) => as_of < until,
            None => true,
        }
    }

    /// Whether this memory's validity interval intersects another's.
    ///
    /// Intervals are `[valid_from, valid_until)` with `None` treated as
    /// unbounded.
    pub fn overlaps(&self, other: &Memory) -> bool {
        let self_ends_before_other = match self.valid_until {
            Some(until) => until <= other.valid_from,
            None => false,
        };
        let other_ends_before_self = match other.valid_until {
            Some(until) => until <= self.valid_from,
            None => false,
        };
        !(self_ends_before_other || other_ends_before_self)
    }
}
