//! Memory graph store boundary.
//!
//! The graph database is an external collaborator; this module defines
//! the async query interface the core talks to. Mutations are targeted,
//! id-keyed property updates, so concurrent updates to different
//! memories are safe by construction, and access recording is an atomic
//! store-level merge rather than read-modify-write in application code.
//!
//! [`InMemoryGraph`] is a full reference implementation over process
//! memory, used for tests and single-node development.

mod mem;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use haia_types::{Conversation, ConversationId, Memory, MemoryId, MemoryTier, Timestamp};

use crate::error::Result;

pub use mem::InMemoryGraph;

/// Relationship type linking a superseding memory to the one it replaced.
pub const REL_SUPERSEDES: &str = "SUPERSEDES";

/// Relationship type linking a conversation to the memories it produced.
pub const REL_CONTAINS: &str = "CONTAINS";

// ─────────────────────────────────────────────────────────────────────────────
// Query Types
// ─────────────────────────────────────────────────────────────────────────────

/// A memory id with a strategy-local relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub id: MemoryId,
    pub score: f32,
}

impl ScoredId {
    pub fn new(id: MemoryId, score: f32) -> Self {
        Self { id, score }
    }
}

/// Shared filter applied by the search entry points.
///
/// A memory passes when its type is in `memory_types` (or no type filter
/// is set), it was valid at `as_of` (or no temporal filter is set), and
/// its tier is not `Archived` unless `include_archived` is set.
#[derive(Debug, Clone, Default)]
pub struct RetrievalFilter {
    /// Acceptable type labels. `None` = all types.
    pub memory_types: Option<Vec<String>>,
    /// Point in time the memory must be valid at. `None` = no temporal
    /// filter.
    pub as_of: Option<Timestamp>,
    /// Whether archived-tier memories are included.
    pub include_archived: bool,
}

impl RetrievalFilter {
    /// Filter that accepts everything except archived memories.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to the given type labels.
    pub fn with_types(mut self, memory_types: Vec<String>) -> Self {
        self.memory_types = Some(memory_types);
        self
    }

    /// Restrict to memories valid at the given time.
    pub fn with_as_of(mut self, as_of: Timestamp) -> Self {
        self.as_of = Some(as_of);
        self
    }

    /// Include archived-tier memories.
    pub fn with_archived(mut self) -> Self {
        self.include_archived = true;
        self
    }

    /// Whether a memory passes this filter.
    pub fn matches(&self, memory: &Memory) -> bool {
        if !self.include_archived && memory.tier == MemoryTier::Archived {
            return false;
        }
        if let Some(types) = &self.memory_types {
            if !types.iter().any(|t| t == &memory.memory_type) {
                return false;
            }
        }
        if let Some(as_of) = self.as_of {
            if !memory.is_valid_at(as_of) {
                return false;
            }
        }
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryGraph Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Async query interface to the memory graph store.
///
/// All mutations are keyed by memory id and touch only the named
/// properties. Relationship types are free-form strings: the SUPERSEDES
/// and CONTAINS links use the constants above, while LLM-inferred
/// relations carry whatever label inference produced.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow sharing across
/// tasks.
#[async_trait]
pub trait MemoryGraph: Send + Sync {
    /// Insert a new memory node.
    async fn insert_memory(&self, memory: &Memory) -> Result<()>;

    /// Get a memory by its unique id.
    ///
    /// Returns `Ok(None)` if the memory does not exist.
    async fn get_memory(&self, id: MemoryId) -> Result<Option<Memory>>;

    /// Record an access: atomically increment `access_count` and advance
    /// `last_accessed` to `at` if later.
    async fn record_access(&self, id: MemoryId, at: Timestamp) -> Result<()>;

    /// Move a memory to a lifecycle tier.
    async fn set_tier(&self, id: MemoryId, tier: MemoryTier) -> Result<()>;

    /// Close a memory's validity window and point it at its replacement.
    async fn close_validity(
        &self,
        id: MemoryId,
        valid_until: Timestamp,
        superseded_by: MemoryId,
    ) -> Result<()>;

    /// Record which older memory a newer one replaced.
    async fn set_supersedes(&self, id: MemoryId, old_id: MemoryId) -> Result<()>;

    /// Attach an embedding vector with its version tag.
    async fn set_embedding(
        &self,
        id: MemoryId,
        embedding: &[f32],
        version: &str,
        at: Timestamp,
    ) -> Result<()>;

    /// Create a typed relationship between two memories.
    async fn link(
        &self,
        from: MemoryId,
        to: MemoryId,
        rel_type: &str,
        properties: &[(String, String)],
    ) -> Result<()>;

    /// Insert a conversation node.
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()>;

    /// Close a conversation with its final message count.
    async fn close_conversation(
        &self,
        id: ConversationId,
        ended_at: Timestamp,
        message_count: usize,
    ) -> Result<()>;

    /// Link a memory to its originating conversation. External backends
    /// label this edge [`REL_CONTAINS`].
    async fn attach_to_conversation(
        &self,
        conversation: ConversationId,
        memory: MemoryId,
    ) -> Result<()>;

    /// All currently-valid (open validity window) memories with the given
    /// type label. Conflict-candidate lookup.
    async fn active_by_type(&self, memory_type: &str) -> Result<Vec<Memory>>;

    /// Memories in a tier, optionally only those learned before a cutoff.
    /// Consolidation scan.
    async fn list_by_tier(
        &self,
        tier: MemoryTier,
        learned_before: Option<Timestamp>,
    ) -> Result<Vec<Memory>>;

    /// All distinct `memory_type` values currently in the store.
    async fn distinct_types(&self) -> Result<Vec<String>>;

    /// Nearest memories by embedding similarity, best first.
    async fn vector_search(
        &self,
        embedding: &[f32],
        limit: usize,
        filter: &RetrievalFilter,
    ) -> Result<Vec<ScoredId>>;

    /// Full-text/keyword match over memory content, best first.
    async fn text_search(
        &self,
        query: &str,
        limit: usize,
        filter: &RetrievalFilter,
    ) -> Result<Vec<ScoredId>>;

    /// Memories reachable from the seeds within `max_hops` relationship
    /// edges, optionally restricted to one relationship type. Seeds are
    /// not included in the result.
    async fn neighborhood(
        &self,
        seeds: &[MemoryId],
        max_hops: usize,
        rel_type: Option<&str>,
    ) -> Result<Vec<MemoryId>>;

    /// Memories flagged as not yet embedded, oldest first. Backfill queue.
    async fn missing_embeddings(&self, limit: usize) -> Result<Vec<Memory>>;

    /// Total number of memory nodes.
    async fn count_memories(&self) -> Result<usize>;
}

/// A store handle that can be shared across tasks.
pub type SharedGraph = Arc<dyn MemoryGraph>;

// ─────────────────────────────────────────────────────────────────────────────
// Write Retry
// ─────────────────────────────────────────────────────────────────────────────

/// Execute a store write with bounded exponential backoff.
///
/// Retries only on [`crate::MemoryError::StoreUnavailable`]; everything
/// else surfaces immediately. After the retry budget is exhausted the
/// last error is returned so the caller never silently drops data it
/// believes it has stored.
pub async fn with_store_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    operation: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = None;
    let mut backoff = initial_backoff;

    for attempt in 0..=max_retries {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_transient() {
                    return Err(e);
                }

                last_error = Some(e);

                if attempt < max_retries {
                    tracing::warn!(
                        operation = operation,
                        attempt = attempt + 1,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Store write failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    Err(last_error.unwrap())
}
