//! Temporal conflict resolution between memories.
//!
//! When a newly extracted memory contradicts an older one describing the
//! same topic, the old memory is never deleted. Its validity window is
//! closed at the new memory's `learned_at` and a SUPERSEDES link records
//! the chain, so both stay retrievable for point-in-time queries.

use tracing::{debug, info, warn};

use haia_llm::{SharedEmbedder, cosine_similarity};
use haia_types::{Memory, MemoryId};

use crate::config::ConflictConfig;
use crate::error::Result;
use crate::store::{REL_SUPERSEDES, SharedGraph};

// ─────────────────────────────────────────────────────────────────────────────
// Decision Function
// ─────────────────────────────────────────────────────────────────────────────

/// Whether a new memory contradicts an existing one.
///
/// A contradiction requires all three:
/// 1. the same free-form `memory_type` label,
/// 2. intersecting validity intervals,
/// 3. semantic similarity at or above `threshold`.
///
/// Pure function: no store, no clock.
pub fn is_contradiction(new: &Memory, old: &Memory, similarity: f32, threshold: f32) -> bool {
    new.memory_type == old.memory_type && new.overlaps(old) && similarity >= threshold
}

// ─────────────────────────────────────────────────────────────────────────────
// Conflict Resolver
// ─────────────────────────────────────────────────────────────────────────────

/// Detects contradictions and applies supersession links.
pub struct ConflictResolver {
    store: SharedGraph,
    embedder: SharedEmbedder,
    config: ConflictConfig,
}

impl ConflictResolver {
    /// Create a new resolver.
    pub fn new(store: SharedGraph, embedder: SharedEmbedder, config: ConflictConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Resolve conflicts for a newly extracted memory.
    ///
    /// Fetches currently-valid memories with the same type, decides which
    /// are contradicted, and supersedes them: the old memory's
    /// `valid_until` becomes the new memory's `learned_at`, both
    /// supersession pointers are set, and a SUPERSEDES relation runs
    /// new→old. Returns the ids of superseded memories.
    pub async fn resolve(&self, new: &Memory) -> Result<Vec<MemoryId>> {
        let candidates = self.store.active_by_type(&new.memory_type).await?;

        let new_embedding = match self.embedding_for(new).await {
            Some(embedding) => embedding,
            None => {
                // No positive similarity evidence, so nothing is superseded
                warn!(
                    memory_id = %new.id,
                    "Skipping conflict resolution: new memory has no usable embedding"
                );
                return Ok(Vec::new());
            }
        };

        let mut superseded = Vec::new();
        for old in &candidates {
            if old.id == new.id {
                continue;
            }

            let Some(old_embedding) = self.embedding_for(old).await else {
                debug!(memory_id = %old.id, "Candidate has no usable embedding, skipping");
                continue;
            };

            let similarity = cosine_similarity(&new_embedding, &old_embedding);
            if !is_contradiction(new, old, similarity, self.config.similarity_threshold) {
                continue;
            }

            self.store
                .close_validity(old.id, new.learned_at, new.id)
                .await?;
            self.store.set_supersedes(new.id, old.id).await?;
            self.store
                .link(new.id, old.id, REL_SUPERSEDES, &[])
                .await?;

            info!(
                old_id = %old.id,
                new_id = %new.id,
                memory_type = %new.memory_type,
                similarity,
                valid_until = %new.learned_at,
                "Superseded contradicted memory"
            );
            superseded.push(old.id);
        }

        Ok(superseded)
    }

    /// The stored embedding, or one computed on the fly.
    ///
    /// Returns `None` when the memory has no vector and the embedder
    /// fails; the pair is then treated as non-contradicting.
    async fn embedding_for(&self, memory: &Memory) -> Option<Vec<f32>> {
        if let Some(embedding) = &memory.embedding {
            return Some(embedding.clone());
        }
        match self.embedder.embed(&memory.content).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!(memory_id = %memory.id, error = %e, "On-the-fly embedding failed");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
