//! Component configuration.
//!
//! Each component receives its own immutable config struct at
//! construction. The numeric defaults are a reasonable starting
//! configuration, not bit-exact requirements; hosts tune them per
//! deployment. There is no ambient global state.

use std::time::Duration;

/// Configuration for the extraction service.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Model identifier passed to the text-generation provider.
    pub model: String,
    /// Candidates below this confidence are discarded before persistence.
    pub confidence_threshold: f32,
    /// Maximum retries for store writes before surfacing the failure.
    pub max_store_retries: u32,
    /// Initial backoff between store write retries.
    pub retry_backoff: Duration,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            confidence_threshold: 0.5,
            max_store_retries: 3,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

/// Configuration for the temporal conflict resolver.
#[derive(Debug, Clone)]
pub struct ConflictConfig {
    /// Minimum embedding cosine similarity for two same-type,
    /// temporally overlapping memories to count as contradicting.
    pub similarity_threshold: f32,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.75,
        }
    }
}

/// Configuration for the type organizer.
#[derive(Debug, Clone)]
pub struct OrganizerConfig {
    /// Clusters smaller than this are discarded as noise.
    pub min_cluster_size: usize,
    /// Maximum cosine distance between a cluster seed and its members.
    pub distance_threshold: f32,
    /// Similarity floor for semantic-neighbor lookups.
    pub neighbor_threshold: f32,
    /// Cap on returned semantic neighbors.
    pub max_neighbors: usize,
    /// Model identifier used for cluster-label summarization.
    pub label_model: String,
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: 3,
            distance_threshold: 0.20,
            neighbor_threshold: 0.80,
            max_neighbors: 8,
            label_model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Configuration for the hybrid retrieval engine.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// RRF rank constant.
    pub rrf_k: f32,
    /// RRF weight for the vector strategy.
    pub vector_weight: f32,
    /// RRF weight for the lexical strategy.
    pub lexical_weight: f32,
    /// RRF weight for the graph strategy.
    pub graph_weight: f32,
    /// Per-strategy timeout.
    pub strategy_timeout: Duration,
    /// Number of top vector hits used to seed graph traversal.
    pub seed_count: usize,
    /// Maximum traversal depth for the graph strategy.
    pub max_hops: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            vector_weight: 1.0,
            lexical_weight: 0.8,
            graph_weight: 0.6,
            strategy_timeout: Duration::from_secs(5),
            seed_count: 3,
            max_hops: 2,
        }
    }
}

/// Configuration for the lifecycle consolidator.
#[derive(Debug, Clone)]
pub struct ConsolidationConfig {
    /// Short-term memories younger than this are left alone.
    pub grace_period_days: i64,
    /// Priority at or above which a short-term memory is promoted.
    pub promotion_threshold: f32,
    /// Priority below which a long-term memory is archived.
    pub archival_threshold: f32,
    /// Priority weight for access frequency.
    pub access_weight: f32,
    /// Priority weight for recency.
    pub recency_weight: f32,
    /// Priority weight for confidence.
    pub confidence_weight: f32,
    /// Half-life of the recency decay for a never-accessed memory, in
    /// days. Access count stretches the effective half-life.
    pub base_half_life_days: f32,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            grace_period_days: 7,
            promotion_threshold: 0.7,
            archival_threshold: 0.2,
            access_weight: 0.40,
            recency_weight: 0.30,
            confidence_weight: 0.30,
            base_half_life_days: 30.0,
        }
    }
}

/// Configuration for the embedding backfill job.
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// Maximum memories embedded per run.
    pub batch_size: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self { batch_size: 64 }
    }
}

/// Aggregate configuration for the whole subsystem.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfig {
    pub extraction: ExtractionConfig,
    pub conflict: ConflictConfig,
    pub organizer: OrganizerConfig,
    pub retrieval: RetrievalConfig,
    pub consolidation: ConsolidationConfig,
    pub backfill: BackfillConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_recommended_starting_point() {
        let config = MemoryConfig::default();
        assert!((config.extraction.confidence_threshold - 0.5).abs() < f32::EPSILON);
        assert!((config.conflict.similarity_threshold - 0.75).abs() < f32::EPSILON);
        assert_eq!(config.organizer.min_cluster_size, 3);
        assert!((config.retrieval.rrf_k - 60.0).abs() < f32::EPSILON);
        assert_eq!(config.consolidation.grace_period_days, 7);
        let weight_sum = config.consolidation.access_weight
            + config.consolidation.recency_weight
            + config.consolidation.confidence_weight;
        assert!((weight_sum - 1.0).abs() < 0.001);
    }
}
