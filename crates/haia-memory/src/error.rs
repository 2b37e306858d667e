//! Error types for the memory crate.
//!
//! The taxonomy distinguishes which failures recover locally and which
//! surface to the caller. An empty result is always a success; a failed
//! operation is always an error. The two are never conflated.

use thiserror::Error;

/// Errors that can occur in the memory subsystem.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The text-generation provider errored or returned unparseable
    /// output. Recovered locally (empty result + log) in extraction,
    /// relationship inference, and cluster labeling; only surfaced when
    /// a caller asks for generation directly.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// The embedding provider errored. Recovered locally by omitting the
    /// affected item from vector-based operations; the memory stays
    /// flagged as not-yet-embedded for backfill.
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// The graph store is unreachable for a given call. Degrades a single
    /// retrieval strategy; for writes it is retried with backoff and then
    /// surfaced, so callers never silently lose data.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Malformed memory data detected before persistence. Rejected at the
    /// boundary, never partially written.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Vector, lexical, and graph retrieval all failed in the same call.
    /// Surfaced as a definite failure so the caller can tell it apart
    /// from "no memories found".
    #[error("All retrieval strategies failed")]
    AllStrategiesFailed,

    /// Requested resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MemoryError {
    /// Returns true if this error is transient and store writes should
    /// be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

/// Result type alias for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(MemoryError::StoreUnavailable("down".to_string()).is_transient());
        assert!(!MemoryError::Generation("bad".to_string()).is_transient());
        assert!(!MemoryError::AllStrategiesFailed.is_transient());
        assert!(!MemoryError::Validation("empty".to_string()).is_transient());
    }
}
