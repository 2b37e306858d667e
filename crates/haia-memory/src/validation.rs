//! Validation for memory data at the persistence boundary.
//!
//! Malformed memories are rejected before any write happens, so a
//! failed validation never leaves a partially written record behind.

use haia_types::Memory;

use crate::error::MemoryError;

// ─────────────────────────────────────────────────────────────────────────────
// Validation Error
// ─────────────────────────────────────────────────────────────────────────────

/// Specific validation error types for memory data.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    /// Memory content is empty.
    #[error("memory content is empty")]
    EmptyContent,

    /// Memory type label is empty.
    #[error("memory type is empty")]
    EmptyType,

    /// Confidence score is out of valid range (0.0-1.0).
    #[error("confidence score {0} is out of range [0.0, 1.0]")]
    InvalidConfidence(f32),

    /// Validity window is inverted or degenerate.
    #[error("valid_until {valid_until} is not after valid_from {valid_from}")]
    InvalidValidityWindow {
        valid_from: String,
        valid_until: String,
    },

    /// Embedding contains invalid values (NaN or Inf).
    #[error("embedding contains {count} invalid values (NaN or Inf)")]
    InvalidEmbeddingValues {
        /// Number of invalid values found.
        count: usize,
    },

    /// Embedding flag and vector disagree.
    #[error("has_embedding is set but no embedding vector is present")]
    MissingEmbeddingVector,
}

impl From<ValidationError> for MemoryError {
    fn from(err: ValidationError) -> Self {
        MemoryError::Validation(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Validate a memory before persistence.
///
/// Checks:
/// 1. Content and type label are non-empty
/// 2. Confidence is in [0.0, 1.0]
/// 3. `valid_from < valid_until` whenever the window is closed
/// 4. The embedding, if flagged present, exists and contains only
///    finite values
pub fn validate_memory(memory: &Memory) -> std::result::Result<(), ValidationError> {
    if memory.content.trim().is_empty() {
        return Err(ValidationError::EmptyContent);
    }

    if memory.memory_type.trim().is_empty() {
        return Err(ValidationError::EmptyType);
    }

    if !(0.0..=1.0).contains(&memory.confidence) || memory.confidence.is_nan() {
        return Err(ValidationError::InvalidConfidence(memory.confidence));
    }

    if let Some(until) = memory.valid_until {
        if until <= memory.valid_from {
            return Err(ValidationError::InvalidValidityWindow {
                valid_from: memory.valid_from.to_rfc3339(),
                valid_until: until.to_rfc3339(),
            });
        }
    }

    if memory.has_embedding {
        match &memory.embedding {
            None => return Err(ValidationError::MissingEmbeddingVector),
            Some(embedding) => validate_embedding(embedding)?,
        }
    }

    Ok(())
}

/// Validate an embedding vector contains only finite values.
pub fn validate_embedding(embedding: &[f32]) -> std::result::Result<(), ValidationError> {
    let invalid_count = embedding
        .iter()
        .filter(|v| v.is_nan() || v.is_infinite())
        .count();

    if invalid_count > 0 {
        return Err(ValidationError::InvalidEmbeddingValues {
            count: invalid_count,
        });
    }

    Ok(())
}
