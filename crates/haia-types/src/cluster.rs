//! Derived groupings of free-form memory type labels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Timestamp, new_uuid, now};

/// A discovered grouping of semantically similar memory type labels.
///
/// Clusters are a derived, rebuildable index over `Memory.memory_type`
/// strings. They are refreshed by periodic batch clustering and read by
/// retrieval for query-type expansion. They are never authoritative:
/// clustering does not rewrite any memory's type label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeCluster {
    pub id: Uuid,
    /// Short human-readable name for the group.
    pub label: String,
    /// The raw type strings grouped under this cluster.
    pub member_types: Vec<String>,
    /// When this cluster was built.
    pub built_at: Timestamp,
}

impl TypeCluster {
    /// Create a cluster built now.
    pub fn new(label: impl Into<String>, member_types: Vec<String>) -> Self {
        Self {
            id: new_uuid(),
            label: label.into(),
            member_types,
            built_at: now(),
        }
    }

    /// Number of member types.
    pub fn len(&self) -> usize {
        self.member_types.len()
    }

    /// Whether the cluster has no members.
    pub fn is_empty(&self) -> bool {
        self.member_types.is_empty()
    }

    /// Whether the cluster groups the given type label.
    pub fn contains(&self, memory_type: &str) -> bool {
        self.member_types.iter().any(|t| t == memory_type)
    }
}
