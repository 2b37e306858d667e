//! Type organization over free-form memory type labels.
//!
//! Extraction invents `memory_type` strings freely, so the label space
//! grows without bound. The organizer counteracts that with a derived,
//! rebuildable index: periodic batch clustering groups semantically
//! similar labels under generated names, and a semantic-neighbor lookup
//! lets retrieval expand a type filter. Nothing here ever rewrites a
//! stored memory's type label.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use haia_llm::{GenerationRequest, SharedEmbedder, SharedGenerator, cosine_similarity};
use haia_types::TypeCluster;

use crate::config::OrganizerConfig;
use crate::error::Result;
use crate::store::SharedGraph;

/// A type label semantically near a query type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeNeighbor {
    pub memory_type: String,
    pub similarity: f32,
}

/// Clusters memory type labels and answers neighbor lookups.
///
/// Both the cluster list and the label-embedding cache are process-wide,
/// rebuilt by [`cluster_all_types`](Self::cluster_all_types) on a
/// schedule driven by an external scheduler. Retrieval works without
/// expansion until the first run completes.
pub struct TypeOrganizer {
    store: SharedGraph,
    embedder: SharedEmbedder,
    generator: SharedGenerator,
    config: OrganizerConfig,
    run_lock: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
    clusters: RwLock<Vec<TypeCluster>>,
    label_vectors: RwLock<HashMap<String, Vec<f32>>>,
}

impl TypeOrganizer {
    /// Create a new organizer.
    pub fn new(
        store: SharedGraph,
        embedder: SharedEmbedder,
        generator: SharedGenerator,
        config: OrganizerConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            config,
            run_lock: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
            clusters: RwLock::new(Vec::new()),
            label_vectors: RwLock::new(HashMap::new()),
        }
    }

    /// Token used to request cooperative shutdown of a running cluster
    /// pass.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The clusters from the most recent completed run.
    pub fn clusters(&self) -> Vec<TypeCluster> {
        self.clusters.read().clone()
    }

    /// Rebuild type clusters from the distinct type labels in the store.
    ///
    /// Single-flight: a trigger that arrives while a run is in progress
    /// is skipped and returns the current clusters. Fewer distinct types
    /// than the minimum cluster size is not an error; it returns an
    /// empty list. Embedding failure degrades to an empty list as well;
    /// the previous clusters stay in place for readers.
    pub async fn cluster_all_types(&self) -> Result<Vec<TypeCluster>> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            info!("Cluster run already in progress, skipping trigger");
            return Ok(self.clusters());
        };

        let types = self.store.distinct_types().await?;
        if types.is_empty() {
            return Ok(Vec::new());
        }

        let refs: Vec<&str> = types.iter().map(String::as_str).collect();
        let vectors = match self.embedder.embed_batch(&refs).await {
            Ok(vectors) => vectors,
            Err(e) => {
                warn!(error = %e, "Type-label embedding failed, keeping previous clusters");
                return Ok(Vec::new());
            }
        };

        // Refresh the neighbor-lookup cache even when clustering is skipped
        {
            let mut cache = self.label_vectors.write();
            cache.clear();
            for (label, vector) in types.iter().zip(vectors.iter()) {
                cache.insert(label.clone(), vector.clone());
            }
        }

        if types.len() < self.config.min_cluster_size {
            debug!(
                type_count = types.len(),
                min_cluster_size = self.config.min_cluster_size,
                "Too few distinct types to cluster"
            );
            return Ok(Vec::new());
        }

        let groups = self.group_labels(&types, &vectors);

        let mut clusters = Vec::with_capacity(groups.len());
        let mut cancelled = false;
        for members in groups {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let label = self.summarize_label(&members).await;
            clusters.push(TypeCluster::new(label, members));
        }

        if cancelled {
            info!(built = clusters.len(), "Cluster run cancelled mid-pass");
        } else {
            info!(
                clusters = clusters.len(),
                types = types.len(),
                "Type cluster rebuild complete"
            );
        }

        *self.clusters.write() = clusters.clone();
        Ok(clusters)
    }

    /// Other known types whose similarity to `memory_type` exceeds
    /// `threshold`, best first, capped at the configured maximum.
    ///
    /// Works from the label-embedding cache built during cluster runs;
    /// before the first run it returns an empty list. Read-only: it
    /// never mutates stored type labels. An embedding failure for an
    /// unknown query type degrades to an empty list.
    pub async fn find_semantic_neighbors(
        &self,
        memory_type: &str,
        threshold: f32,
    ) -> Result<Vec<TypeNeighbor>> {
        let known: Vec<(String, Vec<f32>)> = {
            let cache = self.label_vectors.read();
            cache.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        if known.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = match known
            .iter()
            .find(|(label, _)| label.as_str() == memory_type)
            .map(|(_, v)| v.clone())
        {
            Some(vector) => vector,
            None => match self.embedder.embed(memory_type).await {
                Ok(vector) => vector,
                Err(e) => {
                    warn!(memory_type, error = %e, "Neighbor lookup embedding failed");
                    return Ok(Vec::new());
                }
            },
        };

        let mut neighbors: Vec<TypeNeighbor> = known
            .iter()
            .filter(|(label, _)| label.as_str() != memory_type)
            .map(|(label, vector)| TypeNeighbor {
                memory_type: label.clone(),
                similarity: cosine_similarity(&query_vector, vector),
            })
            .filter(|n| n.similarity > threshold)
            .collect();

        neighbors.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.memory_type.cmp(&b.memory_type))
        });
        neighbors.truncate(self.config.max_neighbors);
        Ok(neighbors)
    }

    /// Expand a type-filter set with each type's semantic neighbors,
    /// using the configured neighbor threshold. Used by retrieval.
    pub async fn expand_types(&self, types: &[String]) -> Vec<String> {
        let mut expanded: Vec<String> = Vec::new();
        for memory_type in types {
            if !expanded.contains(memory_type) {
                expanded.push(memory_type.clone());
            }
            let neighbors = self
                .find_semantic_neighbors(memory_type, self.config.neighbor_threshold)
                .await
                .unwrap_or_default();
            for neighbor in neighbors {
                if !expanded.contains(&neighbor.memory_type) {
                    expanded.push(neighbor.memory_type);
                }
            }
        }
        expanded
    }

    /// Greedy density grouping of labels by cosine distance to a seed.
    ///
    /// Each unassigned label seeds a group of all unassigned labels
    /// within the distance threshold of it. Groups below the minimum
    /// size are noise and stay unassigned.
    fn group_labels(&self, types: &[String], vectors: &[Vec<f32>]) -> Vec<Vec<String>> {
        let mut assigned = vec![false; types.len()];
        let mut groups = Vec::new();

        for seed in 0..types.len() {
            if assigned[seed] {
                continue;
            }

            let members: Vec<usize> = (0..types.len())
                .filter(|&j| !assigned[j])
                .filter(|&j| {
                    j == seed
                        || 1.0 - cosine_similarity(&vectors[seed], &vectors[j])
                            <= self.config.distance_threshold
                })
                .collect();

            if members.len() < self.config.min_cluster_size {
                continue;
            }

            for &j in &members {
                assigned[j] = true;
            }
            groups.push(members.iter().map(|&j| types[j].clone()).collect());
        }

        groups
    }

    /// Ask the generator for a short cluster label, falling back to the
    /// first member on failure.
    async fn summarize_label(&self, members: &[String]) -> String {
        let prompt = format!(
            "These memory category labels belong to one semantic group:\n{}\n\
             Reply with a single short (1-3 word) name for the group and nothing else.",
            members.join("\n")
        );
        let request = GenerationRequest::new(&self.config.label_model, prompt)
            .with_max_tokens(16)
            .with_temperature(0.0);

        match self.generator.generate(request).await {
            Ok(label) => {
                let label = label.trim().trim_matches('"').to_string();
                if label.is_empty() {
                    members[0].clone()
                } else {
                    label
                }
            }
            Err(e) => {
                warn!(error = %e, "Cluster label generation failed, using member label");
                members[0].clone()
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use haia_llm::{Embedder, LlmError, MockGenerator};
    use haia_types::Memory;

    use crate::store::{InMemoryGraph, MemoryGraph};

    /// Embedder with hand-assigned vectors per label.
    struct FixedEmbedder {
        map: HashMap<String, Vec<f32>>,
    }

    impl FixedEmbedder {
        fn new(entries: &[(&str, [f32; 3])]) -> Self {
            Self {
                map: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_vec()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, text: &str) -> haia_llm::Result<Vec<f32>> {
            self.map
                .get(text)
                .cloned()
                .ok_or_else(|| LlmError::Backend(format!("no vector for {}", text)))
        }
        fn dimensions(&self) -> usize {
            3
        }
        fn name(&self) -> &str {
            "fixed"
        }
    }

    async fn seed_types(store: &InMemoryGraph, types: &[&str]) {
        for (i, t) in types.iter().enumerate() {
            store
                .insert_memory(&Memory::new(*t, format!("fact {}", i)))
                .await
                .unwrap();
        }
    }

    fn organizer_with(
        store: Arc<InMemoryGraph>,
        embedder: impl Embedder + 'static,
        generator: MockGenerator,
    ) -> TypeOrganizer {
        TypeOrganizer::new(
            store,
            Arc::new(embedder),
            Arc::new(generator),
            OrganizerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_too_few_types_returns_empty_not_error() {
        let store = Arc::new(InMemoryGraph::new());
        seed_types(&store, &["a.type", "b.type"]).await;

        let embedder = FixedEmbedder::new(&[
            ("a.type", [1.0, 0.0, 0.0]),
            ("b.type", [0.0, 1.0, 0.0]),
        ]);
        let organizer = organizer_with(store, embedder, MockGenerator::with_text("group"));

        let clusters = organizer.cluster_all_types().await.unwrap();
        assert!(clusters.is_empty());
    }

    #[tokio::test]
    async fn test_clusters_similar_types_and_discards_noise() {
        let store = Arc::new(InMemoryGraph::new());
        seed_types(
            &store,
            &[
                "homelab.hardware",
                "server.inventory",
                "network.topology",
                "preference.editor",
            ],
        )
        .await;

        // Three near-identical infrastructure vectors, one far preference vector
        let embedder = FixedEmbedder::new(&[
            ("homelab.hardware", [1.0, 0.0, 0.0]),
            ("server.inventory", [0.98, 0.2, 0.0]),
            ("network.topology", [0.95, 0.3, 0.0]),
            ("preference.editor", [0.0, 0.0, 1.0]),
        ]);
        let organizer = organizer_with(
            store,
            embedder,
            MockGenerator::with_text("infrastructure"),
        );

        let clusters = organizer.cluster_all_types().await.unwrap();

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].label, "infrastructure");
        assert_eq!(clusters[0].len(), 3);
        assert!(clusters[0].contains("server.inventory"));
        // Singleton is noise, not a cluster
        assert!(!clusters[0].contains("preference.editor"));
    }

    #[tokio::test]
    async fn test_label_generation_failure_falls_back_to_member() {
        let store = Arc::new(InMemoryGraph::new());
        seed_types(&store, &["a.x", "b.x", "c.x"]).await;

        let embedder = FixedEmbedder::new(&[
            ("a.x", [1.0, 0.0, 0.0]),
            ("b.x", [1.0, 0.05, 0.0]),
            ("c.x", [1.0, 0.1, 0.0]),
        ]);
        let organizer = organizer_with(store, embedder, MockGenerator::failing("down"));

        let clusters = organizer.cluster_all_types().await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].label, "a.x");
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_empty() {
        let store = Arc::new(InMemoryGraph::new());
        seed_types(&store, &["a", "b", "c"]).await;

        // No vectors registered: embed_batch fails on the first label
        let embedder = FixedEmbedder::new(&[]);
        let organizer = organizer_with(store, embedder, MockGenerator::with_text("group"));

        let clusters = organizer.cluster_all_types().await.unwrap();
        assert!(clusters.is_empty());
    }

    #[tokio::test]
    async fn test_neighbors_empty_before_first_run() {
        let store = Arc::new(InMemoryGraph::new());
        let embedder = FixedEmbedder::new(&[("query", [1.0, 0.0, 0.0])]);
        let organizer = organizer_with(store, embedder, MockGenerator::with_text("group"));

        let neighbors = organizer.find_semantic_neighbors("query", 0.5).await.unwrap();
        assert!(neighbors.is_empty());
    }

    #[tokio::test]
    async fn test_neighbors_sorted_capped_and_thresholded() {
        let store = Arc::new(InMemoryGraph::new());
        seed_types(&store, &["close", "closer", "far", "query"]).await;

        let embedder = FixedEmbedder::new(&[
            ("query", [1.0, 0.0, 0.0]),
            ("closer", [0.99, 0.1, 0.0]),
            ("close", [0.9, 0.4, 0.0]),
            ("far", [0.0, 1.0, 0.0]),
        ]);
        let organizer = organizer_with(store, embedder, MockGenerator::with_text("group"));
        organizer.cluster_all_types().await.unwrap();

        let neighbors = organizer.find_semantic_neighbors("query", 0.5).await.unwrap();

        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].memory_type, "closer");
        assert_eq!(neighbors[1].memory_type, "close");
        assert!(neighbors[0].similarity > neighbors[1].similarity);
        // The query type itself is never its own neighbor
        assert!(neighbors.iter().all(|n| n.memory_type != "query"));
    }

    #[tokio::test]
    async fn test_neighbor_lookup_never_mutates_store_types() {
        let store = Arc::new(InMemoryGraph::new());
        seed_types(&store, &["a.x", "b.x", "c.x"]).await;

        let embedder = FixedEmbedder::new(&[
            ("a.x", [1.0, 0.0, 0.0]),
            ("b.x", [1.0, 0.05, 0.0]),
            ("c.x", [1.0, 0.1, 0.0]),
        ]);
        let organizer = organizer_with(store.clone(), embedder, MockGenerator::with_text("x"));
        organizer.cluster_all_types().await.unwrap();

        let before = store.distinct_types().await.unwrap();
        organizer.find_semantic_neighbors("a.x", 0.1).await.unwrap();
        let after = store.distinct_types().await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_expand_types_includes_originals_and_neighbors() {
        let store = Arc::new(InMemoryGraph::new());
        seed_types(&store, &["a.x", "b.x", "c.x"]).await;

        let embedder = FixedEmbedder::new(&[
            ("a.x", [1.0, 0.0, 0.0]),
            ("b.x", [1.0, 0.02, 0.0]),
            ("c.x", [0.0, 1.0, 0.0]),
        ]);
        let organizer = organizer_with(store, embedder, MockGenerator::with_text("x"));
        organizer.cluster_all_types().await.unwrap();

        let expanded = organizer.expand_types(&["a.x".to_string()]).await;
        assert!(expanded.contains(&"a.x".to_string()));
        assert!(expanded.contains(&"b.x".to_string()));
        assert!(!expanded.contains(&"c.x".to_string()));
    }

    #[tokio::test]
    async fn test_second_run_replaces_clusters() {
        let store = Arc::new(InMemoryGraph::new());
        seed_types(&store, &["a.x", "b.x", "c.x"]).await;

        let embedder = FixedEmbedder::new(&[
            ("a.x", [1.0, 0.0, 0.0]),
            ("b.x", [1.0, 0.05, 0.0]),
            ("c.x", [1.0, 0.1, 0.0]),
        ]);
        let generator = MockGenerator::new(vec![
            Ok("first label".to_string()),
            Ok("second label".to_string()),
        ]);
        let organizer = organizer_with(store, embedder, generator);

        organizer.cluster_all_types().await.unwrap();
        assert_eq!(organizer.clusters()[0].label, "first label");

        organizer.cluster_all_types().await.unwrap();
        assert_eq!(organizer.clusters()[0].label, "second label");
    }
}
