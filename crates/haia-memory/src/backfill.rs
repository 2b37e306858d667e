//! Embedding backfill for memories persisted without a vector.
//!
//! Extraction degrades gracefully when the embedding provider is down:
//! memories land in the store with `has_embedding = false`. This batch
//! job drains that queue. A memory that fails to embed stays queued for
//! the next run.

use tracing::{info, warn};

use haia_llm::SharedEmbedder;
use haia_types::now;

use crate::config::BackfillConfig;
use crate::error::Result;
use crate::store::SharedGraph;

/// Outcome of one backfill run.
#[derive(Debug, Clone, Default)]
pub struct BackfillReport {
    /// Memories pulled from the queue this run.
    pub scanned: usize,
    /// Vectors written.
    pub embedded: usize,
    /// Memories left queued after an embedding failure.
    pub failed: usize,
}

/// Batch job embedding memories that missed their vector at ingest.
pub struct EmbeddingBackfill {
    store: SharedGraph,
    embedder: SharedEmbedder,
    config: BackfillConfig,
}

impl EmbeddingBackfill {
    /// Create a new backfill job.
    pub fn new(store: SharedGraph, embedder: SharedEmbedder, config: BackfillConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Embed up to one batch of pending memories.
    pub async fn run(&self) -> Result<BackfillReport> {
        let pending = self.store.missing_embeddings(self.config.batch_size).await?;

        let mut report = BackfillReport {
            scanned: pending.len(),
            ..Default::default()
        };

        for memory in pending {
            match self.embedder.embed(&memory.content).await {
                Ok(embedding) => {
                    self.store
                        .set_embedding(memory.id, &embedding, self.embedder.name(), now())
                        .await?;
                    report.embedded += 1;
                }
                Err(e) => {
                    // Stays queued for the next run
                    warn!(memory_id = %memory.id, error = %e, "Backfill embedding failed");
                    report.failed += 1;
                }
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                embedded = report.embedded,
                failed = report.failed,
                "Embedding backfill run complete"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use haia_llm::{Embedder, LlmError, MockEmbedder};
    use haia_types::Memory;

    use crate::store::{InMemoryGraph, MemoryGraph};

    #[tokio::test]
    async fn test_backfill_embeds_pending_memories() {
        let store = Arc::new(InMemoryGraph::new());
        let pending = Memory::new("t", "not embedded yet");
        let done = Memory::new("t", "already embedded").with_embedding(vec![0.1], "mock");
        store.insert_memory(&pending).await.unwrap();
        store.insert_memory(&done).await.unwrap();

        let backfill = EmbeddingBackfill::new(
            store.clone(),
            Arc::new(MockEmbedder::new(8)),
            BackfillConfig::default(),
        );

        let report = backfill.run().await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.embedded, 1);
        assert_eq!(report.failed, 0);

        let after = store.get_memory(pending.id).await.unwrap().unwrap();
        assert!(after.has_embedding);
        assert_eq!(after.embedding_version.as_deref(), Some("mock"));
        assert!(store.missing_embeddings(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_items_stay_queued() {
        struct BrokenEmbedder;
        #[async_trait]
        impl Embedder for BrokenEmbedder {
            async fn embed(&self, _text: &str) -> haia_llm::Result<Vec<f32>> {
                Err(LlmError::Backend("embedder down".to_string()))
            }
            fn dimensions(&self) -> usize {
                8
            }
            fn name(&self) -> &str {
                "broken"
            }
        }

        let store = Arc::new(InMemoryGraph::new());
        store
            .insert_memory(&Memory::new("t", "waiting"))
            .await
            .unwrap();

        let backfill = EmbeddingBackfill::new(
            store.clone(),
            Arc::new(BrokenEmbedder),
            BackfillConfig::default(),
        );

        let report = backfill.run().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.embedded, 0);
        assert_eq!(store.missing_embeddings(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_size_bounds_one_run() {
        let store = Arc::new(InMemoryGraph::new());
        for i in 0..5 {
            store
                .insert_memory(&Memory::new("t", format!("pending {}", i)))
                .await
                .unwrap();
        }

        let backfill = EmbeddingBackfill::new(
            store.clone(),
            Arc::new(MockEmbedder::new(8)),
            BackfillConfig { batch_size: 2 },
        );

        let report = backfill.run().await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(store.missing_embeddings(10).await.unwrap().len(), 3);
    }
}
