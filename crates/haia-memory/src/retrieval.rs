//! Hybrid memory retrieval.
//!
//! Three independent strategies run concurrently against the store:
//! embedding similarity, lexical matching, and graph traversal seeded by
//! the top vector hits. Their ranked lists are fused with Reciprocal
//! Rank Fusion. Any one or two strategies may fail without failing the
//! call; their contribution is simply omitted and the degradation is
//! logged. Only when all three fail does `retrieve` return an error, so
//! an empty result always means "no memories found".

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, warn};

use haia_llm::SharedEmbedder;
use haia_types::{Memory, MemoryId, Timestamp, now};

use crate::config::RetrievalConfig;
use crate::error::{MemoryError, Result};
use crate::organizer::TypeOrganizer;
use crate::store::{RetrievalFilter, SharedGraph};

// ─────────────────────────────────────────────────────────────────────────────
// Query & Result Types
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters for a hybrid retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    /// Natural-language query text.
    pub text: String,
    /// Maximum number of fused results.
    pub top_k: usize,
    /// Type labels to restrict to (empty = all types). Expanded through
    /// the organizer's semantic neighbors when one is attached.
    pub type_filter: Vec<String>,
    /// Point in time the memories must be valid at. Defaults to the
    /// query time.
    pub as_of: Option<Timestamp>,
    /// Whether archived-tier memories are eligible.
    pub include_archived: bool,
}

impl RetrievalQuery {
    /// Create a query with default limits.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k: 10,
            type_filter: Vec::new(),
            as_of: None,
            include_archived: false,
        }
    }

    /// Set the maximum number of results.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Add a type filter label.
    pub fn with_type(mut self, memory_type: impl Into<String>) -> Self {
        self.type_filter.push(memory_type.into());
        self
    }

    /// Query as of a point in the user's timeline.
    pub fn with_as_of(mut self, as_of: Timestamp) -> Self {
        self.as_of = Some(as_of);
        self
    }

    /// Include archived-tier memories.
    pub fn with_archived(mut self) -> Self {
        self.include_archived = true;
        self
    }
}

/// A retrieved memory with its fusion score and per-strategy ranks.
#[derive(Debug, Clone)]
pub struct RankedMemory {
    pub memory: Memory,
    /// Accumulated RRF score.
    pub score: f32,
    /// 1-based rank in the vector strategy, if it surfaced this memory.
    pub vector_rank: Option<usize>,
    /// 1-based rank in the lexical strategy.
    pub lexical_rank: Option<usize>,
    /// 1-based rank in the graph strategy.
    pub graph_rank: Option<usize>,
}

/// Result of a hybrid retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// Fused, ranked memories, best first.
    pub hits: Vec<RankedMemory>,
    /// Names of strategies that failed and were omitted from fusion.
    pub degraded: Vec<&'static str>,
    /// Wall-clock duration of the call.
    pub query_time_ms: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Reciprocal Rank Fusion
// ─────────────────────────────────────────────────────────────────────────────

/// A fused id with its score and per-list 1-based ranks.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub id: MemoryId,
    pub score: f32,
    pub ranks: Vec<Option<usize>>,
}

/// Fuse ranked id lists with Reciprocal Rank Fusion.
///
/// Each list contributes `weight / (k + rank)` per id, ranks 1-based.
/// Lists given as `None` (failed strategies) contribute nothing but
/// still occupy a rank slot in the output. Deterministic: ties in score
/// break on memory id ascending.
pub fn rrf_fuse(lists: &[(f32, Option<Vec<MemoryId>>)], k: f32) -> Vec<FusedHit> {
    let mut accumulated: HashMap<MemoryId, FusedHit> = HashMap::new();

    for (slot, (weight, ids)) in lists.iter().enumerate() {
        let Some(ids) = ids else {
            continue;
        };
        for (index, id) in ids.iter().enumerate() {
            let rank = index + 1;
            let entry = accumulated.entry(*id).or_insert_with(|| FusedHit {
                id: *id,
                score: 0.0,
                ranks: vec![None; lists.len()],
            });
            entry.score += weight / (k + rank as f32);
            entry.ranks[slot] = Some(rank);
        }
    }

    let mut fused: Vec<FusedHit> = accumulated.into_values().collect();
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    fused
}

// ─────────────────────────────────────────────────────────────────────────────
// Hybrid Retrieval Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Runs the three retrieval strategies and fuses their rankings.
pub struct HybridRetrieval {
    store: SharedGraph,
    embedder: SharedEmbedder,
    organizer: Option<std::sync::Arc<TypeOrganizer>>,
    config: RetrievalConfig,
}

impl HybridRetrieval {
    /// Create a retrieval engine without type expansion.
    pub fn new(store: SharedGraph, embedder: SharedEmbedder, config: RetrievalConfig) -> Self {
        Self {
            store,
            embedder,
            organizer: None,
            config,
        }
    }

    /// Attach a type organizer for query-type expansion.
    pub fn with_organizer(mut self, organizer: std::sync::Arc<TypeOrganizer>) -> Self {
        self.organizer = Some(organizer);
        self
    }

    /// Retrieve memories relevant to a query.
    pub async fn retrieve(&self, query: RetrievalQuery) -> Result<RetrievalResult> {
        let start = std::time::Instant::now();
        let as_of = query.as_of.unwrap_or_else(now);

        let effective_types = if query.type_filter.is_empty() {
            None
        } else {
            let expanded = match &self.organizer {
                Some(organizer) => organizer.expand_types(&query.type_filter).await,
                None => query.type_filter.clone(),
            };
            debug!(original = query.type_filter.len(), expanded = expanded.len(), "Type filter");
            Some(expanded)
        };

        let mut filter = RetrievalFilter::new().with_as_of(as_of);
        if let Some(types) = effective_types {
            filter = filter.with_types(types);
        }
        if query.include_archived {
            filter = filter.with_archived();
        }

        // One query embedding shared by the vector and graph strategies.
        // If it cannot be computed, those two strategies degrade and
        // lexical carries the call.
        let query_embedding = match tokio::time::timeout(
            self.config.strategy_timeout,
            self.embedder.embed(&query.text),
        )
        .await
        {
            Ok(Ok(embedding)) => Some(embedding),
            Ok(Err(e)) => {
                warn!(error = %e, "Query embedding failed");
                None
            }
            Err(_) => {
                warn!("Query embedding timed out");
                None
            }
        };

        let fetch_limit = query.top_k * 2;

        let vector_strategy = async {
            let embedding = query_embedding.as_ref().ok_or_else(|| {
                MemoryError::Embedding("query embedding unavailable".to_string())
            })?;
            let hits = bounded(
                "vector",
                self.config.strategy_timeout,
                self.store.vector_search(embedding, fetch_limit, &filter),
            )
            .await?;
            Ok::<_, MemoryError>(hits.into_iter().map(|s| s.id).collect::<Vec<_>>())
        };

        let lexical_strategy = async {
            let hits = bounded(
                "lexical",
                self.config.strategy_timeout,
                self.store.text_search(&query.text, fetch_limit, &filter),
            )
            .await?;
            Ok::<_, MemoryError>(hits.into_iter().map(|s| s.id).collect::<Vec<_>>())
        };

        let graph_strategy = async {
            let embedding = query_embedding.as_ref().ok_or_else(|| {
                MemoryError::Embedding("query embedding unavailable".to_string())
            })?;
            bounded("graph", self.config.strategy_timeout, async {
                let seeds = self
                    .store
                    .vector_search(embedding, self.config.seed_count, &filter)
                    .await?;
                let seed_ids: Vec<MemoryId> = seeds.iter().map(|s| s.id).collect();
                if seed_ids.is_empty() {
                    return Ok(Vec::new());
                }

                let reached = self
                    .store
                    .neighborhood(&seed_ids, self.config.max_hops, None)
                    .await?;

                // Traversal surfaces linked memories; the shared filter
                // still applies to them
                let mut ids = Vec::new();
                for id in reached {
                    if let Some(memory) = self.store.get_memory(id).await? {
                        if filter.matches(&memory) {
                            ids.push(id);
                        }
                    }
                }
                Ok(ids)
            })
            .await
        };

        let (vector_result, lexical_result, graph_result) =
            tokio::join!(vector_strategy, lexical_strategy, graph_strategy);

        let mut degraded = Vec::new();
        let mut unpack = |name: &'static str, result: Result<Vec<MemoryId>>| match result {
            Ok(ids) => Some(ids),
            Err(e) => {
                warn!(strategy = name, error = %e, "Retrieval strategy degraded");
                degraded.push(name);
                None
            }
        };

        let vector_ids = unpack("vector", vector_result);
        let lexical_ids = unpack("lexical", lexical_result);
        let graph_ids = unpack("graph", graph_result);

        if vector_ids.is_none() && lexical_ids.is_none() && graph_ids.is_none() {
            return Err(MemoryError::AllStrategiesFailed);
        }

        let fused = rrf_fuse(
            &[
                (self.config.vector_weight, vector_ids),
                (self.config.lexical_weight, lexical_ids),
                (self.config.graph_weight, graph_ids),
            ],
            self.config.rrf_k,
        );

        let mut hits = Vec::with_capacity(query.top_k);
        for fused_hit in fused.into_iter().take(query.top_k) {
            let Some(memory) = self.store.get_memory(fused_hit.id).await? else {
                continue;
            };
            // Access recording must not fail the read path
            if let Err(e) = self.store.record_access(fused_hit.id, now()).await {
                debug!(memory_id = %fused_hit.id, error = %e, "Access recording failed");
            }
            hits.push(RankedMemory {
                memory,
                score: fused_hit.score,
                vector_rank: fused_hit.ranks[0],
                lexical_rank: fused_hit.ranks[1],
                graph_rank: fused_hit.ranks[2],
            });
        }

        Ok(RetrievalResult {
            hits,
            degraded,
            query_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Run a strategy future under its timeout.
async fn bounded<T>(
    name: &'static str,
    timeout: Duration,
    future: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(MemoryError::StoreUnavailable(format!(
            "{} strategy timed out",
            name
        ))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
