//! Hybrid temporal memory for HAIA.
//!
//! This crate implements the memory subsystem of the assistant: it
//! extracts structured memories from conversation transcripts, resolves
//! temporal contradictions through supersession instead of deletion,
//! organizes free-form type labels into derived clusters, retrieves
//! memories by fusing vector, lexical, and graph strategies, and
//! consolidates memory lifecycle tiers over time.
//!
//! # Architecture
//!
//! ```text
//! transcript ──► ExtractionService ──► ConflictResolver ──┐
//!                                                         ▼
//!               TypeOrganizer ◄──── MemoryGraph store ◄───┘
//!                     │                   ▲
//!                     ▼                   │
//!               HybridRetrieval ──────────┤
//!               Consolidator / Backfill ──┘
//! ```
//!
//! The graph store is an external collaborator behind the async
//! [`MemoryGraph`] trait; [`InMemoryGraph`] is the bundled reference
//! backend. Model providers come from `haia-llm`.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use haia_llm::{MockEmbedder, MockGenerator};
//! use haia_memory::{
//!     ExtractionService, HybridRetrieval, InMemoryGraph, MemoryConfig, RetrievalQuery,
//! };
//! use haia_types::{Utterance, now};
//!
//! # async fn run() -> haia_memory::Result<()> {
//! let config = MemoryConfig::default();
//! let store = Arc::new(InMemoryGraph::new());
//! let generator = Arc::new(MockGenerator::with_text("[]"));
//! let embedder = Arc::new(MockEmbedder::default());
//!
//! let extraction = ExtractionService::new(
//!     generator,
//!     embedder.clone(),
//!     store.clone(),
//!     config.extraction,
//! );
//! extraction
//!     .extract(&[Utterance::user("I have 3 Proxmox nodes")], now())
//!     .await?;
//!
//! let retrieval = HybridRetrieval::new(store, embedder, config.retrieval);
//! let hits = retrieval.retrieve(RetrievalQuery::new("proxmox")).await?.hits;
//! # Ok(())
//! # }
//! ```

pub mod backfill;
pub mod config;
pub mod conflict;
pub mod consolidate;
pub mod error;
pub mod extraction;
pub mod organizer;
pub mod retrieval;
pub mod store;
pub mod validation;

// Re-export error types
pub use error::{MemoryError, Result};

// Re-export configuration
pub use config::{
    BackfillConfig, ConflictConfig, ConsolidationConfig, ExtractionConfig, MemoryConfig,
    OrganizerConfig, RetrievalConfig,
};

// Re-export store boundary
pub use store::{
    InMemoryGraph, MemoryGraph, REL_CONTAINS, REL_SUPERSEDES, RetrievalFilter, ScoredId,
    SharedGraph, with_store_retry,
};

// Re-export components
pub use backfill::{BackfillReport, EmbeddingBackfill};
pub use conflict::{ConflictResolver, is_contradiction};
pub use consolidate::{
    ConsolidationDecision, ConsolidationReport, Consolidator, access_frequency, recency_score,
};
pub use extraction::{ExtractionService, RawCandidate, parse_candidates};
pub use organizer::{TypeNeighbor, TypeOrganizer};
pub use retrieval::{
    FusedHit, HybridRetrieval, RankedMemory, RetrievalQuery, RetrievalResult, rrf_fuse,
};

// Re-export validation
pub use validation::{ValidationError, validate_embedding, validate_memory};
