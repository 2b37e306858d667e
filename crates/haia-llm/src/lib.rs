//! Text-generation and embedding provider boundary for HAIA.
//!
//! The memory subsystem talks to two external model services: a
//! text-generation provider (extraction, relationship inference,
//! cluster-label summarization) and an embedding provider (memory,
//! type-label, and query vectors). This crate defines those boundaries
//! as traits with OpenAI-compatible HTTP implementations and
//! deterministic mocks for tests.
//!
//! # Usage
//!
//! ```no_run
//! use haia_llm::{GenerationRequest, OpenAiConfig, OpenAiGenerator, TextGenerator};
//!
//! # async fn run() -> haia_llm::Result<()> {
//! let generator = OpenAiGenerator::new(OpenAiConfig::openai("sk-..."))?;
//! let text = generator
//!     .generate(GenerationRequest::new("gpt-4o-mini", "Extract facts from ..."))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod embeddings;
pub mod error;
pub mod generation;
pub mod openai;

// Re-export error types
pub use error::{LlmError, Result, is_retryable};

// Re-export generation boundary
pub use generation::{
    GenerationRequest, MockGenerator, SharedGenerator, TextGenerator, with_retry,
};

// Re-export embedding boundary
pub use embeddings::{
    Embedder, MockEmbedder, OpenAiEmbedder, OpenAiEmbedderConfig, SharedEmbedder,
    cosine_similarity,
};

// Re-export HTTP generator
pub use openai::{OpenAiConfig, OpenAiGenerator};
