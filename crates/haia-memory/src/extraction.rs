//! Memory extraction from conversation transcripts.
//!
//! Turns a role-tagged transcript into candidate structured memories via
//! the text-generation provider, filters them by confidence, validates
//! them, embeds them, and persists them with a conversation CONTAINS
//! link. Extraction failure never aborts the surrounding conversation
//! flow: a failed or unparseable generation yields an empty result and a
//! log line, not an error. Only a store that stays down after retries
//! surfaces to the caller.

use serde::Deserialize;
use tracing::{debug, info, warn};

use haia_llm::{GenerationRequest, SharedEmbedder, SharedGenerator};
use haia_types::{Conversation, Memory, Timestamp, Utterance};

use crate::config::ExtractionConfig;
use crate::error::Result;
use crate::store::{SharedGraph, with_store_retry};
use crate::validation::validate_memory;

// ─────────────────────────────────────────────────────────────────────────────
// Candidate Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// A raw extraction candidate as returned by the generation provider.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCandidate {
    /// Free-form type label chosen by the model.
    pub memory_type: String,
    /// Summary of the fact.
    pub content: String,
    /// Extraction certainty in [0, 1].
    pub confidence: f32,
    /// Populated when the transcript states an explicit time boundary.
    #[serde(default)]
    pub valid_from: Option<Timestamp>,
    #[serde(default)]
    pub valid_until: Option<Timestamp>,
}

/// Parse generation output into candidates.
///
/// Accepts a bare JSON array or one wrapped in a markdown code fence.
/// Returns `None` when the output is not parseable as a candidate list.
pub fn parse_candidates(text: &str) -> Option<Vec<RawCandidate>> {
    let stripped = strip_code_fence(text);
    serde_json::from_str(stripped).ok()
}

/// Strip a surrounding ```/```json fence if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// ─────────────────────────────────────────────────────────────────────────────
// Relationship Inference
// ─────────────────────────────────────────────────────────────────────────────

/// A model-inferred relation between two extracted memories, by index.
#[derive(Debug, Clone, Deserialize)]
struct RawRelation {
    from: usize,
    to: usize,
    relation: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction Service
// ─────────────────────────────────────────────────────────────────────────────

/// Extracts structured memories from conversation transcripts.
pub struct ExtractionService {
    generator: SharedGenerator,
    embedder: SharedEmbedder,
    store: SharedGraph,
    config: ExtractionConfig,
}

impl ExtractionService {
    /// Create a new extraction service.
    pub fn new(
        generator: SharedGenerator,
        embedder: SharedEmbedder,
        store: SharedGraph,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            generator,
            embedder,
            store,
            config,
        }
    }

    /// Extract and persist memories from a transcript.
    ///
    /// `as_of` is the ingestion time: it becomes `learned_at` for every
    /// produced memory and the default validity start when the transcript
    /// states no explicit time boundary. Returns the persisted memories.
    ///
    /// Generation failures and unparseable output return an empty list.
    /// Store failures are retried and then surfaced, so the caller never
    /// believes unsaved data was stored.
    pub async fn extract(
        &self,
        transcript: &[Utterance],
        as_of: Timestamp,
    ) -> Result<Vec<Memory>> {
        if transcript.is_empty() {
            return Ok(Vec::new());
        }

        let conversation = Conversation::started_at(as_of);
        with_store_retry(
            self.config.max_store_retries,
            self.config.retry_backoff,
            "insert_conversation",
            || self.store.insert_conversation(&conversation),
        )
        .await?;

        let prompt = build_extraction_prompt(transcript, as_of);
        let request = GenerationRequest::new(&self.config.model, prompt)
            .with_system(EXTRACTION_SYSTEM_PROMPT);

        let output = match self.generator.generate(request).await {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, conversation_id = %conversation.id, "Extraction generation failed");
                return Ok(Vec::new());
            }
        };

        let Some(candidates) = parse_candidates(&output) else {
            warn!(
                conversation_id = %conversation.id,
                output_len = output.len(),
                "Extraction output was not a parseable candidate list"
            );
            return Ok(Vec::new());
        };

        let mut persisted = Vec::new();
        for candidate in candidates {
            if candidate.confidence < self.config.confidence_threshold {
                debug!(
                    memory_type = %candidate.memory_type,
                    confidence = candidate.confidence,
                    threshold = self.config.confidence_threshold,
                    "Discarding low-confidence candidate"
                );
                continue;
            }

            let mut memory = Memory::new(&candidate.memory_type, &candidate.content)
                .with_confidence(candidate.confidence)
                .with_learned_at(as_of)
                .with_valid_from(candidate.valid_from.unwrap_or(as_of))
                .with_conversation(conversation.id);
            if let Some(until) = candidate.valid_until {
                memory.valid_until = Some(until);
            }

            if let Err(e) = validate_memory(&memory) {
                warn!(
                    memory_type = %memory.memory_type,
                    error = %e,
                    "Rejecting malformed candidate before persistence"
                );
                continue;
            }

            match self.embedder.embed(&memory.content).await {
                Ok(embedding) => {
                    memory = memory.with_embedding(embedding, self.embedder.name());
                }
                Err(e) => {
                    // Left for the backfill job to pick up
                    warn!(memory_id = %memory.id, error = %e, "Embedding failed at ingest");
                }
            }

            with_store_retry(
                self.config.max_store_retries,
                self.config.retry_backoff,
                "insert_memory",
                || self.store.insert_memory(&memory),
            )
            .await?;
            self.store
                .attach_to_conversation(conversation.id, memory.id)
                .await?;

            persisted.push(memory);
        }

        self.store
            .close_conversation(conversation.id, as_of, transcript.len())
            .await?;

        info!(
            conversation_id = %conversation.id,
            extracted = persisted.len(),
            "Extraction complete"
        );
        Ok(persisted)
    }

    /// Infer typed relationships among a batch of memories and link them.
    ///
    /// Relation labels are whatever strings the model produces; they are
    /// not drawn from a fixed vocabulary. Returns the number of links
    /// created. Generation failure or unparseable output creates nothing.
    pub async fn infer_relationships(&self, memories: &[Memory]) -> Result<usize> {
        if memories.len() < 2 {
            return Ok(0);
        }

        let prompt = build_relationship_prompt(memories);
        let request = GenerationRequest::new(&self.config.model, prompt)
            .with_system(RELATIONSHIP_SYSTEM_PROMPT);

        let output = match self.generator.generate(request).await {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "Relationship inference generation failed");
                return Ok(0);
            }
        };

        let relations: Vec<RawRelation> =
            match serde_json::from_str(strip_code_fence(&output)) {
                Ok(relations) => relations,
                Err(e) => {
                    warn!(error = %e, "Relationship inference output was not parseable");
                    return Ok(0);
                }
            };

        let mut created = 0;
        for relation in relations {
            if relation.from == relation.to
                || relation.from >= memories.len()
                || relation.to >= memories.len()
                || relation.relation.trim().is_empty()
            {
                debug!(?relation, "Skipping out-of-range or empty relation");
                continue;
            }

            self.store
                .link(
                    memories[relation.from].id,
                    memories[relation.to].id,
                    relation.relation.trim(),
                    &[("source".to_string(), "inferred".to_string())],
                )
                .await?;
            created += 1;
        }

        if created > 0 {
            info!(links = created, "Inferred memory relationships");
        }
        Ok(created)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Prompts
// ─────────────────────────────────────────────────────────────────────────────

const EXTRACTION_SYSTEM_PROMPT: &str = "You extract durable facts, preferences, and \
decisions about the user from conversation transcripts. Respond with a JSON array only. \
Each element: {\"memory_type\": string, \"content\": string, \"confidence\": number 0-1, \
\"valid_from\": RFC3339 timestamp or null, \"valid_until\": RFC3339 timestamp or null}. \
Choose memory_type freely to describe the kind of fact; do not limit yourself to a fixed \
list. Set valid_from/valid_until only when the transcript states when the fact became or \
stopped being true. Return [] when nothing is worth remembering.";

const RELATIONSHIP_SYSTEM_PROMPT: &str = "You identify relationships between memories. \
Respond with a JSON array only. Each element: {\"from\": index, \"to\": index, \
\"relation\": string}. Name the relation freely in SCREAMING_SNAKE_CASE (for example \
DEPENDS_ON, PART_OF, MOTIVATED_BY). Return [] when no meaningful relations exist.";

fn build_extraction_prompt(transcript: &[Utterance], as_of: Timestamp) -> String {
    let mut prompt = format!("Current time: {}\n\nTranscript:\n", as_of.to_rfc3339());
    for utterance in transcript {
        prompt.push_str(utterance.role.as_str());
        prompt.push_str(": ");
        prompt.push_str(&utterance.text);
        prompt.push('\n');
    }
    prompt
}

fn build_relationship_prompt(memories: &[Memory]) -> String {
    let mut prompt = String::from("Memories:\n");
    for (i, memory) in memories.iter().enumerate() {
        prompt.push_str(&format!("{}. [{}] {}\n", i, memory.memory_type, memory.content));
    }
    prompt
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
