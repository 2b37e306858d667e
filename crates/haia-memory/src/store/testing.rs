//! Fault-injecting store wrapper shared by the component tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use haia_types::{Conversation, ConversationId, Memory, MemoryId, MemoryTier, Timestamp};

use crate::error::{MemoryError, Result};

use super::{InMemoryGraph, MemoryGraph, RetrievalFilter, ScoredId};

/// Wraps [`InMemoryGraph`] and fails named operations on demand.
#[derive(Debug, Default)]
pub(crate) struct FaultInjectingGraph {
    pub inner: InMemoryGraph,
    failing: Mutex<HashSet<&'static str>>,
}

impl FaultInjectingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the named operation return `StoreUnavailable` until cleared.
    pub fn fail_on(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn clear_faults(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        if self.failing.lock().unwrap().contains(operation) {
            Err(MemoryError::StoreUnavailable(format!(
                "injected fault: {}",
                operation
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MemoryGraph for FaultInjectingGraph {
    async fn insert_memory(&self, memory: &Memory) -> Result<()> {
        self.check("insert_memory")?;
        self.inner.insert_memory(memory).await
    }

    async fn get_memory(&self, id: MemoryId) -> Result<Option<Memory>> {
        self.check("get_memory")?;
        self.inner.get_memory(id).await
    }

    async fn record_access(&self, id: MemoryId, at: Timestamp) -> Result<()> {
        self.check("record_access")?;
        self.inner.record_access(id, at).await
    }

    async fn set_tier(&self, id: MemoryId, tier: MemoryTier) -> Result<()> {
        self.check("set_tier")?;
        self.inner.set_tier(id, tier).await
    }

    async fn close_validity(
        &self,
        id: MemoryId,
        valid_until: Timestamp,
        superseded_by: MemoryId,
    ) -> Result<()> {
        self.check("close_validity")?;
        self.inner.close_validity(id, valid_until, superseded_by).await
    }

    async fn set_supersedes(&self, id: MemoryId, old_id: MemoryId) -> Result<()> {
        self.check("set_supersedes")?;
        self.inner.set_supersedes(id, old_id).await
    }

    async fn set_embedding(
        &self,
        id: MemoryId,
        embedding: &[f32],
        version: &str,
        at: Timestamp,
    ) -> Result<()> {
        self.check("set_embedding")?;
        self.inner.set_embedding(id, embedding, version, at).await
    }

    async fn link(
        &self,
        from: MemoryId,
        to: MemoryId,
        rel_type: &str,
        properties: &[(String, String)],
    ) -> Result<()> {
        self.check("link")?;
        self.inner.link(from, to, rel_type, properties).await
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.check("insert_conversation")?;
        self.inner.insert_conversation(conversation).await
    }

    async fn close_conversation(
        &self,
        id: ConversationId,
        ended_at: Timestamp,
        message_count: usize,
    ) -> Result<()> {
        self.check("close_conversation")?;
        self.inner.close_conversation(id, ended_at, message_count).await
    }

    async fn attach_to_conversation(
        &self,
        conversation: ConversationId,
        memory: MemoryId,
    ) -> Result<()> {
        self.check("attach_to_conversation")?;
        self.inner.attach_to_conversation(conversation, memory).await
    }

    async fn active_by_type(&self, memory_type: &str) -> Result<Vec<Memory>> {
        self.check("active_by_type")?;
        self.inner.active_by_type(memory_type).await
    }

    async fn list_by_tier(
        &self,
        tier: MemoryTier,
        learned_before: Option<Timestamp>,
    ) -> Result<Vec<Memory>> {
        self.check("list_by_tier")?;
        self.inner.list_by_tier(tier, learned_before).await
    }

    async fn distinct_types(&self) -> Result<Vec<String>> {
        self.check("distinct_types")?;
        self.inner.distinct_types().await
    }

    async fn vector_search(
        &self,
        embedding: &[f32],
        limit: usize,
        filter: &RetrievalFilter,
    ) -> Result<Vec<ScoredId>> {
        self.check("vector_search")?;
        self.inner.vector_search(embedding, limit, filter).await
    }

    async fn text_search(
        &self,
        query: &str,
        limit: usize,
        filter: &RetrievalFilter,
    ) -> Result<Vec<ScoredId>> {
        self.check("text_search")?;
        self.inner.text_search(query, limit, filter).await
    }

    async fn neighborhood(
        &self,
        seeds: &[MemoryId],
        max_hops: usize,
        rel_type: Option<&str>,
    ) -> Result<Vec<MemoryId>> {
        self.check("neighborhood")?;
        self.inner.neighborhood(seeds, max_hops, rel_type).await
    }

    async fn missing_embeddings(&self, limit: usize) -> Result<Vec<Memory>> {
        self.check("missing_embeddings")?;
        self.inner.missing_embeddings(limit).await
    }

    async fn count_memories(&self) -> Result<usize> {
        self.check("count_memories")?;
        self.inner.count_memories().await
    }
}
