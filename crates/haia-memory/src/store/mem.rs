//! In-memory reference implementation of the memory graph store.
//!
//! Backs tests and single-node development. Vector search is a cosine
//! scan, text search is token-overlap scoring, traversal is BFS over an
//! undirected edge list. Ranking ties break on memory id so results are
//! deterministic.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use haia_llm::cosine_similarity;
use haia_types::{Conversation, ConversationId, Memory, MemoryId, MemoryTier, Timestamp};

use crate::error::{MemoryError, Result};

use super::{MemoryGraph, RetrievalFilter, ScoredId};

/// A typed edge between two memory nodes.
#[derive(Debug, Clone)]
struct Edge {
    from: MemoryId,
    to: MemoryId,
    rel_type: String,
    #[allow(dead_code)]
    properties: Vec<(String, String)>,
}

/// In-memory memory graph.
#[derive(Debug, Default)]
pub struct InMemoryGraph {
    memories: RwLock<HashMap<MemoryId, Memory>>,
    edges: RwLock<Vec<Edge>>,
    conversations: RwLock<HashMap<ConversationId, Conversation>>,
    containment: RwLock<HashMap<ConversationId, Vec<MemoryId>>>,
}

impl InMemoryGraph {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of relationship edges (all types).
    pub fn edge_count(&self) -> usize {
        self.edges.read().len()
    }

    /// Memory ids contained in a conversation.
    pub fn conversation_members(&self, id: ConversationId) -> Vec<MemoryId> {
        self.containment.read().get(&id).cloned().unwrap_or_default()
    }

    fn not_found(id: MemoryId) -> MemoryError {
        MemoryError::NotFound(format!("Memory {}", id))
    }
}

#[async_trait]
impl MemoryGraph for InMemoryGraph {
    async fn insert_memory(&self, memory: &Memory) -> Result<()> {
        self.memories.write().insert(memory.id, memory.clone());
        debug!(memory_id = %memory.id, memory_type = %memory.memory_type, "Inserted memory");
        Ok(())
    }

    async fn get_memory(&self, id: MemoryId) -> Result<Option<Memory>> {
        Ok(self.memories.read().get(&id).cloned())
    }

    async fn record_access(&self, id: MemoryId, at: Timestamp) -> Result<()> {
        let mut memories = self.memories.write();
        let memory = memories.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        memory.access_count += 1;
        if at > memory.last_accessed {
            memory.last_accessed = at;
        }
        Ok(())
    }

    async fn set_tier(&self, id: MemoryId, tier: MemoryTier) -> Result<()> {
        let mut memories = self.memories.write();
        let memory = memories.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        memory.tier = tier;
        Ok(())
    }

    async fn close_validity(
        &self,
        id: MemoryId,
        valid_until: Timestamp,
        superseded_by: MemoryId,
    ) -> Result<()> {
        let mut memories = self.memories.write();
        let memory = memories.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        memory.valid_until = Some(valid_until);
        memory.superseded_by = Some(superseded_by);
        Ok(())
    }

    async fn set_supersedes(&self, id: MemoryId, old_id: MemoryId) -> Result<()> {
        let mut memories = self.memories.write();
        let memory = memories.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        memory.supersedes = Some(old_id);
        Ok(())
    }

    async fn set_embedding(
        &self,
        id: MemoryId,
        embedding: &[f32],
        version: &str,
        at: Timestamp,
    ) -> Result<()> {
        let mut memories = self.memories.write();
        let memory = memories.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        memory.embedding = Some(embedding.to_vec());
        memory.has_embedding = true;
        memory.embedding_version = Some(version.to_string());
        memory.embedded_at = Some(at);
        Ok(())
    }

    async fn link(
        &self,
        from: MemoryId,
        to: MemoryId,
        rel_type: &str,
        properties: &[(String, String)],
    ) -> Result<()> {
        self.edges.write().push(Edge {
            from,
            to,
            rel_type: rel_type.to_string(),
            properties: properties.to_vec(),
        });
        debug!(%from, %to, rel_type, "Linked memories");
        Ok(())
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.conversations
            .write()
            .insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn close_conversation(
        &self,
        id: ConversationId,
        ended_at: Timestamp,
        message_count: usize,
    ) -> Result<()> {
        let mut conversations = self.conversations.write();
        let conversation = conversations
            .get_mut(&id)
            .ok_or_else(|| MemoryError::NotFound(format!("Conversation {}", id)))?;
        conversation.ended_at = Some(ended_at);
        conversation.message_count = message_count;
        Ok(())
    }

    async fn attach_to_conversation(
        &self,
        conversation: ConversationId,
        memory: MemoryId,
    ) -> Result<()> {
        self.containment
            .write()
            .entry(conversation)
            .or_default()
            .push(memory);
        Ok(())
    }

    async fn active_by_type(&self, memory_type: &str) -> Result<Vec<Memory>> {
        let memories = self.memories.read();
        let mut result: Vec<Memory> = memories
            .values()
            .filter(|m| m.memory_type == memory_type && m.is_current())
            .cloned()
            .collect();
        result.sort_by_key(|m| m.id);
        Ok(result)
    }

    async fn list_by_tier(
        &self,
        tier: MemoryTier,
        learned_before: Option<Timestamp>,
    ) -> Result<Vec<Memory>> {
        let memories = self.memories.read();
        let mut result: Vec<Memory> = memories
            .values()
            .filter(|m| m.tier == tier)
            .filter(|m| learned_before.is_none_or(|cutoff| m.learned_at < cutoff))
            .cloned()
            .collect();
        result.sort_by_key(|m| m.id);
        Ok(result)
    }

    async fn distinct_types(&self) -> Result<Vec<String>> {
        let memories = self.memories.read();
        let mut types: Vec<String> = memories
            .values()
            .map(|m| m.memory_type.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        types.sort();
        Ok(types)
    }

    async fn vector_search(
        &self,
        embedding: &[f32],
        limit: usize,
        filter: &RetrievalFilter,
    ) -> Result<Vec<ScoredId>> {
        let memories = self.memories.read();
        let mut scored: Vec<ScoredId> = memories
            .values()
            .filter(|m| filter.matches(m))
            .filter_map(|m| {
                m.embedding
                    .as_ref()
                    .map(|e| ScoredId::new(m.id, cosine_similarity(embedding, e)))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn text_search(
        &self,
        query: &str,
        limit: usize,
        filter: &RetrievalFilter,
    ) -> Result<Vec<ScoredId>> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let memories = self.memories.read();
        let mut scored: Vec<ScoredId> = memories
            .values()
            .filter(|m| filter.matches(m))
            .filter_map(|m| {
                let content_tokens = tokenize(&m.content);
                let matched = query_tokens
                    .iter()
                    .filter(|t| content_tokens.contains(*t))
                    .count();
                if matched == 0 {
                    None
                } else {
                    Some(ScoredId::new(
                        m.id,
                        matched as f32 / query_tokens.len() as f32,
                    ))
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn neighborhood(
        &self,
        seeds: &[MemoryId],
        max_hops: usize,
        rel_type: Option<&str>,
    ) -> Result<Vec<MemoryId>> {
        let edges = self.edges.read();

        // Undirected adjacency restricted to the requested relation type
        let mut adjacency: HashMap<MemoryId, Vec<MemoryId>> = HashMap::new();
        for edge in edges.iter() {
            if rel_type.is_some_and(|t| t != edge.rel_type) {
                continue;
            }
            adjacency.entry(edge.from).or_default().push(edge.to);
            adjacency.entry(edge.to).or_default().push(edge.from);
        }

        let mut visited: HashSet<MemoryId> = seeds.iter().copied().collect();
        let mut queue: VecDeque<(MemoryId, usize)> =
            seeds.iter().map(|id| (*id, 0)).collect();
        let mut result = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_hops {
                continue;
            }
            let Some(neighbors) = adjacency.get(&current) else {
                continue;
            };
            // Stable expansion order keeps BFS output deterministic
            let mut neighbors = neighbors.clone();
            neighbors.sort();
            for neighbor in neighbors {
                if visited.insert(neighbor) {
                    result.push(neighbor);
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }

        Ok(result)
    }

    async fn missing_embeddings(&self, limit: usize) -> Result<Vec<Memory>> {
        let memories = self.memories.read();
        let mut pending: Vec<Memory> = memories
            .values()
            .filter(|m| !m.has_embedding)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.learned_at.cmp(&b.learned_at).then_with(|| a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn count_memories(&self) -> Result<usize> {
        Ok(self.memories.read().len())
    }
}

/// Lowercased alphanumeric tokens of a text.
fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use haia_types::now;

    fn store() -> InMemoryGraph {
        InMemoryGraph::new()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = store();
        let m = Memory::new("infrastructure", "3 Proxmox nodes");
        store.insert_memory(&m).await.unwrap();

        let fetched = store.get_memory(m.id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "3 Proxmox nodes");
        assert!(store.get_memory(MemoryId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_access_increments_atomically() {
        let store = std::sync::Arc::new(store());
        let m = Memory::new("t", "c");
        store.insert_memory(&m).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            let id = m.id;
            handles.push(tokio::spawn(async move {
                store.record_access(id, now()).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let fetched = store.get_memory(m.id).await.unwrap().unwrap();
        assert_eq!(fetched.access_count, 10);
    }

    #[tokio::test]
    async fn test_record_access_not_found() {
        let store = store();
        let result = store.record_access(MemoryId::new(), now()).await;
        assert!(matches!(result, Err(MemoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_supersession_properties() {
        let store = store();
        let old = Memory::new("infrastructure", "3 nodes");
        let new = Memory::new("infrastructure", "4 nodes");
        store.insert_memory(&old).await.unwrap();
        store.insert_memory(&new).await.unwrap();

        store
            .close_validity(old.id, new.learned_at, new.id)
            .await
            .unwrap();
        store.set_supersedes(new.id, old.id).await.unwrap();

        let old = store.get_memory(old.id).await.unwrap().unwrap();
        let new = store.get_memory(new.id).await.unwrap().unwrap();
        assert_eq!(old.valid_until, Some(new.learned_at));
        assert_eq!(old.superseded_by, Some(new.id));
        assert_eq!(new.supersedes, Some(old.id));
    }

    #[tokio::test]
    async fn test_active_by_type_excludes_closed_windows() {
        let store = store();
        let current = Memory::new("infrastructure", "4 nodes");
        let mut closed = Memory::new("infrastructure", "3 nodes");
        closed.valid_until = Some(now());
        let other = Memory::new("preference", "uses neovim");

        store.insert_memory(&current).await.unwrap();
        store.insert_memory(&closed).await.unwrap();
        store.insert_memory(&other).await.unwrap();

        let active = store.active_by_type("infrastructure").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, current.id);
    }

    #[tokio::test]
    async fn test_vector_search_ranked_and_filtered() {
        let store = store();
        let near = Memory::new("t", "near").with_embedding(vec![1.0, 0.0, 0.0], "mock");
        let mid = Memory::new("t", "mid").with_embedding(vec![0.7, 0.7, 0.0], "mock");
        let far = Memory::new("t", "far").with_embedding(vec![0.0, 0.0, 1.0], "mock");
        let unembedded = Memory::new("t", "no vector");

        for m in [&near, &mid, &far, &unembedded] {
            store.insert_memory(m).await.unwrap();
        }

        let hits = store
            .vector_search(&[1.0, 0.0, 0.0], 10, &RetrievalFilter::new())
            .await
            .unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, near.id);
        assert_eq!(hits[1].id, mid.id);
        assert_eq!(hits[2].id, far.id);
    }

    #[tokio::test]
    async fn test_text_search_token_overlap() {
        let store = store();
        let a = Memory::new("t", "Proxmox cluster with 3 nodes");
        let b = Memory::new("t", "Kubernetes cluster on bare metal");
        let c = Memory::new("t", "prefers dark editor themes");

        for m in [&a, &b, &c] {
            store.insert_memory(m).await.unwrap();
        }

        let hits = store
            .text_search("proxmox cluster", 10, &RetrievalFilter::new())
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, a.id); // both tokens match
        assert_eq!(hits[1].id, b.id); // one token matches
    }

    #[tokio::test]
    async fn test_text_search_empty_query() {
        let store = store();
        store.insert_memory(&Memory::new("t", "c")).await.unwrap();
        let hits = store
            .text_search("  ", 10, &RetrievalFilter::new())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_neighborhood_bounded_by_hops() {
        let store = store();
        let a = Memory::new("t", "a");
        let b = Memory::new("t", "b");
        let c = Memory::new("t", "c");
        let d = Memory::new("t", "d");
        for m in [&a, &b, &c, &d] {
            store.insert_memory(m).await.unwrap();
        }
        // Chain: a - b - c - d
        store.link(a.id, b.id, "RELATES_TO", &[]).await.unwrap();
        store.link(b.id, c.id, "RELATES_TO", &[]).await.unwrap();
        store.link(c.id, d.id, "RELATES_TO", &[]).await.unwrap();

        let one_hop = store.neighborhood(&[a.id], 1, None).await.unwrap();
        assert_eq!(one_hop, vec![b.id]);

        let two_hops = store.neighborhood(&[a.id], 2, None).await.unwrap();
        assert_eq!(two_hops, vec![b.id, c.id]);

        let all = store.neighborhood(&[a.id], 10, None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_neighborhood_relation_filter() {
        let store = store();
        let a = Memory::new("t", "a");
        let b = Memory::new("t", "b");
        let c = Memory::new("t", "c");
        for m in [&a, &b, &c] {
            store.insert_memory(m).await.unwrap();
        }
        store.link(a.id, b.id, "DEPENDS_ON", &[]).await.unwrap();
        store.link(a.id, c.id, "SUPERSEDES", &[]).await.unwrap();

        let depends = store
            .neighborhood(&[a.id], 2, Some("DEPENDS_ON"))
            .await
            .unwrap();
        assert_eq!(depends, vec![b.id]);
    }

    #[tokio::test]
    async fn test_missing_embeddings_oldest_first() {
        let store = store();
        let newer = Memory::new("t", "newer");
        let older = Memory::new("t", "older")
            .with_learned_at(now() - chrono::Duration::days(3));
        let embedded = Memory::new("t", "done").with_embedding(vec![0.1], "mock");

        for m in [&newer, &older, &embedded] {
            store.insert_memory(m).await.unwrap();
        }

        let pending = store.missing_embeddings(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, older.id);
    }

    #[tokio::test]
    async fn test_conversation_containment() {
        let store = store();
        let conv = Conversation::new();
        store.insert_conversation(&conv).await.unwrap();

        let m = Memory::new("t", "c").with_conversation(conv.id);
        store.insert_memory(&m).await.unwrap();
        store.attach_to_conversation(conv.id, m.id).await.unwrap();
        store.close_conversation(conv.id, now(), 4).await.unwrap();

        assert_eq!(store.conversation_members(conv.id), vec![m.id]);
    }

    #[tokio::test]
    async fn test_distinct_types_sorted() {
        let store = store();
        for (t, c) in [("b.type", "1"), ("a.type", "2"), ("b.type", "3")] {
            store.insert_memory(&Memory::new(t, c)).await.unwrap();
        }
        let types = store.distinct_types().await.unwrap();
        assert_eq!(types, vec!["a.type".to_string(), "b.type".to_string()]);
    }

    #[tokio::test]
    async fn test_list_by_tier_with_cutoff() {
        let store = store();
        let old = Memory::new("t", "old").with_learned_at(now() - chrono::Duration::days(10));
        let fresh = Memory::new("t", "fresh");
        store.insert_memory(&old).await.unwrap();
        store.insert_memory(&fresh).await.unwrap();

        let cutoff = now() - chrono::Duration::days(7);
        let eligible = store
            .list_by_tier(MemoryTier::ShortTerm, Some(cutoff))
            .await
            .unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, old.id);
    }
}
