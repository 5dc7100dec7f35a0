//! Embedding-backed semantic recall over a user's workspace history.
//!
//! Messages are indexed per `(user, workspace)` as `[role] content`.
//! Long-term memories are read from the [`MemoryStore`] at recall time and
//! scored as `[category] content`, boosted by importance so a defining fact
//! outranks an equally similar chat line. Memory embeddings are cached by
//! memory id and recomputed only when the memory's text changes.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use neonchat_core::error::MemoryError;
use neonchat_core::memory::{MemoryItem, MemoryStore, RecallHit, RecallSource, SemanticRecall, MAX_IMPORTANCE};
use neonchat_core::message::Role;
use neonchat_core::provider::{EmbeddingRequest, Provider};
use tokio::sync::RwLock;
use tracing::debug;

use crate::vector::{cosine_similarity, rank_hits};

/// Characters of text sent to the embedding model.
const EMBED_INPUT_CHARS: usize = 500;

/// Messages kept per user and workspace; older ones fall out of recall.
const MAX_MESSAGES_PER_WORKSPACE: usize = 200;

/// Weight applied to memory similarity per unit of relative importance.
const IMPORTANCE_BOOST: f32 = 0.3;

/// `(user_id, workspace_id)`
type HistoryKey = (String, String);

struct IndexedEntry {
    content: String,
    embedding: Vec<f32>,
}

pub struct InMemorySemanticIndex {
    provider: Arc<dyn Provider>,
    model: String,
    threshold: f32,
    memory: Option<Arc<dyn MemoryStore>>,
    histories: RwLock<HashMap<HistoryKey, VecDeque<IndexedEntry>>>,
    /// user id → memory id → embedded text and vector.
    memory_embeddings: RwLock<HashMap<String, HashMap<String, IndexedEntry>>>,
}

impl InMemorySemanticIndex {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, threshold: f32) -> Self {
        Self {
            provider,
            model: model.into(),
            threshold,
            memory: None,
            histories: RwLock::new(HashMap::new()),
            memory_embeddings: RwLock::new(HashMap::new()),
        }
    }

    /// Also rank the user's long-term memories from `store`.
    pub fn with_memory_store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(store);
        self
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
        let inputs = texts.iter().map(|t| t.chars().take(EMBED_INPUT_CHARS).collect()).collect();
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs,
            })
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?;

        if response.embeddings.len() != texts.len() || response.embeddings.iter().any(Vec::is_empty) {
            return Err(MemoryError::EmbeddingFailed(format!(
                "expected {} embeddings, provider returned {}",
                texts.len(),
                response.embeddings.iter().filter(|e| !e.is_empty()).count()
            )));
        }
        Ok(response.embeddings)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let mut embeddings = self.embed(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| MemoryError::EmbeddingFailed("provider returned no embedding".into()))
    }

    /// Index one conversation message of `user_id` in `workspace_id`.
    pub async fn index_message(
        &self,
        user_id: &str,
        workspace_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), MemoryError> {
        let role = match role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        };
        let content = format!("[{role}] {content}");
        let embedding = self.embed_one(&content).await?;

        let mut histories = self.histories.write().await;
        let history = histories
            .entry((user_id.to_string(), workspace_id.to_string()))
            .or_default();
        history.push_back(IndexedEntry { content, embedding });
        while history.len() > MAX_MESSAGES_PER_WORKSPACE {
            history.pop_front();
        }
        Ok(())
    }

    async fn memories_for(&self, user_id: &str) -> Result<Vec<MemoryItem>, MemoryError> {
        match &self.memory {
            Some(store) => store.list(user_id).await,
            None => Ok(Vec::new()),
        }
    }

    /// Bring the cached memory embeddings of `user_id` in line with
    /// `memories`: embed new or edited ones in one batch, drop the rest.
    async fn sync_memory_embeddings(&self, user_id: &str, memories: &[MemoryItem]) -> Result<(), MemoryError> {
        let texts: Vec<(String, String)> = memories
            .iter()
            .map(|m| (m.id.clone(), format!("[{}] {}", m.category, m.content)))
            .collect();

        let missing: Vec<(String, String)> = {
            let cache = self.memory_embeddings.read().await;
            let cached = cache.get(user_id);
            texts
                .iter()
                .filter(|(id, text)| cached.and_then(|c| c.get(id)).is_none_or(|e| &e.content != text))
                .cloned()
                .collect()
        };

        let fresh = if missing.is_empty() {
            Vec::new()
        } else {
            let inputs: Vec<String> = missing.iter().map(|(_, text)| text.clone()).collect();
            self.embed(&inputs).await?
        };
        if !missing.is_empty() {
            debug!(user_id, embedded = missing.len(), "Embedded long-term memories");
        }

        let mut cache = self.memory_embeddings.write().await;
        let cached = cache.entry(user_id.to_string()).or_default();
        for ((id, content), embedding) in missing.into_iter().zip(fresh) {
            cached.insert(id, IndexedEntry { content, embedding });
        }
        cached.retain(|id, _| texts.iter().any(|(live, _)| live == id));
        Ok(())
    }
}

#[async_trait]
impl SemanticRecall for InMemorySemanticIndex {
    async fn recall(
        &self,
        user_id: &str,
        workspace_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RecallHit>, MemoryError> {
        let key = (user_id.to_string(), workspace_id.to_string());
        let memories = self.memories_for(user_id).await?;
        if memories.is_empty() {
            self.memory_embeddings.write().await.remove(user_id);
        }
        let no_history = self.histories.read().await.get(&key).is_none_or(VecDeque::is_empty);
        if no_history && memories.is_empty() {
            return Ok(Vec::new());
        }

        self.sync_memory_embeddings(user_id, &memories).await?;
        let query_embedding = self.embed_one(query).await?;

        let mut hits = Vec::new();
        if let Some(history) = self.histories.read().await.get(&key) {
            hits.extend(history.iter().map(|entry| RecallHit {
                source: RecallSource::Message,
                content: entry.content.clone(),
                score: cosine_similarity(&query_embedding, &entry.embedding),
            }));
        }

        let cache = self.memory_embeddings.read().await;
        if let Some(cached) = cache.get(user_id) {
            for memory in &memories {
                let Some(entry) = cached.get(&memory.id) else {
                    continue;
                };
                let relevance = memory.importance_score as f32 / MAX_IMPORTANCE as f32;
                hits.push(RecallHit {
                    source: RecallSource::Memory,
                    content: entry.content.clone(),
                    score: cosine_similarity(&query_embedding, &entry.embedding) * (1.0 + relevance * IMPORTANCE_BOOST),
                });
            }
        }

        let ranked = rank_hits(hits, self.threshold, top_k);
        debug!(user_id, workspace_id, hits = ranked.len(), "Semantic recall finished");
        Ok(ranked)
    }

    async fn remember(&self, user_id: &str, workspace_id: &str, role: Role, content: &str) -> Result<(), MemoryError> {
        self.index_message(user_id, workspace_id, role, content).await
    }
}
