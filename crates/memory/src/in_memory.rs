//! In-memory long-term memory store with a per-user cap.

use async_trait::async_trait;
use chrono::Utc;
use neonchat_core::error::MemoryError;
use neonchat_core::memory::{clamp_importance, MemoryItem, MemoryStore, NewMemory};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Stores memories in a Vec behind one lock.
///
/// The capacity check, the eviction and the insert run under a single write
/// guard, so concurrent inserts for one user can never overshoot the cap.
pub struct InMemoryMemoryStore {
    max_per_user: usize,
    items: Arc<RwLock<Vec<MemoryItem>>>,
}

impl InMemoryMemoryStore {
    pub fn new(max_per_user: usize) -> Self {
        Self {
            max_per_user,
            items: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn max_per_user(&self) -> usize {
        self.max_per_user
    }
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Pinned first, then importance descending, then most recently updated.
fn digest_order(a: &MemoryItem, b: &MemoryItem) -> Ordering {
    b.pinned
        .cmp(&a.pinned)
        .then(b.importance_score.cmp(&a.importance_score))
        .then(b.last_updated.cmp(&a.last_updated))
}

/// Index of the record to evict: lowest importance, then least recently
/// updated, never pinned. Earlier insertion wins ties.
fn eviction_candidate(items: &[MemoryItem], user_id: &str) -> Option<usize> {
    items
        .iter()
        .enumerate()
        .filter(|(_, m)| m.user_id == user_id && !m.pinned)
        .min_by(|(_, a), (_, b)| {
            a.importance_score
                .cmp(&b.importance_score)
                .then(a.last_updated.cmp(&b.last_updated))
        })
        .map(|(idx, _)| idx)
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn top_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<MemoryItem>, MemoryError> {
        let mut items = self.list(user_id).await?;
        items.truncate(limit);
        Ok(items)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<MemoryItem>, MemoryError> {
        let items = self.items.read().await;
        let mut mine: Vec<MemoryItem> = items.iter().filter(|m| m.user_id == user_id).cloned().collect();
        mine.sort_by(digest_order);
        Ok(mine)
    }

    async fn insert(&self, user_id: &str, memory: NewMemory) -> Result<MemoryItem, MemoryError> {
        let mut items = self.items.write().await;

        let count = items.iter().filter(|m| m.user_id == user_id).count();
        if count >= self.max_per_user {
            let idx = eviction_candidate(&items, user_id).ok_or_else(|| MemoryError::AtCapacity {
                user_id: user_id.to_string(),
                limit: self.max_per_user,
            })?;
            let evicted = items.remove(idx);
            debug!(
                user_id,
                evicted_id = %evicted.id,
                importance = evicted.importance_score,
                "Evicted memory to stay under cap"
            );
        }

        let now = Utc::now();
        let item = MemoryItem {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            category: memory.category,
            content: memory.content,
            importance_score: clamp_importance(memory.importance_score as i64),
            pinned: memory.pinned,
            created_at: now,
            last_updated: now,
        };
        items.push(item.clone());
        Ok(item)
    }

    async fn update_importance(&self, id: &str, importance_score: u8) -> Result<(), MemoryError> {
        let mut items = self.items.write().await;
        let item = items
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;
        item.importance_score = clamp_importance(importance_score as i64);
        item.last_updated = Utc::now();
        Ok(())
    }

    async fn set_pinned(&self, id: &str, pinned: bool) -> Result<(), MemoryError> {
        let mut items = self.items.write().await;
        let item = items
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;
        item.pinned = pinned;
        item.last_updated = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let mut items = self.items.write().await;
        let len_before = items.len();
        items.retain(|m| m.id != id);
        Ok(items.len() < len_before)
    }

    async fn count(&self, user_id: &str) -> Result<usize, MemoryError> {
        Ok(self.items.read().await.iter().filter(|m| m.user_id == user_id).count())
    }
}
