//! Long-term memory and semantic recall traits.
//!
//! Long-term memory is a small, curated set of facts per user (capped, with
//! importance-based eviction). Semantic recall is a black-box service that
//! ranks past content of a workspace by similarity to the current query.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::MemoryError;

/// Lowest importance a memory may carry.
pub const MIN_IMPORTANCE: u8 = 1;
/// Highest importance a memory may carry.
pub const MAX_IMPORTANCE: u8 = 5;

/// What a memory is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Project,
    TechStack,
    Goal,
    LearningStyle,
    ResponsePreference,
    TechnicalProfile,
    General,
}

impl MemoryCategory {
    pub const ALL: [MemoryCategory; 7] = [
        Self::Project,
        Self::TechStack,
        Self::Goal,
        Self::LearningStyle,
        Self::ResponsePreference,
        Self::TechnicalProfile,
        Self::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::TechStack => "tech_stack",
            Self::Goal => "goal",
            Self::LearningStyle => "learning_style",
            Self::ResponsePreference => "response_preference",
            Self::TechnicalProfile => "technical_profile",
            Self::General => "general",
        }
    }

    /// Lenient parse used for model output; unknown labels fall back to `General`.
    pub fn parse_lenient(label: &str) -> Self {
        let label = label.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == label)
            .unwrap_or(Self::General)
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored long-term memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub user_id: String,
    pub category: MemoryCategory,
    pub content: String,
    /// 1 (trivia) to 5 (defining)
    pub importance_score: u8,
    /// Pinned memories are never evicted.
    #[serde(default)]
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// A memory about to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMemory {
    pub category: MemoryCategory,
    pub content: String,
    pub importance_score: u8,
    #[serde(default)]
    pub pinned: bool,
}

impl NewMemory {
    pub fn new(category: MemoryCategory, content: impl Into<String>, importance_score: u8) -> Self {
        Self {
            category,
            content: content.into(),
            importance_score: clamp_importance(importance_score as i64),
            pinned: false,
        }
    }
}

/// Clamp an arbitrary score into the valid importance range.
pub fn clamp_importance(score: i64) -> u8 {
    score.clamp(MIN_IMPORTANCE as i64, MAX_IMPORTANCE as i64) as u8
}

/// Per-user long-term memory storage.
///
/// Implementations must make `insert` atomic with respect to the per-user cap:
/// the capacity check, any eviction and the insert happen as one step.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `limit` memories, pinned first, then by importance descending,
    /// then most recently updated first.
    async fn top_for_user(&self, user_id: &str, limit: usize) -> std::result::Result<Vec<MemoryItem>, MemoryError>;

    /// Every memory of the user, in the same order as `top_for_user`.
    async fn list(&self, user_id: &str) -> std::result::Result<Vec<MemoryItem>, MemoryError>;

    /// Insert a memory, evicting the least important unpinned record first if
    /// the user is at capacity.
    async fn insert(&self, user_id: &str, memory: NewMemory) -> std::result::Result<MemoryItem, MemoryError>;

    async fn update_importance(&self, id: &str, importance_score: u8) -> std::result::Result<(), MemoryError>;

    async fn set_pinned(&self, id: &str, pinned: bool) -> std::result::Result<(), MemoryError>;

    async fn delete(&self, id: &str) -> std::result::Result<bool, MemoryError>;

    async fn count(&self, user_id: &str) -> std::result::Result<usize, MemoryError>;
}

/// Where a semantic recall hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallSource {
    /// A past conversation message
    Message,
    /// A long-term memory
    Memory,
}

/// One ranked result from semantic recall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallHit {
    pub source: RecallSource,
    pub content: String,
    pub score: f32,
}

/// Similarity search over one user's past content in a workspace.
///
/// Everything is scoped to a `(user_id, workspace_id)` pair; one user's
/// history never surfaces for another.
#[async_trait]
pub trait SemanticRecall: Send + Sync {
    /// Return at most `top_k` hits for `query`, best first. Thresholding is
    /// the implementation's concern.
    async fn recall(
        &self,
        user_id: &str,
        workspace_id: &str,
        query: &str,
        top_k: usize,
    ) -> std::result::Result<Vec<RecallHit>, MemoryError>;

    /// Make a conversation message available to later recalls.
    /// Recall backends that index elsewhere keep the default no-op.
    async fn remember(
        &self,
        _user_id: &str,
        _workspace_id: &str,
        _role: crate::message::Role,
        _content: &str,
    ) -> std::result::Result<(), MemoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_serializes_snake_case() {
        let json = serde_json::to_string(&MemoryCategory::TechStack).unwrap();
        assert_eq!(json, "\"tech_stack\"");
    }

    #[test]
    fn lenient_category_parse() {
        assert_eq!(MemoryCategory::parse_lenient(" Goal "), MemoryCategory::Goal);
        assert_eq!(MemoryCategory::parse_lenient("hobby"), MemoryCategory::General);
    }

    #[test]
    fn importance_is_clamped() {
        assert_eq!(clamp_importance(0), 1);
        assert_eq!(clamp_importance(9), 5);
        assert_eq!(clamp_importance(3), 3);
        assert_eq!(NewMemory::new(MemoryCategory::General, "x", 42).importance_score, 5);
    }
}
