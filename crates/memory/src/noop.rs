//! No-op semantic recall — disables similarity search entirely.

use async_trait::async_trait;
use neonchat_core::error::MemoryError;
use neonchat_core::memory::{RecallHit, SemanticRecall};

/// Semantic recall that never finds anything.
pub struct NoopSemanticRecall;

#[async_trait]
impl SemanticRecall for NoopSemanticRecall {
    async fn recall(
        &self,
        _user_id: &str,
        _workspace_id: &str,
        _query: &str,
        _top_k: usize,
    ) -> Result<Vec<RecallHit>, MemoryError> {
        Ok(Vec::new())
    }
}
