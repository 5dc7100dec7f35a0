//! Tool audit trail.
//!
//! One record per tool run, keyed by user and workspace. Records are written
//! through the detached task queue, so a slow or failing sink never touches
//! the turn.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neonchat_core::error::Error;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A single tool execution, as audited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolAuditRecord {
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub workspace_id: Option<String>,
    pub tool_name: String,
    pub input: serde_json::Value,
    /// Tool output, truncated to the configured audit length.
    pub output: String,
    pub duration_ms: u64,
}

/// Where audit records are written.
#[async_trait]
pub trait ToolAuditSink: Send + Sync {
    async fn record(&self, record: ToolAuditRecord) -> Result<(), Error>;
}

/// Writes audit records to the structured log.
pub struct TracingAuditSink;

#[async_trait]
impl ToolAuditSink for TracingAuditSink {
    async fn record(&self, record: ToolAuditRecord) -> Result<(), Error> {
        info!(
            target: "neonchat::audit",
            tool = %record.tool_name,
            user_id = record.user_id.as_deref().unwrap_or("anonymous"),
            workspace_id = record.workspace_id.as_deref().unwrap_or("-"),
            duration_ms = record.duration_ms,
            output_len = record.output.len(),
            "Tool executed"
        );
        Ok(())
    }
}

/// Keeps audit records in memory.
#[derive(Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<ToolAuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ToolAuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ToolAuditSink for InMemoryAuditSink {
    async fn record(&self, record: ToolAuditRecord) -> Result<(), Error> {
        self.records
            .lock()
            .map_err(|_| Error::Internal("audit log lock poisoned".into()))?
            .push(record);
        Ok(())
    }
}
