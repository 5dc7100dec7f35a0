//! Wire vocabulary of the outbound chat stream.
//!
//! The server writes `data: <json>` lines. Tool lifecycle lines carry a
//! `type` tag and always precede the provider's own delta lines, which are
//! relayed untouched and end with `data: [DONE]`.

use serde::{Deserialize, Serialize};

/// Prefix of every payload line.
pub const DATA_PREFIX: &str = "data: ";

/// Payload of the terminal sentinel line.
pub const DONE_SENTINEL: &str = "[DONE]";

/// A tool lifecycle notification synthesized by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolLifecycle {
    ToolStart {
        tool: String,
        input: serde_json::Value,
    },
    ToolEnd {
        tool: String,
        /// Truncated for display; the model sees the full output.
        output: String,
    },
}

impl ToolLifecycle {
    pub fn tool(&self) -> &str {
        match self {
            Self::ToolStart { tool, .. } | Self::ToolEnd { tool, .. } => tool,
        }
    }

    /// Serialize as one SSE data line, blank-line terminated.
    pub fn to_line(&self) -> String {
        // Serializing a tagged enum of strings and JSON values cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        format!("{DATA_PREFIX}{json}\n\n")
    }
}

/// One decoded event as seen by a stream consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Tool(ToolLifecycle),
    /// A non-empty fragment of assistant text.
    Delta(String),
    /// The terminal sentinel.
    Done,
}

/// Truncate `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
