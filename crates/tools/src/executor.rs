//! Tool executor — runs one named tool and always yields text.
//!
//! Unknown tools, bad arguments and tool faults are all reported through the
//! output string so a tool failure never aborts the caller.

use std::time::Instant;

use neonchat_core::error::ToolError;
use neonchat_core::provider::ToolDefinition;
use neonchat_core::tool::{ToolCall, ToolRegistry, ToolResult};
use serde::Serialize;
use tracing::{debug, warn};

/// Output of a single tool run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutcome {
    pub output: String,
    pub duration_ms: u64,
}

pub struct ToolExecutor {
    registry: ToolRegistry,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Definitions of every registered tool, for the probe request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    pub fn has_tools(&self) -> bool {
        !self.registry.is_empty()
    }

    /// Run `tool_name` with `input`.
    pub async fn execute(&self, tool_name: &str, input: serde_json::Value) -> ToolOutcome {
        let started = Instant::now();

        let output = match self.registry.get(tool_name) {
            None => {
                warn!(tool = %tool_name, "Requested tool is not registered");
                format!("Tool \"{tool_name}\" not found.")
            }
            Some(tool) => match tool.execute(input).await {
                Ok(output) => output,
                Err(ToolError::InvalidArguments(reason)) => {
                    warn!(tool = %tool_name, %reason, "Invalid tool arguments");
                    format!("Invalid arguments for tool \"{tool_name}\": {reason}")
                }
                Err(e) => {
                    warn!(tool = %tool_name, error = %e, "Tool execution failed");
                    format!("Tool \"{tool_name}\" failed: {e}")
                }
            },
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(tool = %tool_name, duration_ms, output_len = output.len(), "Tool finished");

        ToolOutcome { output, duration_ms }
    }

    /// Run a model-requested call and pair the outcome with its call id.
    pub async fn execute_call(&self, call: &ToolCall) -> ToolResult {
        let outcome = self.execute(&call.name, call.arguments.clone()).await;
        ToolResult {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            output: outcome.output,
            duration_ms: outcome.duration_ms,
        }
    }
}
