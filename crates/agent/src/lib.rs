//! The completion pipeline of NeonChat.
//!
//! One chat turn goes through these steps:
//!
//! 1. **Assemble context**: layered system prompt and temperature
//! 2. **Build content**: resolve attached images into inline parts
//! 3. **Probe** (tools enabled): one non-streaming call with the tool schema
//! 4. **If tool calls**: run them concurrently, emit `tool_start`/`tool_end`,
//!    append the results and stream a follow-up request
//! 5. **Otherwise**: stream the answer directly
//!
//! Side effects (tool audit, recall indexing, memory extraction) go through
//! [`DetachedTasks`] and never hold up the turn.

pub mod audit;
pub mod content;
pub mod context;
pub mod extract;
pub mod orchestrator;
pub mod tasks;

#[cfg(test)]
mod test_helpers;

pub use audit::{InMemoryAuditSink, ToolAuditRecord, ToolAuditSink, TracingAuditSink};
pub use content::{ContentBuilder, HttpImageFetcher, ImageFetcher};
pub use context::{AssembledContext, AssemblyInput, ContextAssembler, LayerKind};
pub use extract::MemoryExtractor;
pub use orchestrator::{CompletionOrchestrator, OrchestratorConfig, Turn, TurnError, TurnRequest, TurnState};
pub use tasks::DetachedTasks;
