//! Built-in tools for NeonChat.
//!
//! Two tools are available to the model: `math` (a safe arithmetic
//! evaluator) and `web_search` (a research brief produced by the LLM).
//! [`ToolExecutor`] runs them by name and never fails.

pub mod executor;
pub mod math;
pub mod web_search;

use std::sync::Arc;

use neonchat_core::provider::Provider;
use neonchat_core::tool::ToolRegistry;

pub use executor::{ToolExecutor, ToolOutcome};

/// Create a registry with all built-in tools.
///
/// `web_search` calls `provider` with `search_model`.
pub fn default_registry(provider: Arc<dyn Provider>, search_model: impl Into<String>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(math::MathTool));
    registry.register(Box::new(web_search::WebSearchTool::new(provider, search_model)));
    registry
}
