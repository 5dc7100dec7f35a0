//! Web search tool — answers a query with a research brief from the LLM.
//!
//! There is no search index behind this tool: it asks the provider for a
//! concise, factual brief in the language of the query. Provider failures are
//! returned as output text.

use std::sync::Arc;

use async_trait::async_trait;
use neonchat_core::error::ToolError;
use neonchat_core::message::Message;
use neonchat_core::provider::{Provider, ProviderRequest};
use neonchat_core::tool::Tool;
use tracing::warn;

const SEARCH_SYSTEM_PROMPT: &str = "You are a web search assistant. When given a search query, provide the most accurate, up-to-date information you can about the topic. Include specific facts, dates, numbers, and sources when possible. Format as a concise research brief. Always respond in the same language as the query.";

const SEARCH_TEMPERATURE: f32 = 0.3;

pub struct WebSearchTool {
    provider: Arc<dyn Provider>,
    model: String,
}

impl WebSearchTool {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Run one search and always come back with text.
    pub async fn search(&self, query: &str) -> String {
        let request = ProviderRequest::new(
            self.model.clone(),
            vec![
                Message::system(SEARCH_SYSTEM_PROMPT),
                Message::user(format!(
                    "Search query: \"{query}\"\n\nProvide comprehensive, factual information about this topic."
                )),
            ],
        )
        .with_temperature(SEARCH_TEMPERATURE);

        match self.provider.complete(request).await {
            Ok(response) => {
                let brief = response.message.content.text();
                if brief.trim().is_empty() {
                    "No results found.".to_string()
                } else {
                    brief
                }
            }
            Err(e) => {
                warn!(error = %e, "Web search request failed");
                match e.status_code() {
                    Some(status) => format!("Search error: {status}"),
                    None => format!("Search error: {e}"),
                }
            }
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Searches the web for up-to-date information on any topic. Use when the user asks about recent events, specific data, or information that may have changed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        Ok(self.search(query).await)
    }
}
