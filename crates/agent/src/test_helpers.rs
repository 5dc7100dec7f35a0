//! Shared test helpers for orchestration tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use bytes::Bytes;
use neonchat_core::error::ProviderError;
use neonchat_core::message::{Message, MessageToolCall};
use neonchat_core::provider::{
    ByteStream, EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage,
};

/// A mock provider with scripted `complete` and `stream` results.
///
/// Each call pops the next scripted result. Panics when a queue runs dry.
/// Every request is recorded for later inspection.
#[derive(Default)]
pub struct ScriptedProvider {
    completions: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    streams: Mutex<VecDeque<Result<Vec<String>, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete_with(self, result: Result<ProviderResponse, ProviderError>) -> Self {
        self.completions.lock().unwrap().push_back(result);
        self
    }

    /// Script one streaming call that yields `chunks` as separate byte chunks.
    pub fn stream_chunks(self, chunks: &[&str]) -> Self {
        self.streams
            .lock()
            .unwrap()
            .push_back(Ok(chunks.iter().map(|c| c.to_string()).collect()));
        self
    }

    pub fn stream_error(self, error: ProviderError) -> Self {
        self.streams.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn complete_calls(&self) -> usize {
        self.requests().iter().filter(|r| !r.stream).count()
    }

    pub fn stream_calls(&self) -> usize {
        self.requests().iter().filter(|r| r.stream).count()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedProvider: no more completions")
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ByteStream, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let chunks = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedProvider: no more streams")?;
        Ok(Box::pin(futures::stream::iter(
            chunks.into_iter().map(|c| Ok::<_, ProviderError>(Bytes::from(c))),
        )))
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response that requests the given tool calls.
pub fn make_tool_call_response(calls: &[(&str, &str, &str)]) -> ProviderResponse {
    let tool_calls = calls
        .iter()
        .map(|(id, name, arguments)| MessageToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        })
        .collect();
    ProviderResponse {
        message: Message::assistant_tool_calls(tool_calls),
        usage: None,
        model: "mock-model".into(),
    }
}

/// One provider delta line in OpenAI streaming framing.
pub fn delta_line(text: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": text}}]})
    )
}

/// Embeds text on two axes, "rust" and "database". Chat calls fail.
pub struct KeywordEmbedder;

#[async_trait::async_trait]
impl Provider for KeywordEmbedder {
    fn name(&self) -> &str {
        "keywords"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured("embeddings only".into()))
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        let embeddings = request
            .inputs
            .iter()
            .map(|text| {
                let t = text.to_lowercase();
                let axis = |word: &str| if t.contains(word) { 1.0 } else { 0.0 };
                vec![axis("rust"), axis("database"), 0.1]
            })
            .collect();
        Ok(EmbeddingResponse {
            embeddings,
            model: request.model,
        })
    }
}
