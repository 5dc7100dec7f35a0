//! HTTP client for the gateway's chat endpoint.
//!
//! At most one turn streams at a time: starting a turn cancels the one
//! before it, silently.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use neonchat_core::Message;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::consumer::{self, Phase, StreamCallbacks, StreamOutcome};
use crate::error::ClientError;

const BUILTIN_MODES: [&str; 4] = ["study", "agent", "plan", "ask"];

/// Body of `POST /v1/chat`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_mode_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_memory_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_tools: Option<bool>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Select a mode by name. `"default"` clears it; names that are not
    /// built in are sent as a custom mode id as well.
    pub fn with_mode(mut self, mode: &str) -> Self {
        let (mode, custom) = resolve_mode(mode);
        self.mode = mode;
        self.custom_mode_id = custom;
        self
    }

    pub fn with_global_memory_prompt(mut self, prompt: Option<String>) -> Self {
        self.global_memory_prompt = prompt;
        self
    }

    pub fn with_tools(mut self, enabled: bool) -> Self {
        self.enable_tools = Some(enabled);
        self
    }

    fn has_images(&self) -> bool {
        self.messages.iter().any(Message::has_images)
    }
}

/// `(mode, custom_mode_id)` for a mode name picked by the user.
pub fn resolve_mode(mode: &str) -> (Option<String>, Option<String>) {
    let mode = mode.trim();
    if mode.is_empty() || mode == "default" {
        (None, None)
    } else if BUILTIN_MODES.contains(&mode) {
        (Some(mode.to_string()), None)
    } else {
        (Some(mode.to_string()), Some(mode.to_string()))
    }
}

pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    /// The turn in flight, by sequence number.
    current: Mutex<Option<(u64, CancellationToken)>>,
    turns: AtomicU64,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            current: Mutex::new(None),
            turns: AtomicU64::new(0),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Bound on connecting to the gateway. The stream itself is unbounded.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Cancel the turn in flight, if any.
    pub fn abort(&self) {
        if let Some((_, token)) = self.lock_current().take() {
            debug!("Aborting previous turn");
            token.cancel();
        }
    }

    /// Stream one turn into `callbacks`, cancelling any turn in flight.
    pub async fn stream(&self, request: &ChatRequest, callbacks: &mut dyn StreamCallbacks) -> StreamOutcome {
        let (turn, cancel) = self.begin();
        let _in_flight = InFlight { client: self, turn };
        let phase = Phase::initial(request.has_images());
        callbacks.on_phase(phase);

        let send = self.authorized(self.http.post(format!("{}/v1/chat", self.base_url))).json(request).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamOutcome::Cancelled,
            response = send => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Chat request failed");
                callbacks.on_error(&e.to_string());
                return StreamOutcome::Failed;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StreamOutcome::Cancelled,
                body = response.text() => error_message(status.as_u16(), &body.unwrap_or_default()),
            };
            warn!(status = status.as_u16(), %message, "Gateway rejected the turn");
            callbacks.on_error(&message);
            return StreamOutcome::Failed;
        }

        let outcome = consumer::consume(response.bytes_stream(), phase, callbacks, &cancel).await;
        info!(?outcome, "Turn finished");
        outcome
    }

    /// Ask the gateway to extract long-term memories from `messages`.
    /// Requires a token; the gateway answers before extraction runs.
    pub async fn extract_memories(&self, messages: &[Message]) -> Result<(), ClientError> {
        self.authorized(self.http.post(format!("{}/v1/memory/extract", self.base_url)))
            .json(&serde_json::json!({ "messages": messages }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let turn = self.turns.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        if let Some((_, previous)) = self.lock_current().replace((turn, token.clone())) {
            previous.cancel();
        }
        (turn, token)
    }

    /// Forget `turn` if it is still the one in flight.
    fn finish(&self, turn: u64) {
        let mut current = self.lock_current();
        if current.as_ref().is_some_and(|(id, _)| *id == turn) {
            *current = None;
        }
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<(u64, CancellationToken)>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases the in-flight slot when a turn ends, on every exit path.
struct InFlight<'a> {
    client: &'a ChatClient,
    turn: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.client.finish(self.turn);
    }
}

/// The `error` field of a JSON error body, or a status line.
pub fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| format!("Error {status}"))
}
