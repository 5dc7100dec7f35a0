//! Completion orchestrator: one chat turn from history to byte stream.
//!
//! ```text
//! PROBING ──(no tool calls / probe failed)──▶ STREAMING_DIRECT ──▶ DONE
//!    │
//!    └──(tool calls)──▶ TOOLS_REQUESTED ──▶ EXECUTING_TOOLS ──▶ STREAMING_WITH_RESULTS ──▶ DONE
//! ```
//!
//! Probing is skipped when tools are disabled. The returned stream carries
//! the tool lifecycle lines first, then the provider's streaming bytes
//! untouched. Provider errors raised before streaming starts fail the turn
//! (`FAILED`) and surface as a [`TurnError`].

use std::sync::Arc;
use std::task::Poll;

use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use neonchat_config::AppConfig;
use neonchat_core::error::{ContentError, ProviderError};
use neonchat_core::memory::SemanticRecall;
use neonchat_core::message::{Message, Role};
use neonchat_core::provider::{ByteStream, Provider, ProviderRequest, ProviderResponse};
use neonchat_core::stream::{truncate_chars, ToolLifecycle};
use neonchat_core::tool::ToolCall;
use neonchat_tools::ToolExecutor;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audit::{ToolAuditRecord, ToolAuditSink, TracingAuditSink};
use crate::content::ContentBuilder;
use crate::context::{AssemblyInput, ContextAssembler};
use crate::tasks::DetachedTasks;

// ── Types ─────────────────────────────────────────────────────────────────

/// Body of a chat request, as sent by the client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TurnRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub custom_mode_id: Option<String>,
    #[serde(default)]
    pub global_memory_prompt: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<String>,
    /// `None` uses the configured default.
    #[serde(default)]
    pub enable_tools: Option<bool>,
}

/// States a turn moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Probing,
    StreamingDirect,
    ToolsRequested,
    ExecutingTools,
    StreamingWithResults,
    Done,
    Failed,
}

/// A turn that reached streaming.
pub struct Turn {
    /// States visited before the stream was handed out.
    pub states: Vec<TurnState>,
    /// Lifecycle events at the head of `stream`.
    pub tool_events: Vec<ToolLifecycle>,
    pub stream: ByteStream,
}

impl std::fmt::Debug for Turn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Turn")
            .field("states", &self.states)
            .field("tool_events", &self.tool_events)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Conversation has no messages")]
    EmptyConversation,

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Tool call {0} has no matching result")]
    UnmatchedToolCall(String),
}

impl TurnError {
    /// HTTP status reported to the client.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::EmptyConversation | Self::Content(_) => 400,
            Self::Provider(e) => match e.status_code() {
                Some(429) => 429,
                Some(402) => 402,
                _ => 500,
            },
            Self::UnmatchedToolCall(_) => 500,
        }
    }

    /// Message safe to show to the end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyConversation => "The conversation has no messages.".into(),
            Self::Content(e) => format!("Could not process an attached image: {e}"),
            Self::Provider(ProviderError::NotConfigured(_)) => "The AI provider is not configured.".into(),
            Self::Provider(e) => match e.status_code() {
                Some(429) => "Rate limit exceeded. Try again shortly.".into(),
                Some(402) => "Insufficient credits. Add credits to your workspace.".into(),
                _ => "AI gateway error".into(),
            },
            Self::UnmatchedToolCall(_) => "AI gateway error".into(),
        }
    }
}

/// Fixed per-orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub model: String,
    pub tools_enabled_by_default: bool,
    pub wire_output_chars: usize,
    pub audit_output_chars: usize,
}

impl OrchestratorConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            model: config.provider.model.clone(),
            tools_enabled_by_default: config.tools.enabled_by_default,
            wire_output_chars: config.tools.wire_output_chars,
            audit_output_chars: config.tools.audit_output_chars,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────

pub struct CompletionOrchestrator {
    provider: Arc<dyn Provider>,
    assembler: ContextAssembler,
    content: ContentBuilder,
    executor: Arc<ToolExecutor>,
    tasks: DetachedTasks,
    audit: Arc<dyn ToolAuditSink>,
    recall: Option<Arc<dyn SemanticRecall>>,
    config: OrchestratorConfig,
}

impl CompletionOrchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        assembler: ContextAssembler,
        content: ContentBuilder,
        executor: Arc<ToolExecutor>,
        tasks: DetachedTasks,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            assembler,
            content,
            executor,
            tasks,
            audit: Arc::new(TracingAuditSink),
            recall: None,
            config,
        }
    }

    /// Send tool audit records to `sink` instead of the log.
    pub fn with_audit_sink(mut self, sink: Arc<dyn ToolAuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Index each turn's user message into `recall`.
    pub fn with_recall_indexing(mut self, recall: Arc<dyn SemanticRecall>) -> Self {
        self.recall = Some(recall);
        self
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    pub fn tasks(&self) -> &DetachedTasks {
        &self.tasks
    }

    /// Run one turn for `user_id` (anonymous when `None`).
    pub async fn run(&self, user_id: Option<&str>, request: TurnRequest) -> Result<Turn, TurnError> {
        let result = self.drive(user_id, request).await;
        if let Err(e) = &result {
            warn!(state = ?TurnState::Failed, error = %e, status = e.status_code(), "Turn failed");
        }
        result
    }

    async fn drive(&self, user_id: Option<&str>, request: TurnRequest) -> Result<Turn, TurnError> {
        let TurnRequest {
            messages,
            mode,
            custom_mode_id,
            global_memory_prompt,
            workspace_id,
            enable_tools,
        } = request;

        if messages.is_empty() {
            return Err(TurnError::EmptyConversation);
        }

        let definitions = if enable_tools.unwrap_or(self.config.tools_enabled_by_default) {
            self.executor.definitions()
        } else {
            Vec::new()
        };
        let tool_names: Vec<String> = definitions.iter().map(|d| d.name.clone()).collect();

        let latest_user = messages.iter().rposition(|m| m.role == Role::User);
        let latest_query = latest_user.map(|i| messages[i].content.text());
        let previous_reply = latest_user
            .and_then(|i| messages[..i].iter().rev().find(|m| m.role == Role::Assistant))
            .map(|m| m.content.text());

        let context = self
            .assembler
            .assemble(&AssemblyInput {
                user_id,
                workspace_id: workspace_id.as_deref(),
                mode: mode.as_deref(),
                custom_mode_id: custom_mode_id.as_deref(),
                global_memory_prompt: global_memory_prompt.as_deref(),
                latest_query: latest_query.as_deref(),
                tool_names: &tool_names,
            })
            .await;

        if let (Some(user_id), Some(workspace_id)) = (user_id, workspace_id.as_deref()) {
            let turn_text = [(Role::Assistant, previous_reply), (Role::User, latest_query)];
            for (role, text) in turn_text {
                if let Some(text) = text {
                    self.index_message(user_id, workspace_id, role, text);
                }
            }
        }

        let prepared = self.content.prepare(messages).await?;
        let mut conversation = Vec::with_capacity(prepared.len() + 1);
        conversation.push(Message::system(context.system_prompt));
        conversation.extend(prepared);

        let mut states = Vec::new();
        let mut tool_events = Vec::new();

        if !definitions.is_empty() {
            states.push(TurnState::Probing);
            let probe = ProviderRequest::new(&self.config.model, conversation.clone())
                .with_temperature(context.temperature)
                .with_tools(definitions.clone());

            match self.provider.complete(probe).await {
                Ok(response) if !response.tool_calls().is_empty() => {
                    states.push(TurnState::ToolsRequested);
                    states.push(TurnState::ExecutingTools);
                    tool_events = self
                        .run_tools(response, &mut conversation, user_id, workspace_id.as_deref())
                        .await?;
                    states.push(TurnState::StreamingWithResults);
                }
                Ok(_) => {
                    debug!("Probe requested no tools");
                    states.push(TurnState::StreamingDirect);
                }
                Err(e) => {
                    warn!(provider = self.provider.name(), error = %e, "Tool probe failed, streaming directly");
                    states.push(TurnState::StreamingDirect);
                }
            }
        } else {
            states.push(TurnState::StreamingDirect);
        }

        let request = ProviderRequest::new(&self.config.model, conversation)
            .with_temperature(context.temperature)
            .with_tools(definitions)
            .streaming();
        let upstream = self.provider.stream(request).await?;

        info!(
            provider = self.provider.name(),
            model = %self.config.model,
            state = ?states.last(),
            tool_calls = tool_events.len() / 2,
            temperature = context.temperature,
            "Streaming turn"
        );

        let head: Vec<Result<Bytes, ProviderError>> = tool_events
            .iter()
            .map(|event| Ok(Bytes::from(event.to_line())))
            .collect();
        let mut logged = false;
        let done = futures::stream::poll_fn(move |_| {
            if !logged {
                logged = true;
                debug!(state = ?TurnState::Done, "Turn stream finished");
            }
            Poll::Ready(None)
        });
        let stream = futures::stream::iter(head).chain(upstream).chain(done);

        Ok(Turn {
            states,
            tool_events,
            stream: Box::pin(stream),
        })
    }

    /// Execute every requested call and extend `conversation` with the
    /// assistant tool-call message and the results. Returns the lifecycle
    /// events in call order.
    async fn run_tools(
        &self,
        response: ProviderResponse,
        conversation: &mut Vec<Message>,
        user_id: Option<&str>,
        workspace_id: Option<&str>,
    ) -> Result<Vec<ToolLifecycle>, TurnError> {
        let calls: Vec<ToolCall> = response.tool_calls().iter().map(ToolCall::from).collect();
        debug!(count = calls.len(), "Executing requested tools");

        let results = futures::future::join_all(calls.iter().map(|call| self.executor.execute_call(call))).await;

        let mut events = Vec::with_capacity(calls.len() * 2);
        let mut result_messages = Vec::with_capacity(calls.len());
        for (call, result) in calls.iter().zip(results) {
            if result.tool_call_id != call.id {
                return Err(TurnError::UnmatchedToolCall(call.id.clone()));
            }

            events.push(ToolLifecycle::ToolStart {
                tool: call.name.clone(),
                input: call.arguments.clone(),
            });
            events.push(ToolLifecycle::ToolEnd {
                tool: call.name.clone(),
                output: truncate_chars(&result.output, self.config.wire_output_chars),
            });

            self.submit_audit(ToolAuditRecord {
                timestamp: Utc::now(),
                user_id: user_id.map(str::to_string),
                workspace_id: workspace_id.map(str::to_string),
                tool_name: call.name.clone(),
                input: call.arguments.clone(),
                output: truncate_chars(&result.output, self.config.audit_output_chars),
                duration_ms: result.duration_ms,
            });

            result_messages.push(Message::tool_result(result.tool_call_id, result.output));
        }

        conversation.push(response.message);
        conversation.extend(result_messages);
        Ok(events)
    }

    fn submit_audit(&self, record: ToolAuditRecord) {
        let sink = self.audit.clone();
        self.tasks.submit("tool_audit", async move {
            let tool = record.tool_name.clone();
            if let Err(e) = sink.record(record).await {
                warn!(tool = %tool, error = %e, "Failed to write tool audit record");
            }
        });
    }

    /// Queue `text` for semantic recall of `user_id` in `workspace_id`.
    fn index_message(&self, user_id: &str, workspace_id: &str, role: Role, text: String) {
        let Some(recall) = &self.recall else {
            return;
        };
        if text.trim().is_empty() {
            return;
        }
        let recall = recall.clone();
        let user_id = user_id.to_string();
        let workspace_id = workspace_id.to_string();
        self.tasks.submit("recall_index", async move {
            if let Err(e) = recall.remember(&user_id, &workspace_id, role, &text).await {
                warn!(user_id = %user_id, workspace_id = %workspace_id, error = %e, "Failed to index message for recall");
            }
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
