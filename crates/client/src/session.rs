//! A chat session: one conversation streamed through a [`ChatClient`].

use std::sync::Arc;

use neonchat_core::{Conversation, Message, ToolLifecycle};
use tracing::{debug, warn};

use crate::attachments::Attachments;
use crate::client::{ChatClient, ChatRequest};
use crate::consumer::{Phase, StreamCallbacks, StreamOutcome};
use crate::profile::GlobalMemory;

/// Messages sent for memory extraction after a completed turn.
pub const EXTRACTION_WINDOW: usize = 6;

pub const ERROR_PREFIX: &str = "❌ Error: ";

/// One assistant reply as it streams in.
#[derive(Debug, Default)]
pub struct AssistantDraft {
    pub content: String,
    pub phase: Option<Phase>,
    pub tool_events: Vec<ToolLifecycle>,
    pub error: Option<String>,
}

impl AssistantDraft {
    /// The text to keep in the conversation. Errors are appended to
    /// whatever already arrived.
    pub fn final_text(&self) -> String {
        match &self.error {
            None => self.content.clone(),
            Some(error) if self.content.is_empty() => format!("{ERROR_PREFIX}{error}"),
            Some(error) => format!("{}\n\n{ERROR_PREFIX}{error}", self.content),
        }
    }
}

impl StreamCallbacks for AssistantDraft {
    fn on_phase(&mut self, phase: Phase) {
        self.phase = Some(phase);
    }

    fn on_tool_event(&mut self, event: &ToolLifecycle) {
        self.tool_events.push(event.clone());
    }

    fn on_delta(&mut self, text: &str) {
        self.content.push_str(text);
    }

    fn on_error(&mut self, message: &str) {
        self.error = Some(message.to_string());
    }
}

/// Forwards every callback to the draft and to the caller's observer.
struct Tee<'a> {
    draft: &'a mut AssistantDraft,
    observer: &'a mut dyn StreamCallbacks,
}

impl StreamCallbacks for Tee<'_> {
    fn on_phase(&mut self, phase: Phase) {
        self.draft.on_phase(phase);
        self.observer.on_phase(phase);
    }

    fn on_tool_event(&mut self, event: &ToolLifecycle) {
        self.draft.on_tool_event(event);
        self.observer.on_tool_event(event);
    }

    fn on_delta(&mut self, text: &str) {
        self.draft.on_delta(text);
        self.observer.on_delta(text);
    }

    fn on_done(&mut self) {
        self.observer.on_done();
    }

    fn on_error(&mut self, message: &str) {
        self.draft.on_error(message);
        self.observer.on_error(message);
    }
}

pub struct ChatSession {
    client: Arc<ChatClient>,
    conversation: Conversation,
    profile: GlobalMemory,
    attachments: Attachments,
    mode: String,
    tools: Option<bool>,
}

impl ChatSession {
    pub fn new(client: Arc<ChatClient>, profile: GlobalMemory) -> Self {
        Self {
            client,
            conversation: Conversation::new(None),
            profile,
            attachments: Attachments::new(),
            mode: "default".into(),
            tools: None,
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    pub fn with_tools(mut self, enabled: bool) -> Self {
        self.tools = Some(enabled);
        self
    }

    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.conversation.workspace_id = Some(workspace_id.into());
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn profile(&self) -> &GlobalMemory {
        &self.profile
    }

    pub fn profile_mut(&mut self) -> &mut GlobalMemory {
        &mut self.profile
    }

    pub fn attachments_mut(&mut self) -> &mut Attachments {
        &mut self.attachments
    }

    /// Send `text` (plus pending attachments) and stream the reply.
    ///
    /// The reply is appended to the conversation unless the turn was
    /// cancelled before any text arrived. A completed turn from a signed-in
    /// user also triggers memory extraction in the background.
    pub async fn send(&mut self, text: &str, observer: &mut dyn StreamCallbacks) -> StreamOutcome {
        let images = self.attachments.take_data_uris();
        self.conversation.push(Message::user(text).with_images(images));

        let mut request = ChatRequest::new(self.conversation.messages.clone())
            .with_mode(&self.mode)
            .with_global_memory_prompt(self.profile.prompt_for(text));
        request.workspace_id = self.conversation.workspace_id.clone();
        request.enable_tools = self.tools;

        let mut draft = AssistantDraft::default();
        let outcome = {
            let mut tee = Tee {
                draft: &mut draft,
                observer,
            };
            self.client.stream(&request, &mut tee).await
        };

        match outcome {
            StreamOutcome::Cancelled if draft.content.is_empty() => {
                debug!("Turn cancelled before any text");
            }
            _ => self.conversation.push(Message::assistant(draft.final_text())),
        }

        if outcome == StreamOutcome::Completed && self.client.is_authenticated() {
            self.spawn_extraction();
        }
        outcome
    }

    fn spawn_extraction(&self) {
        let messages = &self.conversation.messages;
        let window = messages[messages.len().saturating_sub(EXTRACTION_WINDOW)..].to_vec();
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.extract_memories(&window).await {
                warn!(error = %e, "Memory extraction request failed");
            }
        });
    }
}
