//! # NeonChat Core
//!
//! Domain types, traits, and error definitions for the NeonChat completion
//! pipeline. Every collaborator the pipeline talks to (LLM provider, tools,
//! memory store, settings store, semantic recall) is a trait here, with the
//! implementations living in their own crates.
//!
//! All crates depend inward on core; core depends on nothing in the workspace.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod memory;
pub mod settings;
pub mod stream;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{ContentPart, Conversation, ConversationId, Message, MessageContent, MessageToolCall, Role};
pub use provider::{ByteStream, Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
pub use memory::{MemoryCategory, MemoryItem, MemoryStore, NewMemory, RecallHit, SemanticRecall};
pub use settings::{CustomMode, ResponseStyle, SettingsStore, UserSettings};
pub use stream::{StreamEvent, ToolLifecycle};
