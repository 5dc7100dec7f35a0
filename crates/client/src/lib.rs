//! # NeonChat Client
//!
//! Consumes the gateway's chat stream.
//!
//! - [`decoder`]: pure incremental line decoder (`(state, bytes) -> (events, state)`)
//! - [`consumer`]: drives a byte stream into [`StreamCallbacks`], with phases
//!   and silent cancellation
//! - [`ChatClient`]: HTTP client with single-flight abort
//! - [`ChatSession`]: conversation bookkeeping on top of the client
//! - [`profile`]: the client-side global memory prompt
//! - [`attachments`]: image attachments as inline data URIs

pub mod attachments;
pub mod client;
pub mod consumer;
pub mod decoder;
pub mod error;
pub mod profile;
pub mod session;

pub use attachments::{Attachment, Attachments};
pub use client::{ChatClient, ChatRequest};
pub use consumer::{Phase, StreamCallbacks, StreamOutcome, consume};
pub use decoder::DecoderState;
pub use error::ClientError;
pub use neonchat_core::{StreamEvent, ToolLifecycle};
pub use profile::{GlobalMemory, ProfileFile};
pub use session::{AssistantDraft, ChatSession};
