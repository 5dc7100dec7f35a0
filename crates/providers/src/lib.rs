//! LLM provider implementations for NeonChat.
//!
//! All providers implement the `neonchat_core::Provider` trait. The pipeline
//! talks to a single hosted OpenAI-compatible gateway.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
