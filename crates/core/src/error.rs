//! Error types for the NeonChat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all NeonChat operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Context assembly ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Multimodal content ---
    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    /// HTTP 429 from the provider.
    #[error("Rate limited by provider")]
    RateLimited { retry_after_secs: Option<u64> },

    /// HTTP 402 from the provider: the account is out of credits.
    #[error("Provider quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// HTTP status the fault corresponds to on the provider side, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { status_code, .. } => Some(*status_code),
            Self::RateLimited { .. } => Some(429),
            Self::QuotaExceeded(_) => Some(402),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    /// Every stored record for the user is pinned and the cap is reached.
    #[error("Memory limit of {limit} reached for user {user_id} and every record is pinned")]
    AtCapacity { user_id: String, limit: usize },

    #[error("Memory not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Failure of one context source (settings, custom modes, memory, semantic recall).
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Settings lookup failed: {0}")]
    Settings(String),

    #[error("Custom mode lookup failed: {0}")]
    CustomMode(String),

    #[error("Memory lookup failed: {0}")]
    Memory(#[from] MemoryError),

    #[error("Semantic recall failed: {0}")]
    Semantic(String),
}

/// Failure while turning message text and image references into provider content.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Failed to fetch image {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("Image request for {url} returned status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("Invalid image reference: {0}")]
    InvalidReference(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 503,
            message: "Service unavailable".into(),
        });
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("Service unavailable"));
    }

    #[test]
    fn provider_error_status_codes() {
        assert_eq!(ProviderError::RateLimited { retry_after_secs: None }.status_code(), Some(429));
        assert_eq!(ProviderError::QuotaExceeded("no credits".into()).status_code(), Some(402));
        assert_eq!(ProviderError::Network("reset".into()).status_code(), None);
    }

    #[test]
    fn memory_capacity_error_names_user() {
        let err = MemoryError::AtCapacity {
            user_id: "u1".into(),
            limit: 100,
        };
        assert!(err.to_string().contains("u1"));
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn content_error_converts_into_top_level() {
        let err: Error = ContentError::BadStatus {
            url: "https://img.example/cat.png".into(),
            status: 404,
        }
        .into();
        assert!(matches!(err, Error::Content(_)));
        assert!(err.to_string().contains("404"));
    }
}
