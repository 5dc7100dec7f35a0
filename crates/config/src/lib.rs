//! Configuration loading, validation, and management for NeonChat.
//!
//! Loads configuration from `~/.neonchat/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.neonchat/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

/// The hosted OpenAI-compatible gateway every completion goes through.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model for chat turns and the tool probe
    #[serde(default = "default_model")]
    pub model: String,

    /// Model behind the `web_search` tool
    #[serde(default = "default_search_model")]
    pub search_model: String,

    /// Model used to extract long-term memories from a conversation
    #[serde(default = "default_extraction_model")]
    pub extraction_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Timeout for non-streaming requests
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://ai.gateway.lovable.dev/v1".into()
}
fn default_model() -> String {
    "google/gemini-2.5-flash".into()
}
fn default_search_model() -> String {
    "google/gemini-2.5-flash".into()
}
fn default_extraction_model() -> String {
    "google/gemini-2.5-flash-lite".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_timeout_secs() -> u64 {
    60
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            search_model: default_search_model(),
            extraction_model: default_extraction_model(),
            embedding_model: default_embedding_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("search_model", &self.search_model)
            .field("extraction_model", &self.extraction_model)
            .field("embedding_model", &self.embedding_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Bearer token → user id. Requests without a known token are anonymous.
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

fn default_port() -> u16 {
    8787
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            tokens: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("tokens", &format_args!("[{} REDACTED]", self.tokens.len()))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Whether turns probe for tool calls when the client does not say
    #[serde(default = "default_true")]
    pub enabled_by_default: bool,

    /// Max characters of tool output sent to the client in `tool_end`
    #[serde(default = "default_wire_output_chars")]
    pub wire_output_chars: usize,

    /// Max characters of tool output kept in audit records
    #[serde(default = "default_audit_output_chars")]
    pub audit_output_chars: usize,
}

fn default_true() -> bool {
    true
}
fn default_wire_output_chars() -> usize {
    200
}
fn default_audit_output_chars() -> usize {
    1000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled_by_default: true,
            wire_output_chars: default_wire_output_chars(),
            audit_output_chars: default_audit_output_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Temperature when the user has no stored preference
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Max long-term memories rendered into the prompt
    #[serde(default = "default_memory_digest_limit")]
    pub memory_digest_limit: usize,

    #[serde(default = "default_semantic_top_k")]
    pub semantic_top_k: usize,

    /// Queries shorter than this skip semantic recall
    #[serde(default = "default_semantic_min_query_chars")]
    pub semantic_min_query_chars: usize,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_memory_digest_limit() -> usize {
    10
}
fn default_semantic_top_k() -> usize {
    5
}
fn default_semantic_min_query_chars() -> usize {
    10
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_temperature: default_temperature(),
            memory_digest_limit: default_memory_digest_limit(),
            semantic_top_k: default_semantic_top_k(),
            semantic_min_query_chars: default_semantic_min_query_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Cap on stored long-term memories per user
    #[serde(default = "default_max_per_user")]
    pub max_per_user: usize,

    /// Minimum cosine similarity for semantic recall hits
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Number of trailing messages the memory extractor reads
    #[serde(default = "default_extraction_window")]
    pub extraction_window: usize,
}

fn default_max_per_user() -> usize {
    100
}
fn default_similarity_threshold() -> f32 {
    0.3
}
fn default_extraction_window() -> usize {
    6
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_per_user: default_max_per_user(),
            similarity_threshold: default_similarity_threshold(),
            extraction_window: default_extraction_window(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.neonchat/config.toml).
    ///
    /// Also checks environment variables:
    /// - `NEONCHAT_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `NEONCHAT_BASE_URL`
    /// - `NEONCHAT_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("NEONCHAT_API_KEY").or_else(|| {
            if self.provider.api_key.is_none() {
                lookup("OPENAI_API_KEY")
            } else {
                None
            }
        }) {
            self.provider.api_key = Some(key);
        }

        if let Some(url) = lookup("NEONCHAT_BASE_URL") {
            self.provider.base_url = url;
        }

        if let Some(model) = lookup("NEONCHAT_MODEL") {
            self.provider.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".neonchat")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.context.default_temperature;
        if !(0.2..=1.2).contains(&t) {
            return Err(ConfigError::ValidationError(
                "context.default_temperature must be between 0.2 and 1.2".into(),
            ));
        }

        if self.tools.wire_output_chars == 0 || self.tools.audit_output_chars == 0 {
            return Err(ConfigError::ValidationError(
                "tools output limits must be > 0".into(),
            ));
        }

        if self.memory.max_per_user == 0 {
            return Err(ConfigError::ValidationError(
                "memory.max_per_user must be > 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.memory.similarity_threshold) {
            return Err(ConfigError::ValidationError(
                "memory.similarity_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if self.provider.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "provider.base_url must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Check if a provider credential is available.
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}
