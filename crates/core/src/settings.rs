//! Per-user personalization: settings and user-defined modes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::ContextError;

/// Lowest temperature a user preference can produce.
pub const MIN_TEMPERATURE: f32 = 0.2;
/// Highest temperature a user preference can produce.
pub const MAX_TEMPERATURE: f32 = 1.2;
/// Temperature used when no preference applies.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// How long the user wants answers to be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStyle {
    Concise,
    #[default]
    Balanced,
    Detailed,
}

impl ResponseStyle {
    /// Prompt directive for this style; `Balanced` adds nothing.
    pub fn directive(&self) -> Option<&'static str> {
        match self {
            Self::Concise => Some(
                "Keep answers short and direct. Prefer a few sentences or a tight list; skip preambles and recaps.",
            ),
            Self::Balanced => None,
            Self::Detailed => Some(
                "Give thorough, detailed answers. Explain the reasoning, cover edge cases and include examples where they help.",
            ),
        }
    }
}

/// Stored preferences of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: String,

    /// Free-form personality override appended after the base personality.
    #[serde(default)]
    pub personality_prompt: Option<String>,

    #[serde(default = "default_mode")]
    pub default_mode: String,

    #[serde(default = "default_temperature")]
    pub temperature_preference: f32,

    #[serde(default)]
    pub response_style: ResponseStyle,
}

fn default_mode() -> String {
    "default".into()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

impl UserSettings {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            personality_prompt: None,
            default_mode: default_mode(),
            temperature_preference: DEFAULT_TEMPERATURE,
            response_style: ResponseStyle::default(),
        }
    }

    /// The preferred temperature clamped to the supported range.
    /// Non-finite preferences fall back to the default.
    pub fn effective_temperature(&self) -> f32 {
        if self.temperature_preference.is_finite() {
            self.temperature_preference.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
        } else {
            DEFAULT_TEMPERATURE
        }
    }
}

/// A user-defined instruction overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMode {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub instructions: String,
    pub created_at: DateTime<Utc>,
}

/// Read/write access to settings and custom modes.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn settings(&self, user_id: &str) -> std::result::Result<Option<UserSettings>, ContextError>;

    async fn save_settings(&self, settings: UserSettings) -> std::result::Result<(), ContextError>;

    /// A custom mode by id, only if it belongs to `user_id`.
    async fn custom_mode(&self, user_id: &str, mode_id: &str) -> std::result::Result<Option<CustomMode>, ContextError>;

    async fn save_custom_mode(&self, mode: CustomMode) -> std::result::Result<(), ContextError>;

    async fn list_custom_modes(&self, user_id: &str) -> std::result::Result<Vec<CustomMode>, ContextError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults_from_sparse_json() {
        let s: UserSettings = serde_json::from_str(r#"{"user_id":"u1"}"#).unwrap();
        assert_eq!(s.default_mode, "default");
        assert_eq!(s.response_style, ResponseStyle::Balanced);
        assert!((s.temperature_preference - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn temperature_is_clamped() {
        let mut s = UserSettings::new("u1");
        s.temperature_preference = 2.0;
        assert!((s.effective_temperature() - MAX_TEMPERATURE).abs() < f32::EPSILON);
        s.temperature_preference = 0.0;
        assert!((s.effective_temperature() - MIN_TEMPERATURE).abs() < f32::EPSILON);
        s.temperature_preference = f32::NAN;
        assert!((s.effective_temperature() - DEFAULT_TEMPERATURE).abs() < f32::EPSILON);
    }

    #[test]
    fn balanced_style_adds_no_directive() {
        assert!(ResponseStyle::Balanced.directive().is_none());
        assert!(ResponseStyle::Concise.directive().is_some());
        assert!(ResponseStyle::Detailed.directive().is_some());
    }
}
