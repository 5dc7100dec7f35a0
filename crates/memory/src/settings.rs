//! In-memory settings and custom-mode store.

use async_trait::async_trait;
use neonchat_core::error::ContextError;
use neonchat_core::settings::{CustomMode, SettingsStore, UserSettings};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemorySettingsStore {
    settings: RwLock<HashMap<String, UserSettings>>,
    modes: RwLock<HashMap<String, CustomMode>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn settings(&self, user_id: &str) -> Result<Option<UserSettings>, ContextError> {
        Ok(self.settings.read().await.get(user_id).cloned())
    }

    async fn save_settings(&self, settings: UserSettings) -> Result<(), ContextError> {
        self.settings
            .write()
            .await
            .insert(settings.user_id.clone(), settings);
        Ok(())
    }

    async fn custom_mode(&self, user_id: &str, mode_id: &str) -> Result<Option<CustomMode>, ContextError> {
        Ok(self
            .modes
            .read()
            .await
            .get(mode_id)
            .filter(|m| m.user_id == user_id)
            .cloned())
    }

    async fn save_custom_mode(&self, mode: CustomMode) -> Result<(), ContextError> {
        self.modes.write().await.insert(mode.id.clone(), mode);
        Ok(())
    }

    async fn list_custom_modes(&self, user_id: &str) -> Result<Vec<CustomMode>, ContextError> {
        let mut modes: Vec<CustomMode> = self
            .modes
            .read()
            .await
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        modes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(modes)
    }
}
