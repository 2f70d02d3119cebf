//! Runtime-adjustable settings
//!
//! Unlike the bootstrap TOML configuration, these can change while the
//! engine runs, via the HTTP settings endpoints. The engine snapshots them
//! at transition start; an in-flight transition is never reconfigured.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use super::SettingsStore;

/// Settings snapshot as seen by one transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Master switch; when false, no pre-warm and no trigger fires.
    pub enabled: bool,
    /// Text provider id selected for new transitions.
    pub text_provider: String,
    /// Speech provider id selected for new transitions.
    pub speech_provider: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            text_provider: "local".to_string(),
            speech_provider: "local".to_string(),
        }
    }
}

/// Partial update applied to the live settings; absent fields are unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub enabled: Option<bool>,
    pub text_provider: Option<String>,
    pub speech_provider: Option<String>,
}

/// Live settings shared between the HTTP layer and the engine.
#[derive(Debug)]
pub struct InMemorySettings {
    inner: RwLock<Settings>,
}

impl InMemorySettings {
    pub fn new(initial: Settings) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(initial),
        })
    }

    pub async fn apply(&self, update: SettingsUpdate) -> Settings {
        let mut settings = self.inner.write().await;
        if let Some(enabled) = update.enabled {
            settings.enabled = enabled;
        }
        if let Some(provider) = update.text_provider {
            settings.text_provider = provider;
        }
        if let Some(provider) = update.speech_provider {
            settings.speech_provider = provider;
        }
        info!(
            enabled = settings.enabled,
            text = %settings.text_provider,
            speech = %settings.speech_provider,
            "settings updated"
        );
        settings.clone()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettings {
    async fn snapshot(&self) -> Settings {
        self.inner.read().await.clone()
    }
}
