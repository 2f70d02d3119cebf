//! Bootstrap configuration for the Airwave engine
//!
//! Loaded once from a TOML file at startup; command-line arguments override
//! the bind settings. Runtime-adjustable settings (enabled flag, provider
//! selection) live in the engine's SettingsStore and take effect on the next
//! transition, never mid-flight.
//!
//! Every timing constant here is tunable: the trigger window bounds in
//! particular are configuration, not invariants.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level TOML configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub providers: ProviderConfig,
}

// A derived Default would zero the port; the serde default functions only
// apply during deserialization.
impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            logging: LoggingConfig::default(),
            engine: EngineConfig::default(),
            providers: ProviderConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Timing constants for the transition orchestrator and pipeline.
///
/// Defaults follow the observed behavior of the system this engine models:
/// a ~2 second trigger window before the logical end with several seconds of
/// tolerance for outro padding, a short/primary/extended safety timer
/// hierarchy, and a minutes-scale announcement cache.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Fraction of the track that must have elapsed before pre-warm fires.
    #[serde(default = "default_prewarm_progress")]
    pub prewarm_progress: f64,

    /// Seconds of remaining time at which the fallback trigger fires.
    #[serde(default = "default_trigger_window_secs")]
    pub trigger_window_secs: f64,

    /// Seconds past the logical end still accepted as a valid trigger
    /// (tolerates outro padding and duration ambiguity).
    #[serde(default = "default_past_end_tolerance_secs")]
    pub past_end_tolerance_secs: f64,

    /// Tracks at or below this duration are ignored (ads, glitches).
    #[serde(default = "default_min_track_duration_secs")]
    pub min_track_duration_secs: f64,

    /// Request-phase watchdog: resume if no announcement is ready by then.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: f64,

    /// Primary safety timeout, armed when playback is paused.
    #[serde(default = "default_primary_timeout_secs")]
    pub primary_timeout_secs: f64,

    /// Extended safety timeout, armed once announcement playback starts.
    #[serde(default = "default_extended_timeout_secs")]
    pub extended_timeout_secs: f64,

    /// Time-to-live for cached announcements.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Capacity of the prewarmed/alerted bookkeeping sets.
    #[serde(default = "default_bounded_set_cap")]
    pub bounded_set_cap: usize,

    /// Per-entry expiry of the alerted set, so a looping playlist can be
    /// announced again.
    #[serde(default = "default_alerted_ttl_secs")]
    pub alerted_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prewarm_progress: default_prewarm_progress(),
            trigger_window_secs: default_trigger_window_secs(),
            past_end_tolerance_secs: default_past_end_tolerance_secs(),
            min_track_duration_secs: default_min_track_duration_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            primary_timeout_secs: default_primary_timeout_secs(),
            extended_timeout_secs: default_extended_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            bounded_set_cap: default_bounded_set_cap(),
            alerted_ttl_secs: default_alerted_ttl_secs(),
        }
    }
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_secs)
    }

    pub fn primary_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.primary_timeout_secs)
    }

    pub fn extended_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.extended_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn alerted_ttl(&self) -> Duration {
        Duration::from_secs(self.alerted_ttl_secs)
    }
}

/// Provider endpoints and selection defaults
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Text provider: "local" or "remote"
    #[serde(default = "default_text_provider")]
    pub text_provider: String,

    /// Speech provider: "local" or "remote"
    #[serde(default = "default_speech_provider")]
    pub speech_provider: String,

    /// Base URL of the local generation/synthesis server.
    #[serde(default = "default_local_server_url")]
    pub local_server_url: String,

    /// Base URL of the hosted generation API.
    #[serde(default = "default_remote_api_url")]
    pub remote_api_url: String,

    /// API key for the hosted provider (may also come from the environment).
    #[serde(default)]
    pub remote_api_key: Option<String>,

    /// Per-call timeout for provider HTTP requests.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            text_provider: default_text_provider(),
            speech_provider: default_speech_provider(),
            local_server_url: default_local_server_url(),
            remote_api_url: default_remote_api_url(),
            remote_api_key: None,
            provider_timeout_secs: default_provider_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

fn default_port() -> u16 {
    5760
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_prewarm_progress() -> f64 {
    0.15
}

fn default_trigger_window_secs() -> f64 {
    2.2
}

fn default_past_end_tolerance_secs() -> f64 {
    8.0
}

fn default_min_track_duration_secs() -> f64 {
    10.0
}

fn default_request_timeout_secs() -> f64 {
    4.0
}

fn default_primary_timeout_secs() -> f64 {
    6.5
}

fn default_extended_timeout_secs() -> f64 {
    30.0
}

fn default_cache_ttl_secs() -> u64 {
    600
}

fn default_bounded_set_cap() -> usize {
    50
}

fn default_alerted_ttl_secs() -> u64 {
    120
}

fn default_text_provider() -> String {
    "local".to_string()
}

fn default_speech_provider() -> String {
    "local".to_string()
}

fn default_local_server_url() -> String {
    "http://localhost:8008".to_string()
}

fn default_remote_api_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    10
}

impl TomlConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Load from a file if present, otherwise use built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.port, 5760);
        assert_eq!(config.engine.trigger_window_secs, 2.2);
        assert_eq!(config.engine.min_track_duration_secs, 10.0);
        assert_eq!(config.engine.bounded_set_cap, 50);
        assert_eq!(config.engine.cache_ttl(), Duration::from_secs(600));
        assert_eq!(config.providers.text_provider, "local");
    }

    #[test]
    fn test_load_or_default_without_file() {
        // The no-config startup path must bind the real default port, not 0.
        let config = TomlConfig::load_or_default(None).unwrap();
        assert_eq!(config.port, 5760);
        assert_eq!(config.providers.speech_provider, "local");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
            port = 6000

            [engine]
            trigger_window_secs = 3.0
        "#;
        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.engine.trigger_window_secs, 3.0);
        // Unspecified values fall back to built-in defaults
        assert_eq!(config.engine.primary_timeout_secs, 6.5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_provider_section() {
        let toml_str = r#"
            [providers]
            text_provider = "remote"
            remote_api_key = "k-123"
        "#;
        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.providers.text_provider, "remote");
        assert_eq!(config.providers.remote_api_key.as_deref(), Some("k-123"));
        assert_eq!(config.providers.local_server_url, "http://localhost:8008");
    }

    #[test]
    fn test_timeout_hierarchy_ordering() {
        // The layered hierarchy only makes sense if request < primary < extended.
        let config = EngineConfig::default();
        assert!(config.request_timeout() < config.primary_timeout());
        assert!(config.primary_timeout() < config.extended_timeout());
    }
}
