// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for the CellCog SDK
//!
//! Handles loading and saving settings from ~/.cellcog/settings.json.
//! The API key is resolved from the environment first (`CELLCOG_API_KEY`),
//! falling back to the stored value, so keys never have to live on disk.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CellCogError, Result};

/// Main settings structure, stored in ~/.cellcog/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// API endpoint and credential configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Defaults for wait/poll operations
    #[serde(default)]
    pub wait: WaitSettings,

    /// File transfer behavior
    #[serde(default)]
    pub transfer: TransferSettings,

    /// Retry and resilience settings for upload calls
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

/// API endpoint and credential configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL for the API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Account email, for display in error messages only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Defaults for wait/poll operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitSettings {
    /// Maximum wall-clock seconds a wait may take before TimedOut
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Seconds between status polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Recovery messages sent before a stalled chat is declared errored
    #[serde(default = "default_revival_attempts")]
    pub revival_attempts: u32,
}

/// File transfer behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Root directory for default download locations
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Whether a failed download still advances the seen index for that
    /// message. On: the failure is flagged in the manifest and the chat
    /// makes progress. Off: the message is re-processed next cycle.
    #[serde(default = "default_true")]
    pub advance_on_failed_download: bool,
}

/// Retry and resilience settings for upload calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds (exponentially increased)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter percentage (0.0 to 1.0)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

// Default value functions
fn default_api_key_env() -> String {
    "CELLCOG_API_KEY".to_string()
}

fn default_base_url() -> String {
    "https://cellcog.ai/api".to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_revival_attempts() -> u32 {
    2
}

fn default_download_dir() -> PathBuf {
    Settings::cellcog_home().join("chats")
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    16000
}

fn default_jitter() -> f64 {
    0.25
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            email: None,
        }
    }
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            revival_attempts: default_revival_attempts(),
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            advance_on_failed_download: default_true(),
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl Settings {
    /// Get the CellCog home directory (~/.cellcog)
    pub fn cellcog_home() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cellcog")
    }

    /// Get the default settings file path.
    pub fn default_path() -> PathBuf {
        Self::cellcog_home().join("settings.json")
    }

    /// Load settings from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from a specific path.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the API key: environment variable first, stored value second.
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var(&self.api.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api.api_key.clone())
    }

    /// Resolve the API base URL, honoring the `CELLCOG_API_URL` override.
    pub fn resolved_base_url(&self) -> String {
        std::env::var("CELLCOG_API_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.api.base_url.clone())
    }

    /// Get the API key or a configuration error explaining how to set it.
    pub fn require_api_key(&self) -> Result<String> {
        self.resolved_api_key().ok_or_else(|| {
            CellCogError::Config(format!(
                "CellCog SDK not configured. Set your API key:\n  export {}=\"sk_...\"\n\
                 Get a key from https://cellcog.ai/profile?tab=api-keys",
                self.api.api_key_env
            ))
        })
    }

    /// Shortened key for status display, e.g. "sk_abc...".
    pub fn api_key_prefix(&self) -> Option<String> {
        self.resolved_api_key()
            .map(|k| format!("{}...", &k[..k.len().min(6)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.api.base_url, "https://cellcog.ai/api");
        assert_eq!(settings.api.api_key_env, "CELLCOG_API_KEY");
        assert_eq!(settings.wait.timeout_secs, 600);
        assert_eq!(settings.wait.poll_interval_secs, 10);
        assert_eq!(settings.wait.revival_attempts, 2);
        assert!(settings.transfer.advance_on_failed_download);
    }

    #[test]
    fn test_resilience_defaults() {
        let config = ResilienceConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 16000);
        assert!((config.jitter - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.api.base_url, "https://cellcog.ai/api");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.api.email = Some("dev@example.com".to_string());
        settings.wait.timeout_secs = 120;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.api.email.as_deref(), Some("dev@example.com"));
        assert_eq!(loaded.wait.timeout_secs, 120);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"wait": {"timeout_secs": 60}}"#).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.wait.timeout_secs, 60);
        assert_eq!(settings.wait.poll_interval_secs, 10);
        assert_eq!(settings.api.base_url, "https://cellcog.ai/api");
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(Settings::load_from(&path).is_err());
    }

    #[test]
    fn test_require_api_key_error_mentions_env_var() {
        let mut settings = Settings::default();
        // Point at a variable that is certainly unset.
        settings.api.api_key_env = "CELLCOG_TEST_UNSET_KEY".to_string();
        let err = settings.require_api_key().unwrap_err();
        assert!(err.to_string().contains("CELLCOG_TEST_UNSET_KEY"));
    }

    #[test]
    fn test_stored_key_used_when_env_unset() {
        let mut settings = Settings::default();
        settings.api.api_key_env = "CELLCOG_TEST_UNSET_KEY_2".to_string();
        settings.api.api_key = Some("sk_stored_key".to_string());
        assert_eq!(settings.resolved_api_key().as_deref(), Some("sk_stored_key"));
        assert_eq!(settings.api_key_prefix().as_deref(), Some("sk_sto..."));
    }
}
