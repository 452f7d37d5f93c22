//! Settings file management

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::RiggerError;
use crate::logs::LogLevel;

/// Orchestrator settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// State machine and cache tuning
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Per platform overrides, keyed by platform name
    #[serde(default)]
    pub platforms: HashMap<String, PlatformSettings>,
}

impl Settings {
    /// Load settings from a JSON file, defaults when the file does not exist
    pub async fn load(path: &Path) -> Result<Self, RiggerError> {
        if !tokio::fs::try_exists(path).await? {
            info!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| RiggerError::ConfigError(format!("Invalid settings file {}: {}", path.display(), e)))?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }
}

/// State machine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Delay between two health checks of an upgrade
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// Health check cutoff of an upgrade
    #[serde(default = "default_upgrade_timeout_ms")]
    pub upgrade_timeout_ms: u64,

    /// Lifetime of cached backend states
    #[serde(default = "default_status_cache_ttl_secs")]
    pub status_cache_ttl_secs: u64,

    /// Commands queued per release before new ones are refused
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

fn default_check_interval_ms() -> u64 {
    1000
}

fn default_upgrade_timeout_ms() -> u64 {
    300_000
}

fn default_status_cache_ttl_secs() -> u64 {
    30
}

fn default_mailbox_capacity() -> usize {
    32
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            upgrade_timeout_ms: default_upgrade_timeout_ms(),
            status_cache_ttl_secs: default_status_cache_ttl_secs(),
            mailbox_capacity: default_mailbox_capacity(),
        }
    }
}

/// Platform settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformSettings {
    /// Health check cutoff for upgrades on this platform
    #[serde(default)]
    pub upgrade_timeout_ms: Option<u64>,
}
