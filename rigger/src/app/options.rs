//! Application configuration options

use std::time::Duration;

use crate::logs::LogOptions;
use crate::orchestrator::fsm::FsmSettings;
use crate::settings::Settings;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Logging configuration
    pub log: LogOptions,

    /// Lifetime of cached backend states
    pub status_cache_ttl: Duration,

    /// FSM settings
    pub fsm_settings: FsmSettings,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            log: LogOptions::default(),
            status_cache_ttl: Duration::from_secs(30),
            fsm_settings: FsmSettings::default(),
        }
    }
}

impl From<&Settings> for AppOptions {
    fn from(settings: &Settings) -> Self {
        let orchestrator = &settings.orchestrator;
        let platform_upgrade_timeouts = settings
            .platforms
            .iter()
            .filter_map(|(name, platform)| {
                platform
                    .upgrade_timeout_ms
                    .map(|ms| (name.clone(), Duration::from_millis(ms)))
            })
            .collect();

        Self {
            log: LogOptions {
                log_level: settings.log_level,
                ..LogOptions::default()
            },
            status_cache_ttl: Duration::from_secs(orchestrator.status_cache_ttl_secs),
            fsm_settings: FsmSettings {
                check_interval: Duration::from_millis(orchestrator.check_interval_ms),
                upgrade_timeout: Duration::from_millis(orchestrator.upgrade_timeout_ms),
                platform_upgrade_timeouts,
                mailbox_capacity: orchestrator.mailbox_capacity,
            },
        }
    }
}
