//! Release lifecycle state machine

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// FSM settings
#[derive(Debug, Clone)]
pub struct FsmSettings {
    /// Delay between two health checks of the target apps
    pub check_interval: Duration,

    /// Health check cutoff when neither the request nor the platform sets one
    pub upgrade_timeout: Duration,

    /// Per platform health check cutoff
    pub platform_upgrade_timeouts: HashMap<String, Duration>,

    /// Pending commands per release before new ones are refused
    pub mailbox_capacity: usize,
}

impl FsmSettings {
    /// Cutoff for an upgrade: the request's, else the platform's, else the default
    pub fn upgrade_timeout_for(&self, platform: &str, requested: Option<Duration>) -> Duration {
        requested
            .or_else(|| self.platform_upgrade_timeouts.get(platform).copied())
            .unwrap_or(self.upgrade_timeout)
    }
}

impl Default for FsmSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_millis(1000),
            upgrade_timeout: Duration::from_secs(300),
            platform_upgrade_timeouts: HashMap::new(),
            mailbox_capacity: 32,
        }
    }
}

/// Release lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseState {
    /// Idle, ready for a new operation
    Initial,

    /// An action failed, the captured error goes to the caller
    Error,

    InstallInstall,

    UpgradeStart,
    UpgradeDeployTargetApps,

    /// Waiting for the next health check
    UpgradeWaitTargetApps,
    UpgradeCheckTargetApps,
    UpgradeDeploySucceeded,
    UpgradeDeployFailed,
    UpgradeCancel,
    UpgradeDeleteSourceApps,

    DeleteDelete,

    ScaleScale,

    RollbackStart,
}

impl ReleaseState {
    /// States where an upgrade may still be cancelled
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            ReleaseState::UpgradeWaitTargetApps | ReleaseState::UpgradeCheckTargetApps
        )
    }
}

/// Release lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseEvent {
    Install,
    Upgrade,
    Rollback,
    Delete,
    Scale,
    UpgradeCancel,

    /// Health check timer fired
    CheckTargetApps,

    /// The current state's action finished
    Completed,

    /// Rollback of a deleted release, replayed as an install
    RollbackAsInstall,

    /// Rollback of a live release, replayed as an upgrade
    RollbackAsUpgrade,

    Healthy,
    NotHealthy,
    CutoffElapsed,

    /// The current state's action raised an error
    Failed,
}

/// Release lifecycle FSM
#[derive(Debug, Clone)]
pub struct ReleaseFsm {
    state: ReleaseState,
}

impl ReleaseFsm {
    /// Create a new FSM in initial state
    pub fn new() -> Self {
        Self {
            state: ReleaseState::Initial,
        }
    }

    /// Get current state
    pub fn state(&self) -> ReleaseState {
        self.state
    }

    /// Whether an event would be accepted in the current state
    pub fn accepts(&self, event: ReleaseEvent) -> bool {
        Self::transition(self.state, event).is_some()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: ReleaseEvent) -> Result<ReleaseState, String> {
        match Self::transition(self.state, event) {
            Some(next) => {
                self.state = next;
                Ok(next)
            }
            None => Err(format!("Invalid transition: {:?} -> {:?}", self.state, event)),
        }
    }

    /// Return to initial whatever the current state
    pub fn reset(&mut self) {
        self.state = ReleaseState::Initial;
    }

    fn transition(state: ReleaseState, event: ReleaseEvent) -> Option<ReleaseState> {
        use ReleaseEvent as E;
        use ReleaseState as S;

        let next = match (state, event) {
            // From Initial
            (S::Initial, E::Install) => S::InstallInstall,
            (S::Initial, E::Upgrade) => S::UpgradeStart,
            (S::Initial, E::Rollback) => S::RollbackStart,
            (S::Initial, E::Delete) => S::DeleteDelete,
            (S::Initial, E::Scale) => S::ScaleScale,

            // Single step operations
            (S::InstallInstall | S::DeleteDelete | S::ScaleScale, E::Completed) => S::Initial,

            // Rollback funnels into install or upgrade
            (S::RollbackStart, E::RollbackAsInstall) => S::InstallInstall,
            (S::RollbackStart, E::RollbackAsUpgrade) => S::UpgradeStart,

            // Upgrade
            (S::UpgradeStart, E::Completed) => S::UpgradeDeployTargetApps,
            (S::UpgradeDeployTargetApps, E::Completed) => S::UpgradeWaitTargetApps,
            (S::UpgradeWaitTargetApps, E::CheckTargetApps) => S::UpgradeCheckTargetApps,
            (S::UpgradeWaitTargetApps | S::UpgradeCheckTargetApps, E::UpgradeCancel) => {
                S::UpgradeCancel
            }
            (S::UpgradeCheckTargetApps, E::NotHealthy) => S::UpgradeWaitTargetApps,
            (S::UpgradeCheckTargetApps, E::Healthy) => S::UpgradeDeploySucceeded,
            (S::UpgradeCheckTargetApps, E::CutoffElapsed) => S::UpgradeDeployFailed,
            (S::UpgradeDeploySucceeded, E::Completed) => S::UpgradeDeleteSourceApps,
            (
                S::UpgradeDeleteSourceApps | S::UpgradeCancel | S::UpgradeDeployFailed,
                E::Completed,
            ) => S::Initial,

            // Errors
            (S::Error, E::Completed) => S::Initial,
            (S::Initial | S::Error, E::Failed) => return None,
            (_, E::Failed) => S::Error,

            _ => return None,
        };
        Some(next)
    }
}

impl Default for ReleaseFsm {
    fn default() -> Self {
        Self::new()
    }
}
