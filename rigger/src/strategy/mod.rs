//! Upgrade strategies, resolved by manifest kind

pub mod health;
pub mod red_black;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::analyzer::ReleaseAnalysisReport;
use crate::errors::RiggerError;
use crate::models::release::Release;

pub use health::HealthCheck;
pub use red_black::RedBlackStrategy;

/// Manifest kind handled by the red/black strategy
pub const DEPLOYER_APPLICATION_KIND: &str = "DeployerApplication";

/// Why an upgrade attempt is abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The caller cancelled while waiting for health
    Cancelled,

    /// The cutoff elapsed before the targets became healthy
    TimedOut,
}

/// Staged rollout of a replacing release
#[async_trait]
pub trait UpgradeStrategy: Send + Sync {
    /// Deploy the upgrade set for the replacing release, returning it with its
    /// deployments recorded
    async fn deploy_apps(&self, report: &ReleaseAnalysisReport) -> Result<Release, RiggerError>;

    /// Whether the target applications are healthy
    async fn check_status(
        &self,
        report: &ReleaseAnalysisReport,
        target: &Release,
    ) -> Result<bool, RiggerError>;

    /// Promote the target and retire the superseded source applications
    async fn accept(
        &self,
        report: &ReleaseAnalysisReport,
        target: Release,
    ) -> Result<Release, RiggerError>;

    /// Abandon the target, leaving the existing release serving
    async fn abort(
        &self,
        report: &ReleaseAnalysisReport,
        target: Release,
        reason: AbortReason,
        elapsed: Duration,
    ) -> Result<Release, RiggerError>;
}

/// Kind to strategy map, populated at startup
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn UpgradeStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: impl Into<String>, strategy: Arc<dyn UpgradeStrategy>) -> Self {
        self.strategies.insert(kind.into(), strategy);
        self
    }

    /// Get the strategy for a manifest kind
    pub fn get(&self, kind: &str) -> Result<Arc<dyn UpgradeStrategy>, RiggerError> {
        self.strategies.get(kind).cloned().ok_or_else(|| {
            RiggerError::Validation(format!(
                "No upgrade strategy supports manifest kind [{}], supported kinds are {:?}",
                kind,
                self.kinds()
            ))
        })
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.strategies.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}
