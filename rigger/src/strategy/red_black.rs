//! Red/black upgrade
//!
//! New instances of the upgraded applications run next to the old ones until
//! they report healthy. Unchanged applications keep their deployments, which
//! are carried over to the replacing release.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::analyzer::ReleaseAnalysisReport;
use crate::deployer::backend::AppDeploymentRequest;
use crate::errors::RiggerError;
use crate::manager::ReleaseManager;
use crate::models::manifest::read_manifest;
use crate::models::release::{Release, StatusCode};
use crate::strategy::health::HealthCheck;
use crate::strategy::{AbortReason, UpgradeStrategy};

pub struct RedBlackStrategy {
    manager: Arc<ReleaseManager>,
    health_check: HealthCheck,
}

impl RedBlackStrategy {
    pub fn new(manager: Arc<ReleaseManager>) -> Self {
        Self {
            health_check: HealthCheck::new(manager.clone()),
            manager,
        }
    }

    /// Deployment ids the target does not share with the existing release
    fn new_app_names(report: &ReleaseAnalysisReport, target: &Release) -> Vec<String> {
        report
            .application_names_to_upgrade
            .iter()
            .filter(|name| {
                target.deployments.get(*name) != report.existing_release.deployments.get(*name)
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UpgradeStrategy for RedBlackStrategy {
    async fn deploy_apps(&self, report: &ReleaseAnalysisReport) -> Result<Release, RiggerError> {
        let existing = &report.existing_release;
        let mut target = report.replacing_release.clone();
        let mut deployments = BTreeMap::new();

        for app in read_manifest(&target.manifest)? {
            let app_name = app.name().to_string();
            if report.application_names_to_upgrade.contains(&app_name) {
                let request = AppDeploymentRequest::new(&target, &app);
                match self.manager.deploy_app(&target, &request).await {
                    Ok(deployment_id) => {
                        info!("Deployed app [{}] of {} as {}", app_name, target, deployment_id);
                        deployments.insert(app_name, deployment_id);
                    }
                    Err(e) => {
                        error!("{}", e);
                        target.deployments = deployments;
                        target.set_status(StatusCode::Failed, "Could not deploy app.");
                        self.manager.store().save(&target).await?;
                        return Err(e);
                    }
                }
            } else if let Some(deployment_id) = existing.deployments.get(&app_name) {
                deployments.insert(app_name, deployment_id.clone());
            }
        }

        target.deployments = deployments;
        self.manager.store().save(&target).await
    }

    async fn check_status(
        &self,
        report: &ReleaseAnalysisReport,
        target: &Release,
    ) -> Result<bool, RiggerError> {
        self.health_check
            .is_healthy(target, &report.application_names_to_upgrade)
            .await
    }

    async fn accept(
        &self,
        report: &ReleaseAnalysisReport,
        mut target: Release,
    ) -> Result<Release, RiggerError> {
        let mut existing = report.existing_release.clone();
        let superseded = Self::new_app_names(report, &target);
        info!("Retiring apps {:?} of {}", superseded, existing);
        self.manager.undeploy_apps(&existing, &superseded).await?;

        existing.set_status(
            StatusCode::Deleted,
            format!("Superseded by version {}", target.version),
        );
        self.manager.store().save(&existing).await?;

        let description = if report.rollback {
            "Rollback complete"
        } else {
            "Upgrade complete"
        };
        target.set_status(StatusCode::Deployed, description);
        let target = self.manager.store().save(&target).await?;
        info!("{} for {}", description, target);
        Ok(target)
    }

    async fn abort(
        &self,
        report: &ReleaseAnalysisReport,
        mut target: Release,
        reason: AbortReason,
        elapsed: Duration,
    ) -> Result<Release, RiggerError> {
        let elapsed_ms = elapsed.as_millis();
        let own = Self::new_app_names(report, &target);
        let description = match reason {
            AbortReason::Cancelled => {
                info!("Cancelling upgrade to {}, undeploying {:?}", target, own);
                self.manager.undeploy_apps(&target, &own).await?;
                target.deployments.clear();
                format!("Cancelled after {} ms.", elapsed_ms)
            }
            AbortReason::TimedOut => {
                // Carried over deployments still belong to the existing release.
                target.deployments.retain(|name, _| own.contains(name));
                warn!("Apps of {} not healthy after {} ms, leaving them for diagnosis", target, elapsed_ms);
                format!(
                    "Did not detect apps in replacing release as healthy after {} ms.",
                    elapsed_ms
                )
            }
        };
        target.set_status(StatusCode::Failed, description);
        self.manager.store().save(&target).await
    }
}
