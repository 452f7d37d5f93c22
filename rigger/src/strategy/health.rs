//! Health check of the target applications

use std::sync::Arc;

use tracing::debug;

use crate::errors::RiggerError;
use crate::manager::ReleaseManager;
use crate::models::release::Release;
use crate::models::status::DeploymentState;

/// Healthy means every upgraded application reports `deployed`
pub struct HealthCheck {
    manager: Arc<ReleaseManager>,
}

impl HealthCheck {
    pub fn new(manager: Arc<ReleaseManager>) -> Self {
        Self { manager }
    }

    pub async fn is_healthy(&self, target: &Release, app_names: &[String]) -> Result<bool, RiggerError> {
        let release = self.manager.fresh_status(target.clone()).await?;

        for app_name in app_names {
            let Some(deployment_id) = release.deployments.get(app_name) else {
                debug!("App [{}] of {} has no deployment yet", app_name, release);
                return Ok(false);
            };
            let state = release
                .info
                .app_statuses
                .iter()
                .find(|s| &s.deployment_id == deployment_id)
                .map(|s| s.state)
                .unwrap_or_default();
            if state != DeploymentState::Deployed {
                debug!("App [{}] of {} is {:?}", app_name, release, state);
                return Ok(false);
            }
        }
        Ok(true)
    }
}
