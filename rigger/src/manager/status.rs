//! Status aggregation

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, warn};

use crate::cache::status::StatesKey;
use crate::deployer::backend::DeploymentBackend;
use crate::errors::RiggerError;
use crate::manager::ReleaseManager;
use crate::models::release::Release;
use crate::models::status::DeploymentState;

/// Instance attribute naming the application
pub const APPLICATION_NAME_ATTRIBUTE: &str = "rigger.application.name";

/// Instance attribute naming the release
pub const RELEASE_NAME_ATTRIBUTE: &str = "rigger.release.name";

/// Instance attribute holding the release version
pub const RELEASE_VERSION_ATTRIBUTE: &str = "rigger.release.version";

impl ReleaseManager {
    /// Fill in the application statuses of a release. Failed or errored
    /// applications take their state from the cached batch query when it has
    /// an answer for them.
    pub async fn status(&self, release: Release) -> Result<Release, RiggerError> {
        self.collect_status(release, true).await
    }

    /// Application statuses straight from the backend, bypassing the cache.
    pub async fn fresh_status(&self, release: Release) -> Result<Release, RiggerError> {
        self.collect_status(release, false).await
    }

    /// Status of several releases at once
    pub async fn statuses(&self, releases: Vec<Release>) -> Result<Vec<Release>, RiggerError> {
        try_join_all(releases.into_iter().map(|r| self.status(r))).await
    }

    /// Deployment state of each deployment id of a release, from the batch
    /// query when the backend supports it.
    pub async fn deployment_states(
        &self,
        release: &Release,
    ) -> Result<BTreeMap<String, DeploymentState>, RiggerError> {
        if release.is_deleted() || release.deployments.is_empty() {
            return Ok(BTreeMap::new());
        }
        let backend = self.backend(release)?;
        let ids = release.deployment_ids();

        let states = self.cached_states(release, &backend, &ids).await?;
        if !states.is_empty() {
            return Ok(states);
        }

        let mut states = BTreeMap::new();
        for id in ids {
            let status = backend
                .status(&id)
                .await
                .map_err(|e| RiggerError::backend(format!("Could not get status of {} for release {}", id, release), e))?;
            states.insert(id, status.state);
        }
        Ok(states)
    }

    async fn cached_states(
        &self,
        release: &Release,
        backend: &Arc<dyn DeploymentBackend>,
        ids: &[String],
    ) -> Result<BTreeMap<String, DeploymentState>, RiggerError> {
        let key = StatesKey::new(ids, &release.platform_name);
        self.states_cache
            .get_or_load(key, || async {
                backend
                    .states(ids)
                    .await
                    .map(Option::unwrap_or_default)
                    .map_err(|e| RiggerError::backend(format!("Could not get states for release {}", release), e))
            })
            .await
    }

    async fn collect_status(&self, mut release: Release, use_cache: bool) -> Result<Release, RiggerError> {
        if release.is_deleted() {
            return Ok(release);
        }
        if release.deployments.is_empty() {
            warn!("Could not get status for release {}. No deployments recorded.", release);
            return Ok(release);
        }

        let backend = self.backend(&release)?;
        let ids = release.deployment_ids();
        let batch = if use_cache {
            self.cached_states(&release, &backend, &ids).await?
        } else {
            BTreeMap::new()
        };

        let mut app_statuses = Vec::with_capacity(release.deployments.len());
        for (app_name, deployment_id) in &release.deployments {
            let mut status = backend.status(deployment_id).await.map_err(|e| {
                RiggerError::backend(
                    format!("Could not get status of app [{}] for release {}", app_name, release),
                    e,
                )
            })?;
            for instance in status.instances.values_mut() {
                instance
                    .attributes
                    .insert(APPLICATION_NAME_ATTRIBUTE.to_string(), app_name.clone());
                instance
                    .attributes
                    .insert(RELEASE_NAME_ATTRIBUTE.to_string(), release.name.clone());
                instance
                    .attributes
                    .insert(RELEASE_VERSION_ATTRIBUTE.to_string(), release.version.to_string());
            }
            if status.state.is_failed() {
                if let Some(state) = batch.get(deployment_id) {
                    debug!("Using batch state {:?} for {}", state, deployment_id);
                    status.state = *state;
                }
            }
            app_statuses.push(status);
        }

        release.info.app_statuses = app_statuses;
        Ok(release)
    }
}
