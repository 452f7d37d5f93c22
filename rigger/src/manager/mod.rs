//! Release manager
//!
//! Bridges the orchestrator to the deployment backends and the release store:
//! raw installs, status aggregation, scaling, deletion and log retrieval.

pub mod report;
pub mod status;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::analyzer::ReleaseAnalyzer;
use crate::cache::status::StatesCache;
use crate::deployer::backend::{AppDeploymentRequest, DeploymentBackend};
use crate::deployer::registry::DeployerRegistry;
use crate::errors::RiggerError;
use crate::models::manifest::read_manifest;
use crate::models::release::{Release, StatusCode};
use crate::models::request::ScaleRequest;
use crate::render::ManifestRenderer;
use crate::store::ReleaseStore;

pub use report::ReportOptions;

/// Release manager
pub struct ReleaseManager {
    store: Arc<dyn ReleaseStore>,
    registry: DeployerRegistry,
    analyzer: ReleaseAnalyzer,
    renderer: Arc<dyn ManifestRenderer>,
    states_cache: StatesCache,
}

impl ReleaseManager {
    pub fn new(
        store: Arc<dyn ReleaseStore>,
        registry: DeployerRegistry,
        analyzer: ReleaseAnalyzer,
        renderer: Arc<dyn ManifestRenderer>,
        status_cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            analyzer,
            renderer,
            states_cache: StatesCache::new(status_cache_ttl),
        }
    }

    pub fn registry(&self) -> &DeployerRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ReleaseStore> {
        &self.store
    }

    fn backend(&self, release: &Release) -> Result<Arc<dyn DeploymentBackend>, RiggerError> {
        self.registry.get(&release.platform_name)
    }

    /// Persist a release and deploy every application of its manifest.
    pub async fn install(&self, release: Release) -> Result<Release, RiggerError> {
        let mut release = self.store.save(&release).await?;
        let backend = self.backend(&release)?;
        info!("Installing release {}", release);

        for app in read_manifest(&release.manifest)? {
            let request = AppDeploymentRequest::new(&release, &app);
            match backend.deploy(&request).await {
                Ok(deployment_id) => {
                    debug!("Deployed app [{}] as {}", request.app_name, deployment_id);
                    release.deployments.insert(request.app_name, deployment_id);
                }
                Err(e) => {
                    error!("Could not install app [{}] of {}: {}", request.app_name, release, e);
                    release.set_status(StatusCode::Failed, "Install failed");
                    self.store.save(&release).await?;
                    return Err(RiggerError::backend(
                        format!("Could not install app [{}] of release {}", request.app_name, release),
                        e,
                    ));
                }
            }
        }

        release.set_status(StatusCode::Deployed, "Install complete");
        let release = self.store.save(&release).await?;
        info!("Installed release {}", release);
        self.status(release).await
    }

    /// Deploy one application for a release, returning its deployment id.
    pub async fn deploy_app(
        &self,
        release: &Release,
        request: &AppDeploymentRequest,
    ) -> Result<String, RiggerError> {
        self.backend(release)?.deploy(request).await.map_err(|e| {
            RiggerError::backend(
                format!("Could not deploy app [{}] of release {}", request.app_name, release),
                e,
            )
        })
    }

    /// Undeploy the named applications of a release. Failures are logged and
    /// the remaining applications are still undeployed.
    pub async fn undeploy_apps(&self, release: &Release, app_names: &[String]) -> Result<(), RiggerError> {
        let backend = self.backend(release)?;
        for app_name in app_names {
            let Some(deployment_id) = release.deployments.get(app_name) else {
                continue;
            };
            match backend.undeploy(deployment_id).await {
                Ok(()) => debug!("Undeployed app [{}] ({}) of {}", app_name, deployment_id, release),
                Err(e) => warn!(
                    "Could not undeploy app [{}] ({}) of {}: {}",
                    app_name, deployment_id, release, e
                ),
            }
        }
        Ok(())
    }

    /// Undeploy every application of several versions of a release and mark
    /// them DELETED. A deployment shared by two versions is undeployed once.
    pub async fn delete_all(&self, releases: Vec<Release>) -> Result<Vec<Release>, RiggerError> {
        let mut undeployed = HashSet::new();
        let mut deleted = Vec::with_capacity(releases.len());
        for mut release in releases {
            info!("Deleting release {}", release);
            let app_names: Vec<String> = release
                .deployments
                .iter()
                .filter(|(_, id)| undeployed.insert((release.platform_name.clone(), (*id).clone())))
                .map(|(name, _)| name.clone())
                .collect();
            self.undeploy_apps(&release, &app_names).await?;
            release.info.app_statuses.clear();
            release.set_status(StatusCode::Deleted, "Delete complete");
            deleted.push(self.store.save(&release).await?);
        }
        Ok(deleted)
    }

    /// Scale applications of a release directly on the backend.
    pub async fn scale(&self, release: Release, request: &ScaleRequest) -> Result<Release, RiggerError> {
        let backend = self.backend(&release)?;
        for item in &request.items {
            let deployment_id = release.deployments.get(&item.name).ok_or_else(|| {
                RiggerError::Validation(format!(
                    "Application [{}] is not part of release {}",
                    item.name, release
                ))
            })?;
            info!("Scaling app [{}] of {} to {}", item.name, release, item.count);
            backend
                .scale(deployment_id, item.count, &item.properties)
                .await
                .map_err(|e| {
                    RiggerError::backend(format!("Could not scale app [{}] of release {}", item.name, release), e)
                })?;
        }
        self.status(release).await
    }

    /// Logs keyed by deployment id, for one application or all of them.
    pub async fn log(
        &self,
        release: &Release,
        app_name: Option<&str>,
    ) -> Result<BTreeMap<String, String>, RiggerError> {
        let mut logs = BTreeMap::new();
        if release.is_deleted() {
            return Ok(logs);
        }

        let deployment_ids: Vec<&String> = match app_name {
            Some(app_name) => vec![release.deployments.get(app_name).ok_or_else(|| {
                RiggerError::NotFound(format!(
                    "Application [{}] not found in release {}",
                    app_name, release
                ))
            })?],
            None => release.deployments.values().collect(),
        };

        let backend = self.backend(release)?;
        for deployment_id in deployment_ids {
            let log = backend.log(deployment_id).await.map_err(|e| {
                RiggerError::backend(format!("Could not get log of {} for release {}", deployment_id, release), e)
            })?;
            logs.insert(deployment_id.clone(), log);
        }
        Ok(logs)
    }
}
