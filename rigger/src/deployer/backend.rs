//! Deployment backend contract

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::models::manifest::ApplicationManifest;
use crate::models::release::Release;
use crate::models::status::{AppStatus, DeploymentState};

/// Everything a backend needs to deploy one application of a release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDeploymentRequest {
    pub app_name: String,
    pub release_name: String,
    pub release_version: u32,
    pub resource: String,
    pub version: String,
    pub application_properties: BTreeMap<String, String>,
    pub deployment_properties: BTreeMap<String, String>,
}

impl AppDeploymentRequest {
    pub fn new(release: &Release, app: &ApplicationManifest) -> Self {
        Self {
            app_name: app.name().to_string(),
            release_name: release.name.clone(),
            release_version: release.version,
            resource: app.spec.resource.clone(),
            version: app.spec.version.clone(),
            application_properties: app.spec.application_properties.clone(),
            deployment_properties: app.spec.deployment_properties.clone(),
        }
    }
}

/// Per-application deploy/undeploy/status operations keyed by an opaque deployment id
#[async_trait]
pub trait DeploymentBackend: Send + Sync {
    /// Deploy one application, returning its deployment id
    async fn deploy(&self, request: &AppDeploymentRequest) -> anyhow::Result<String>;

    async fn undeploy(&self, deployment_id: &str) -> anyhow::Result<()>;

    async fn status(&self, deployment_id: &str) -> anyhow::Result<AppStatus>;

    /// Batch state query, `None` when the backend has no batch support
    async fn states(
        &self,
        _deployment_ids: &[String],
    ) -> anyhow::Result<Option<BTreeMap<String, DeploymentState>>> {
        Ok(None)
    }

    async fn scale(
        &self,
        deployment_id: &str,
        count: u32,
        properties: &BTreeMap<String, String>,
    ) -> anyhow::Result<()>;

    async fn log(&self, deployment_id: &str) -> anyhow::Result<String>;
}
