//! Release service
//!
//! Entry point of the front ends. Requests are validated here, before any
//! event reaches a release's state machine; read-only queries go straight to
//! the store and manager.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::errors::RiggerError;
use crate::manager::ReleaseManager;
use crate::models::package::{Package, PackageIdentifier};
use crate::models::release::Release;
use crate::models::request::{
    DeleteProperties, InstallRequest, RollbackRequest, ScaleRequest, UpgradeRequest,
};
use crate::models::status::DeploymentState;
use crate::orchestrator::actions::Actions;
use crate::orchestrator::actor::ReleaseHandle;
use crate::orchestrator::context::OperationRequest;
use crate::orchestrator::fsm::ReleaseState;
use crate::store::{PackageStore, ReleaseStore};

/// Release lifecycle operations, serialized per release name
pub struct ReleaseService {
    actions: Arc<Actions>,
    store: Arc<dyn ReleaseStore>,
    packages: Arc<dyn PackageStore>,
    manager: Arc<ReleaseManager>,
    handles: Mutex<HashMap<String, ReleaseHandle>>,
}

impl ReleaseService {
    pub fn new(
        actions: Arc<Actions>,
        store: Arc<dyn ReleaseStore>,
        packages: Arc<dyn PackageStore>,
        manager: Arc<ReleaseManager>,
    ) -> Self {
        Self {
            actions,
            store,
            packages,
            manager,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Install a package as a new release
    pub async fn install(&self, request: InstallRequest) -> Result<Release, RiggerError> {
        validate_name(&request.release_name)?;
        if !self.manager.registry().contains(&request.platform_name) {
            return Err(RiggerError::Validation(format!(
                "No platform named [{}], known platforms are {:?}",
                request.platform_name,
                self.manager.registry().platforms()
            )));
        }
        let pkg = self.package(&request.package).await?;
        self.handle(&request.release_name)
            .submit(OperationRequest::Install { request, pkg })
            .await
    }

    /// Upgrade a release, returning once the target is promoted
    pub async fn upgrade(&self, request: UpgradeRequest) -> Result<Release, RiggerError> {
        validate_name(&request.release_name)?;
        let pkg = self.package(&request.package).await?;
        self.handle(&request.release_name)
            .submit(OperationRequest::Upgrade { request, pkg })
            .await
    }

    pub async fn rollback(&self, request: RollbackRequest) -> Result<Release, RiggerError> {
        validate_name(&request.release_name)?;
        self.handle(&request.release_name)
            .submit(OperationRequest::Rollback(request))
            .await
    }

    pub async fn delete(
        &self,
        name: &str,
        properties: DeleteProperties,
    ) -> Result<Release, RiggerError> {
        validate_name(name)?;
        let handle = self.handle(name);
        let deleted = handle
            .submit(OperationRequest::Delete {
                name: name.to_string(),
                properties,
            })
            .await?;
        drop(handle);
        self.reap(name);
        Ok(deleted)
    }

    pub async fn scale(&self, name: &str, request: ScaleRequest) -> Result<Release, RiggerError> {
        validate_name(name)?;
        if request.items.is_empty() {
            return Err(RiggerError::Validation(
                "Scale request names no application".to_string(),
            ));
        }
        self.handle(name)
            .submit(OperationRequest::Scale {
                name: name.to_string(),
                request,
            })
            .await
    }

    /// Cancel a running upgrade or rollback. False when there is nothing to
    /// cancel at this point.
    pub async fn cancel(&self, name: &str) -> Result<bool, RiggerError> {
        let Some(handle) = self.existing_handle(name) else {
            debug!("No operation ever ran for release [{}]", name);
            return Ok(false);
        };
        let accepted = handle.cancel().await?;
        info!("Cancel of release [{}] accepted: {}", name, accepted);
        Ok(accepted)
    }

    /// Current state of a release's machine
    pub async fn state(&self, name: &str) -> Result<ReleaseState, RiggerError> {
        match self.existing_handle(name) {
            Some(handle) => handle.state().await,
            None => Ok(ReleaseState::Initial),
        }
    }

    /// Release with its application statuses, the latest version by default
    pub async fn status(&self, name: &str, version: Option<u32>) -> Result<Release, RiggerError> {
        let release = self.find(name, version).await?;
        self.manager.status(release).await
    }

    /// Status of the latest version of several releases
    pub async fn statuses(&self, names: &[String]) -> Result<Vec<Release>, RiggerError> {
        let mut releases = Vec::with_capacity(names.len());
        for name in names {
            releases.push(self.store.find_latest(name).await?);
        }
        self.manager.statuses(releases).await
    }

    /// Deployment state of each deployment id of the latest version
    pub async fn deployment_states(
        &self,
        name: &str,
    ) -> Result<BTreeMap<String, DeploymentState>, RiggerError> {
        let release = self.store.find_latest(name).await?;
        self.manager.deployment_states(&release).await
    }

    /// Logs of the latest version, keyed by deployment id
    pub async fn log(
        &self,
        name: &str,
        app_name: Option<&str>,
    ) -> Result<BTreeMap<String, String>, RiggerError> {
        let release = self.store.find_latest(name).await?;
        self.manager.log(&release, app_name).await
    }

    /// Rendered manifest of a release version
    pub async fn manifest(&self, name: &str, version: Option<u32>) -> Result<String, RiggerError> {
        Ok(self.find(name, version).await?.manifest)
    }

    /// Versions of a release, newest first, at most `max` of them
    pub async fn history(&self, name: &str, max: Option<usize>) -> Result<Vec<Release>, RiggerError> {
        let mut history = self.store.history(name).await?;
        if history.is_empty() {
            return Err(RiggerError::NotFound(format!(
                "Release with the name [{}] does not exist",
                name
            )));
        }
        if let Some(max) = max {
            history.truncate(max);
        }
        Ok(history)
    }

    async fn find(&self, name: &str, version: Option<u32>) -> Result<Release, RiggerError> {
        match version {
            Some(version) => self.store.find_by_name_and_version(name, version).await,
            None => self.store.find_latest(name).await,
        }
    }

    async fn package(&self, id: &PackageIdentifier) -> Result<Package, RiggerError> {
        if id.name.trim().is_empty() {
            return Err(RiggerError::Validation("Package name is required".to_string()));
        }
        self.packages
            .find(&id.name, id.version.as_deref())
            .await
            .map_err(|e| match e {
                RiggerError::NotFound(message) => RiggerError::Validation(message),
                e => e,
            })
    }

    fn handle(&self, name: &str) -> ReleaseHandle {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("Creating state machine for release [{}]", name);
                ReleaseHandle::spawn(name, self.actions.clone())
            })
            .clone()
    }

    /// Names of the releases with a live state machine
    pub fn active_releases(&self) -> Vec<String> {
        let handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = handles.keys().cloned().collect();
        names.sort();
        names
    }

    /// Forget the state machine of a deleted release unless a caller still
    /// holds it. The task ends with its last sender.
    fn reap(&self, name: &str) {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        if handles.get(name).is_some_and(ReleaseHandle::is_idle) {
            handles.remove(name);
            debug!("Dropped state machine of deleted release [{}]", name);
        }
    }

    fn existing_handle(&self, name: &str) -> Option<ReleaseHandle> {
        let handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.get(name).cloned()
    }
}

fn validate_name(name: &str) -> Result<(), RiggerError> {
    if name.trim().is_empty() {
        return Err(RiggerError::Validation("Release name is required".to_string()));
    }
    Ok(())
}
