//! Backend status models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Deployment state reported by a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    #[default]
    Unknown,
    Deploying,
    Deployed,
    Partial,
    Failed,
    Error,
    Undeployed,
}

impl DeploymentState {
    pub fn is_failed(&self) -> bool {
        matches!(self, DeploymentState::Failed | DeploymentState::Error)
    }
}

/// Status of one application instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInstanceStatus {
    pub id: String,
    pub state: DeploymentState,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Status of one deployed application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStatus {
    /// Backend deployment id
    pub deployment_id: String,

    /// Overall state of the deployment
    pub state: DeploymentState,

    /// Instance statuses keyed by instance id
    #[serde(default)]
    pub instances: BTreeMap<String, AppInstanceStatus>,
}

impl AppStatus {
    /// Status with no instance detail
    pub fn of(deployment_id: impl Into<String>, state: DeploymentState) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            state,
            instances: BTreeMap::new(),
        }
    }
}
