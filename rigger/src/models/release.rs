//! Release models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::package::{ConfigValues, Package};
use crate::models::status::AppStatus;

/// Lifecycle status of one release version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusCode {
    /// Being prepared by install, upgrade or rollback
    #[default]
    Unknown,

    /// Serving traffic
    Deployed,

    /// Install or upgrade did not complete
    Failed,

    /// Explicitly removed or superseded
    Deleted,
}

/// Status and audit information of a release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    /// Current status code
    pub status: StatusCode,

    /// When this version was first created
    pub first_deployed: DateTime<Utc>,

    /// When this version last changed status
    pub last_deployed: DateTime<Utc>,

    /// When this version was deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<DateTime<Utc>>,

    /// Human readable description of the last status change
    pub description: String,

    /// Backend reported status of each application, filled in by status queries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub app_statuses: Vec<AppStatus>,
}

impl Info {
    /// Fresh info in UNKNOWN status
    pub fn underway(description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            status: StatusCode::Unknown,
            first_deployed: now,
            last_deployed: now,
            deleted: None,
            description: description.into(),
            app_statuses: Vec::new(),
        }
    }
}

/// A named, versioned instantiation of a package plus configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    /// Release name
    pub name: String,

    /// Version, starting at 1 and never reused for a name
    pub version: u32,

    /// Platform (deployment backend) the release runs on
    pub platform_name: String,

    /// Rendered manifest text
    #[serde(default)]
    pub manifest: String,

    /// Merged configuration values
    #[serde(default)]
    pub config_values: ConfigValues,

    /// Package the release was rendered from
    pub pkg: Package,

    /// Status information
    pub info: Info,

    /// Backend deployment id of each application, keyed by application name
    #[serde(default)]
    pub deployments: BTreeMap<String, String>,
}

impl Release {
    pub fn status(&self) -> StatusCode {
        self.info.status
    }

    pub fn is_deleted(&self) -> bool {
        self.info.status == StatusCode::Deleted
    }

    /// Move to a new status and stamp the change.
    pub fn set_status(&mut self, status: StatusCode, description: impl Into<String>) {
        let now = Utc::now();
        self.info.status = status;
        self.info.last_deployed = now;
        self.info.description = description.into();
        if status == StatusCode::Deleted {
            self.info.deleted = Some(now);
        }
    }

    /// Distinct deployment ids, sorted
    pub fn deployment_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.deployments.values().cloned().collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

impl std::fmt::Display for Release {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-v{}", self.name, self.version)
    }
}
