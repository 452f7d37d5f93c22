//! Operation requests

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::package::{ConfigValues, PackageIdentifier};

/// Install a package as a new release
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallRequest {
    pub package: PackageIdentifier,
    pub release_name: String,
    pub platform_name: String,
    #[serde(default)]
    pub config_values: ConfigValues,
}

/// Upgrade an existing release to a package and/or new values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpgradeRequest {
    pub release_name: String,
    pub package: PackageIdentifier,
    #[serde(default)]
    pub config_values: ConfigValues,

    /// Health check cutoff, platform default when absent
    #[serde(default)]
    pub timeout: Option<Duration>,

    /// Upgrade even when nothing changed
    #[serde(default)]
    pub force: bool,

    /// Applications to upgrade in force mode, all when empty
    #[serde(default)]
    pub app_names: Vec<String>,
}

/// Roll a release back to an earlier version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub release_name: String,

    /// Target version, 0 selects the previous good version
    #[serde(default)]
    pub version: u32,

    #[serde(default)]
    pub timeout: Option<Duration>,
}

/// Options of a release deletion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteProperties {
    /// Also delete the package the release was installed from
    #[serde(default)]
    pub delete_package: bool,
}

/// Instance count change for one application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScaleItem {
    pub name: String,
    pub count: u32,
    #[serde(default)]
    pub properties: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScaleRequest {
    pub items: Vec<ScaleItem>,
}
