//! Release, package and status models

pub mod manifest;
pub mod package;
pub mod release;
pub mod request;
pub mod status;

pub use manifest::{ApplicationManifest, ApplicationSpec, REPLICA_COUNT_PROPERTY};
pub use package::{ConfigValues, Package, PackageIdentifier, PackageMetadata, Template};
pub use release::{Info, Release, StatusCode};
pub use request::{
    DeleteProperties, InstallRequest, RollbackRequest, ScaleItem, ScaleRequest, UpgradeRequest,
};
pub use status::{AppInstanceStatus, AppStatus, DeploymentState};
