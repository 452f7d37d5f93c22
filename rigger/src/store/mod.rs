//! Release and package persistence contracts

pub mod memory;

use async_trait::async_trait;

use crate::errors::RiggerError;
use crate::models::package::Package;
use crate::models::release::Release;

pub use memory::{InMemoryPackageStore, InMemoryReleaseStore};

/// Durable storage of releases keyed by (name, version)
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Insert or replace a release version
    async fn save(&self, release: &Release) -> Result<Release, RiggerError>;

    /// Highest version of a release, whatever its status
    async fn find_latest(&self, name: &str) -> Result<Release, RiggerError>;

    async fn find_by_name_and_version(&self, name: &str, version: u32)
        -> Result<Release, RiggerError>;

    /// Highest version that is DEPLOYED or DELETED, the base of the next
    /// upgrade or rollback
    async fn find_latest_for_update(&self, name: &str) -> Result<Release, RiggerError>;

    /// Every version of a release, newest first
    async fn history(&self, name: &str) -> Result<Vec<Release>, RiggerError>;

    /// Every release version created from a package
    async fn find_by_package(
        &self,
        package_name: &str,
        package_version: &str,
    ) -> Result<Vec<Release>, RiggerError>;
}

/// Storage of uploaded packages
#[async_trait]
pub trait PackageStore: Send + Sync {
    async fn save(&self, pkg: &Package) -> Result<(), RiggerError>;

    /// Find a package, the highest version when none is given
    async fn find(&self, name: &str, version: Option<&str>) -> Result<Package, RiggerError>;

    async fn delete(&self, name: &str, version: &str) -> Result<(), RiggerError>;
}
