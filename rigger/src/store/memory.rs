//! In-memory stores

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::RiggerError;
use crate::models::package::Package;
use crate::models::release::{Release, StatusCode};
use crate::store::{PackageStore, ReleaseStore};

/// Release store backed by a map of name to versions
#[derive(Default)]
pub struct InMemoryReleaseStore {
    releases: RwLock<HashMap<String, BTreeMap<u32, Release>>>,
}

impl InMemoryReleaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn release_not_found(name: &str) -> RiggerError {
    RiggerError::NotFound(format!("Release with the name [{}] does not exist", name))
}

#[async_trait]
impl ReleaseStore for InMemoryReleaseStore {
    async fn save(&self, release: &Release) -> Result<Release, RiggerError> {
        let mut releases = self.releases.write().await;
        releases
            .entry(release.name.clone())
            .or_default()
            .insert(release.version, release.clone());
        Ok(release.clone())
    }

    async fn find_latest(&self, name: &str) -> Result<Release, RiggerError> {
        let releases = self.releases.read().await;
        releases
            .get(name)
            .and_then(|versions| versions.values().next_back())
            .cloned()
            .ok_or_else(|| release_not_found(name))
    }

    async fn find_by_name_and_version(
        &self,
        name: &str,
        version: u32,
    ) -> Result<Release, RiggerError> {
        let releases = self.releases.read().await;
        releases
            .get(name)
            .and_then(|versions| versions.get(&version))
            .cloned()
            .ok_or_else(|| {
                RiggerError::NotFound(format!(
                    "Release with the name [{}] and version [{}] does not exist",
                    name, version
                ))
            })
    }

    async fn find_latest_for_update(&self, name: &str) -> Result<Release, RiggerError> {
        let releases = self.releases.read().await;
        releases
            .get(name)
            .and_then(|versions| {
                versions.values().rev().find(|r| {
                    matches!(r.info.status, StatusCode::Deployed | StatusCode::Deleted)
                })
            })
            .cloned()
            .ok_or_else(|| {
                RiggerError::NotFound(format!(
                    "Release with the name [{}] has no deployed or deleted version",
                    name
                ))
            })
    }

    async fn history(&self, name: &str) -> Result<Vec<Release>, RiggerError> {
        let releases = self.releases.read().await;
        Ok(releases
            .get(name)
            .map(|versions| versions.values().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_by_package(
        &self,
        package_name: &str,
        package_version: &str,
    ) -> Result<Vec<Release>, RiggerError> {
        let releases = self.releases.read().await;
        Ok(releases
            .values()
            .flat_map(|versions| versions.values())
            .filter(|r| r.pkg.name() == package_name && r.pkg.version() == package_version)
            .cloned()
            .collect())
    }
}

/// Package store backed by a map of name to versions
#[derive(Default)]
pub struct InMemoryPackageStore {
    packages: RwLock<HashMap<String, Vec<Package>>>,
}

impl InMemoryPackageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Dotted numeric versions compare numerically, anything else lexically.
fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(l), Some(r)) => {
                let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

#[async_trait]
impl PackageStore for InMemoryPackageStore {
    async fn save(&self, pkg: &Package) -> Result<(), RiggerError> {
        let mut packages = self.packages.write().await;
        let versions = packages.entry(pkg.name().to_string()).or_default();
        versions.retain(|p| p.version() != pkg.version());
        versions.push(pkg.clone());
        Ok(())
    }

    async fn find(&self, name: &str, version: Option<&str>) -> Result<Package, RiggerError> {
        let packages = self.packages.read().await;
        let versions = packages.get(name);
        let found = match version {
            Some(version) => versions.and_then(|v| v.iter().find(|p| p.version() == version)),
            None => versions.and_then(|v| {
                v.iter()
                    .max_by(|a, b| compare_versions(a.version(), b.version()))
            }),
        };
        found.cloned().ok_or_else(|| {
            RiggerError::NotFound(format!(
                "Can not find package '{}', version '{}'",
                name,
                version.unwrap_or("latest")
            ))
        })
    }

    async fn delete(&self, name: &str, version: &str) -> Result<(), RiggerError> {
        let mut packages = self.packages.write().await;
        let versions = packages.get_mut(name).ok_or_else(|| {
            RiggerError::NotFound(format!("Can not find package '{}', version '{}'", name, version))
        })?;
        versions.retain(|p| p.version() != version);
        if versions.is_empty() {
            packages.remove(name);
        }
        Ok(())
    }
}
