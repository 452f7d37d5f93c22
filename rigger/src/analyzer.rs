//! Release analysis: which applications an upgrade must touch

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::deployer::resource::ResourceResolver;
use crate::diff::{self, ApplicationManifestDifference, ReleaseDifference};
use crate::errors::RiggerError;
use crate::models::manifest::{read_manifest, ApplicationManifest};
use crate::models::release::Release;

/// Outcome of comparing an existing release with its replacement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseAnalysisReport {
    /// Applications to deploy for the replacing release, in manifest order
    pub application_names_to_upgrade: Vec<String>,

    pub release_difference: ReleaseDifference,

    pub existing_release: Release,

    /// Replacing release carrying its final rendered manifest
    pub replacing_release: Release,

    /// Whether the report drives a rollback rather than an upgrade
    pub rollback: bool,
}

/// Compares rendered manifests to decide on the upgrade set
pub struct ReleaseAnalyzer {
    resolver: Arc<dyn ResourceResolver>,
}

impl ReleaseAnalyzer {
    pub fn new(resolver: Arc<dyn ResourceResolver>) -> Self {
        Self { resolver }
    }

    /// Analyze an upgrade from `existing` to `replacing`.
    ///
    /// Fails when the releases are not comparable, when a replacing resource
    /// can not be resolved, or when nothing changed and `force` is not set.
    /// In force mode the upgrade set is every application when `app_names`
    /// is empty and the changed applications plus `app_names` otherwise.
    pub async fn analyze(
        &self,
        existing: &Release,
        replacing: &Release,
        force: bool,
        app_names: &[String],
    ) -> Result<ReleaseAnalysisReport, RiggerError> {
        let existing_dependencies = existing.pkg.dependencies.len();
        let replacing_dependencies = replacing.pkg.dependencies.len();
        if existing_dependencies != replacing_dependencies {
            return Err(RiggerError::Validation(format!(
                "Can not yet compare existing package and to be released packages with different sizes. \
                 Existing has {} dependencies, replacing has {}.",
                existing_dependencies, replacing_dependencies
            )));
        }

        let existing_apps = read_manifest(&existing.manifest)?;
        let replacing_apps = read_manifest(&replacing.manifest)?;

        let differences = if existing_dependencies == 0 {
            vec![self.diff_single(&existing_apps, &replacing_apps)?]
        } else {
            if !existing.pkg.templates.is_empty() {
                return Err(RiggerError::Validation(
                    "Can not yet compare package with top level templates and dependencies"
                        .to_string(),
                ));
            }
            self.diff_dependencies(replacing, &existing_apps, &replacing_apps)
                .await?
        };
        let release_difference = ReleaseDifference::new(differences);

        if !force && release_difference.are_equal() {
            return Err(RiggerError::Analysis(
                "Package to upgrade has no difference than existing deployed/deleted package. Not upgrading."
                    .to_string(),
            ));
        }

        let mut names = release_difference.changed_application_names();
        if force {
            let forced: Vec<String> = if app_names.is_empty() {
                existing_apps.iter().map(|a| a.name().to_string()).collect()
            } else {
                for name in app_names {
                    if !replacing_apps.iter().any(|a| a.name() == name) {
                        return Err(RiggerError::Validation(format!(
                            "Application [{}] is not part of release [{}]",
                            name, replacing
                        )));
                    }
                }
                app_names.to_vec()
            };
            for name in forced {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }

        info!(
            "Release analysis for {} -> {}: upgrading {:?}",
            existing, replacing, names
        );
        debug!("{}", release_difference.summary());

        Ok(ReleaseAnalysisReport {
            application_names_to_upgrade: names,
            release_difference,
            existing_release: existing.clone(),
            replacing_release: replacing.clone(),
            rollback: false,
        })
    }

    fn diff_single(
        &self,
        existing_apps: &[ApplicationManifest],
        replacing_apps: &[ApplicationManifest],
    ) -> Result<ApplicationManifestDifference, RiggerError> {
        match (existing_apps, replacing_apps) {
            ([existing_app], [replacing_app]) => {
                Ok(diff::diff(existing_app.name(), existing_app, replacing_app))
            }
            _ => Err(RiggerError::Validation(format!(
                "A package without dependencies must render exactly one application, \
                 got {} existing and {} replacing",
                existing_apps.len(),
                replacing_apps.len()
            ))),
        }
    }

    async fn diff_dependencies(
        &self,
        replacing: &Release,
        existing_apps: &[ApplicationManifest],
        replacing_apps: &[ApplicationManifest],
    ) -> Result<Vec<ApplicationManifestDifference>, RiggerError> {
        let mut differences = Vec::with_capacity(existing_apps.len());
        for existing_app in existing_apps {
            let name = existing_app.name();
            let replacing_app = replacing_apps
                .iter()
                .find(|a| a.name() == name)
                .ok_or_else(|| {
                    let names: Vec<&str> = replacing_apps.iter().map(|a| a.name()).collect();
                    RiggerError::Validation(format!(
                        "Did not find existing application name [{}] in list of replacing applications [{}].",
                        name,
                        names.join(", ")
                    ))
                })?;

            let resolvable = self
                .resolver
                .exists(&replacing_app.spec.resource, &replacing_app.spec.version)
                .await
                .unwrap_or_else(|e| {
                    debug!("Resource lookup for [{}] failed: {}", name, e);
                    false
                });
            if !resolvable {
                return Err(RiggerError::Analysis(format!(
                    "Could not find Resource in replacing release name [{}], version [{}].",
                    replacing.name, replacing.version
                )));
            }

            differences.push(diff::diff(name, existing_app, replacing_app));
        }
        Ok(differences)
    }
}
