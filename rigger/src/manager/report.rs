//! Analysis report creation

use serde_yaml::Value;
use tracing::debug;

use crate::analyzer::ReleaseAnalysisReport;
use crate::errors::RiggerError;
use crate::manager::ReleaseManager;
use crate::models::manifest::read_manifest;
use crate::models::release::Release;
use crate::render::values;

/// How a report is built
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    /// Upgrade even without a difference
    pub force: bool,

    /// Applications forced into the upgrade set
    pub app_names: Vec<String>,

    /// Persist the replacing release once analyzed
    pub initial: bool,

    pub rollback: bool,
}

impl ReleaseManager {
    /// Render a release's manifest from its package and config values. The
    /// result must read back as named applications.
    pub fn render(&self, release: &Release, model: &Value) -> Result<String, RiggerError> {
        let manifest = self.renderer.render(&release.pkg, model).map_err(|e| {
            RiggerError::Validation(format!("Could not render manifest for release {}: {}", release, e))
        })?;
        read_manifest(&manifest)?;
        Ok(manifest)
    }

    /// Render and analyze a replacing release against the existing one.
    ///
    /// The final manifest pins the live instance count of every existing
    /// application, so scaled applications keep their size across upgrades.
    pub async fn create_report(
        &self,
        existing: &Release,
        mut replacing: Release,
        options: ReportOptions,
    ) -> Result<ReleaseAnalysisReport, RiggerError> {
        let mut model = values::merge_config_values(&replacing.pkg, &replacing.config_values)?;
        replacing.manifest = self.render(&replacing, &model)?;

        let mut report = self
            .analyzer
            .analyze(existing, &replacing, options.force, &options.app_names)
            .await?;
        report.rollback = options.rollback;

        let existing = self.status(existing.clone()).await?;
        let composite = !replacing.pkg.dependencies.is_empty();
        for app_status in &existing.info.app_statuses {
            let app_name = existing
                .deployments
                .iter()
                .find(|(_, id)| **id == app_status.deployment_id)
                .map(|(name, _)| name.as_str());
            if let Some(app_name) = app_name {
                let count = app_status.instances.len();
                if count > 0 {
                    debug!("Keeping {} instances of app [{}]", count, app_name);
                    values::set_replica_count(&mut model, composite.then_some(app_name), count);
                }
            }
        }
        replacing.manifest = self.render(&replacing, &model)?;

        if options.initial {
            replacing = self.store.save(&replacing).await?;
        }
        report.replacing_release = replacing;
        Ok(report)
    }
}
