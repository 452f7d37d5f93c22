//! Work performed on entering each state of a release

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::analyzer::ReleaseAnalysisReport;
use crate::errors::RiggerError;
use crate::manager::{ReleaseManager, ReportOptions};
use crate::models::manifest::manifest_kind;
use crate::models::release::{Info, Release, StatusCode};
use crate::orchestrator::context::{ExtendedState, OperationRequest};
use crate::orchestrator::fsm::{FsmSettings, ReleaseEvent, ReleaseState};
use crate::render::values;
use crate::store::{PackageStore, ReleaseStore};
use crate::strategy::{AbortReason, StrategyRegistry, UpgradeStrategy};

/// Actions of the release state machine
pub struct Actions {
    store: Arc<dyn ReleaseStore>,
    packages: Arc<dyn PackageStore>,
    manager: Arc<ReleaseManager>,
    strategies: StrategyRegistry,
    settings: FsmSettings,
}

impl Actions {
    pub fn new(
        store: Arc<dyn ReleaseStore>,
        packages: Arc<dyn PackageStore>,
        manager: Arc<ReleaseManager>,
        strategies: StrategyRegistry,
        settings: FsmSettings,
    ) -> Self {
        Self {
            store,
            packages,
            manager,
            strategies,
            settings,
        }
    }

    pub fn settings(&self) -> &FsmSettings {
        &self.settings
    }

    /// Run the action of a state, returning the event it produced
    pub async fn run(
        &self,
        state: ReleaseState,
        ctx: &mut ExtendedState,
    ) -> Result<ReleaseEvent, RiggerError> {
        match state {
            ReleaseState::InstallInstall => self.install(ctx).await,
            ReleaseState::UpgradeStart => self.upgrade_start(ctx).await,
            ReleaseState::UpgradeDeployTargetApps => self.deploy_target_apps(ctx).await,
            ReleaseState::UpgradeCheckTargetApps => self.check_target_apps(ctx).await,
            ReleaseState::UpgradeDeploySucceeded => self.deploy_succeeded(ctx),
            ReleaseState::UpgradeDeployFailed => self.deploy_failed(ctx).await,
            ReleaseState::UpgradeCancel => self.cancel(ctx).await,
            ReleaseState::UpgradeDeleteSourceApps => self.delete_source_apps(ctx).await,
            ReleaseState::DeleteDelete => self.delete(ctx).await,
            ReleaseState::ScaleScale => self.scale(ctx).await,
            ReleaseState::RollbackStart => self.rollback_start(ctx).await,
            ReleaseState::Initial | ReleaseState::Error | ReleaseState::UpgradeWaitTargetApps => {
                Err(RiggerError::Internal(format!("No action for state {:?}", state)))
            }
        }
    }

    async fn install(&self, ctx: &mut ExtendedState) -> Result<ReleaseEvent, RiggerError> {
        // A rollback of a deleted release prepares its target beforehand.
        let release = match ctx.target.take() {
            Some(release) => release,
            None => self.new_release(ctx).await?,
        };
        info!("Installing {} on platform [{}]", release, release.platform_name);
        ctx.result = Some(self.manager.install(release).await?);
        Ok(ReleaseEvent::Completed)
    }

    async fn new_release(&self, ctx: &ExtendedState) -> Result<Release, RiggerError> {
        let Some(OperationRequest::Install { request, pkg }) = ctx.request.as_ref() else {
            return Err(RiggerError::Internal("Install without an install request".to_string()));
        };

        let version = match self.store.find_latest(&request.release_name).await {
            Ok(latest) if latest.is_deleted() => latest.version + 1,
            Ok(_) => {
                return Err(RiggerError::Conflict(format!(
                    "Release with the name [{}] already exists and it is not deleted.",
                    request.release_name
                )))
            }
            Err(RiggerError::NotFound(_)) => 1,
            Err(e) => return Err(e),
        };

        let mut release = Release {
            name: request.release_name.clone(),
            version,
            platform_name: request.platform_name.clone(),
            manifest: String::new(),
            config_values: request.config_values.clone(),
            pkg: pkg.clone(),
            info: Info::underway("Initial install underway"),
            deployments: Default::default(),
        };
        let model = values::merge_config_values(pkg, &request.config_values)?;
        release.manifest = self.manager.render(&release, &model)?;
        Ok(release)
    }

    async fn upgrade_start(&self, ctx: &mut ExtendedState) -> Result<ReleaseEvent, RiggerError> {
        let (existing, replacing, options, requested_timeout) = match ctx.request.as_ref() {
            Some(OperationRequest::Upgrade { request, pkg }) => {
                let existing = self.store.find_latest_for_update(&request.release_name).await?;
                if existing.is_deleted() {
                    return Err(RiggerError::Conflict(format!(
                        "Release [{}] is deleted, install it again instead of upgrading.",
                        request.release_name
                    )));
                }
                let latest = self.store.find_latest(&request.release_name).await?;
                let replacing = Release {
                    name: existing.name.clone(),
                    version: latest.version + 1,
                    platform_name: existing.platform_name.clone(),
                    manifest: String::new(),
                    config_values: values::merge_previous(
                        &existing.config_values,
                        &request.config_values,
                    )?,
                    pkg: pkg.clone(),
                    info: Info::underway("Upgrade install underway"),
                    deployments: Default::default(),
                };
                let options = ReportOptions {
                    force: request.force,
                    app_names: request.app_names.clone(),
                    initial: true,
                    rollback: false,
                };
                (existing, replacing, options, request.timeout)
            }
            Some(OperationRequest::Rollback(request)) => {
                let existing = ctx.source.take().ok_or_else(|| {
                    RiggerError::Internal("Rollback upgrade without a source release".to_string())
                })?;
                let replacing = ctx.target.take().ok_or_else(|| {
                    RiggerError::Internal("Rollback upgrade without a target release".to_string())
                })?;
                let options = ReportOptions {
                    initial: true,
                    rollback: true,
                    ..Default::default()
                };
                (existing, replacing, options, request.timeout)
            }
            _ => {
                return Err(RiggerError::Internal(
                    "Upgrade without an upgrade or rollback request".to_string(),
                ))
            }
        };

        info!("Analyzing upgrade of {} to version {}", existing, replacing.version);
        let report = self.manager.create_report(&existing, replacing, options).await?;
        info!(
            "Apps to upgrade: {:?}. {}",
            report.application_names_to_upgrade,
            report.release_difference.summary()
        );

        ctx.timeout = self
            .settings
            .upgrade_timeout_for(&existing.platform_name, requested_timeout);
        ctx.report = Some(report);
        Ok(ReleaseEvent::Completed)
    }

    async fn deploy_target_apps(&self, ctx: &mut ExtendedState) -> Result<ReleaseEvent, RiggerError> {
        let report = report(ctx)?;
        let target = self.strategy(report)?.deploy_apps(report).await?;
        info!("Deployed target apps of {}", target);

        let now = Utc::now();
        let timeout = chrono::Duration::from_std(ctx.timeout)
            .map_err(|e| RiggerError::ConfigError(format!("Invalid upgrade timeout: {}", e)))?;
        ctx.target = Some(target);
        ctx.started = Some(now);
        ctx.cutoff = Some(now + timeout);
        Ok(ReleaseEvent::Completed)
    }

    async fn check_target_apps(&self, ctx: &mut ExtendedState) -> Result<ReleaseEvent, RiggerError> {
        let report = report(ctx)?;
        let target = target(ctx)?;

        let healthy = match self.strategy(report)?.check_status(report, target).await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!("Health check of {} failed: {}", target, e);
                false
            }
        };

        if healthy {
            info!("Target apps of {} are healthy", target);
            return Ok(ReleaseEvent::Healthy);
        }
        if ctx.cutoff.is_some_and(|cutoff| Utc::now() > cutoff) {
            warn!("Target apps of {} not healthy before the cutoff", target);
            return Ok(ReleaseEvent::CutoffElapsed);
        }
        debug!("Target apps of {} not healthy yet", target);
        Ok(ReleaseEvent::NotHealthy)
    }

    fn deploy_succeeded(&self, ctx: &mut ExtendedState) -> Result<ReleaseEvent, RiggerError> {
        info!(
            "Upgrade to {} healthy after {} ms",
            target(ctx)?,
            ctx.elapsed().as_millis()
        );
        Ok(ReleaseEvent::Completed)
    }

    async fn delete_source_apps(&self, ctx: &mut ExtendedState) -> Result<ReleaseEvent, RiggerError> {
        let target = ctx.target.take().ok_or_else(missing_target)?;
        let report = report(ctx)?;
        let accepted = self.strategy(report)?.accept(report, target).await?;
        ctx.result = Some(self.manager.status(accepted).await?);
        Ok(ReleaseEvent::Completed)
    }

    async fn deploy_failed(&self, ctx: &mut ExtendedState) -> Result<ReleaseEvent, RiggerError> {
        let elapsed = ctx.elapsed();
        let target = ctx.target.take().ok_or_else(missing_target)?;
        let report = report(ctx)?;
        let failed = self
            .strategy(report)?
            .abort(report, target, AbortReason::TimedOut, elapsed)
            .await?;
        ctx.error = Some(RiggerError::Timeout {
            release: failed.name.clone(),
            version: failed.version,
            elapsed_ms: elapsed.as_millis() as u64,
        });
        Ok(ReleaseEvent::Completed)
    }

    async fn cancel(&self, ctx: &mut ExtendedState) -> Result<ReleaseEvent, RiggerError> {
        let elapsed = ctx.elapsed();
        let target = ctx.target.take().ok_or_else(missing_target)?;
        let report = report(ctx)?;
        info!("Cancelling upgrade to {}", target);
        let cancelled = self
            .strategy(report)?
            .abort(report, target, AbortReason::Cancelled, elapsed)
            .await?;
        ctx.error = Some(RiggerError::Cancelled {
            release: cancelled.name.clone(),
            version: cancelled.version,
            elapsed_ms: elapsed.as_millis() as u64,
        });
        Ok(ReleaseEvent::Completed)
    }

    async fn rollback_start(&self, ctx: &mut ExtendedState) -> Result<ReleaseEvent, RiggerError> {
        let Some(OperationRequest::Rollback(request)) = ctx.request.as_ref() else {
            return Err(RiggerError::Internal("Rollback without a rollback request".to_string()));
        };
        let name = &request.release_name;

        let current = self.store.find_latest_for_update(name).await?;
        let from = if request.version == 0 {
            self.store
                .history(name)
                .await?
                .into_iter()
                .find(|r| {
                    r.version < current.version
                        && matches!(r.status(), StatusCode::Deployed | StatusCode::Deleted)
                })
                .ok_or_else(|| {
                    RiggerError::NotFound(format!(
                        "Could not find a previous version to roll back release [{}] to",
                        name
                    ))
                })?
        } else {
            let from = self.store.find_by_name_and_version(name, request.version).await?;
            if !matches!(from.status(), StatusCode::Deployed | StatusCode::Deleted) {
                return Err(RiggerError::Conflict(
                    "Rollback version should either be in deployed or deleted status.".to_string(),
                ));
            }
            from
        };

        let latest = self.store.find_latest(name).await?;
        let mut target = Release {
            name: name.clone(),
            version: latest.version + 1,
            platform_name: from.platform_name.clone(),
            manifest: from.manifest.clone(),
            config_values: from.config_values.clone(),
            pkg: from.pkg.clone(),
            info: Info::underway("Rollback underway"),
            deployments: Default::default(),
        };
        info!("Rolling back {} to the contents of {} as {}", current, from, target);

        if current.is_deleted() {
            target.info = Info::underway("Rollback install underway");
            ctx.target = Some(target);
            return Ok(ReleaseEvent::RollbackAsInstall);
        }
        ctx.source = Some(current);
        ctx.target = Some(target);
        Ok(ReleaseEvent::RollbackAsUpgrade)
    }

    async fn delete(&self, ctx: &mut ExtendedState) -> Result<ReleaseEvent, RiggerError> {
        let Some(OperationRequest::Delete { name, properties }) = ctx.request.as_ref() else {
            return Err(RiggerError::Internal("Delete without a delete request".to_string()));
        };

        let history = self.store.history(name).await?;
        let latest = history.first().ok_or_else(|| {
            RiggerError::NotFound(format!("Release with the name [{}] does not exist", name))
        })?;
        if latest.is_deleted() {
            return Err(RiggerError::Conflict(format!(
                "Release with the name [{}] is already deleted.",
                name
            )));
        }

        let pkg = latest.pkg.clone();
        if properties.delete_package {
            let users: Vec<String> = self
                .store
                .find_by_package(pkg.name(), pkg.version())
                .await?
                .into_iter()
                .filter(|r| &r.name != name && !r.is_deleted())
                .map(|r| r.to_string())
                .collect();
            if !users.is_empty() {
                return Err(RiggerError::Conflict(format!(
                    "Can not delete package [{}:{}], it is still used by {:?}",
                    pkg.name(),
                    pkg.version(),
                    users
                )));
            }
        }

        let live: Vec<Release> = history.into_iter().filter(|r| !r.is_deleted()).collect();
        let deleted = self.manager.delete_all(live).await?;
        ctx.result = deleted.into_iter().next();

        if properties.delete_package {
            info!("Deleting package [{}:{}]", pkg.name(), pkg.version());
            self.packages.delete(pkg.name(), pkg.version()).await?;
        }
        Ok(ReleaseEvent::Completed)
    }

    async fn scale(&self, ctx: &mut ExtendedState) -> Result<ReleaseEvent, RiggerError> {
        let Some(OperationRequest::Scale { name, request }) = ctx.request.as_ref() else {
            return Err(RiggerError::Internal("Scale without a scale request".to_string()));
        };

        let release = self.store.find_latest_for_update(name).await?;
        if release.is_deleted() {
            return Err(RiggerError::Conflict(format!(
                "Release with the name [{}] is deleted, can not scale it.",
                name
            )));
        }
        let scaled = self.manager.scale(release, request).await?;
        ctx.result = Some(scaled);
        Ok(ReleaseEvent::Completed)
    }

    fn strategy(&self, report: &ReleaseAnalysisReport) -> Result<Arc<dyn UpgradeStrategy>, RiggerError> {
        let kind = manifest_kind(&report.existing_release.manifest)?;
        self.strategies.get(&kind)
    }
}

fn report(ctx: &ExtendedState) -> Result<&ReleaseAnalysisReport, RiggerError> {
    ctx.report
        .as_ref()
        .ok_or_else(|| RiggerError::Internal("No analysis report for the upgrade".to_string()))
}

fn target(ctx: &ExtendedState) -> Result<&Release, RiggerError> {
    ctx.target.as_ref().ok_or_else(missing_target)
}

fn missing_target() -> RiggerError {
    RiggerError::Internal("No target release for the upgrade".to_string())
}
