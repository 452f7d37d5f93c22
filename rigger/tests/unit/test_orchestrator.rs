//! Install, delete, scale and query tests

use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use rigger::errors::ErrorKind;
use rigger::models::{DeleteProperties, DeploymentState, ScaleItem, ScaleRequest, StatusCode};
use rigger::orchestrator::ReleaseState;
use rigger::store::{PackageStore, ReleaseStore};

use crate::common::{app_values, install_request, package, upgrade_request, Harness};

fn scale_request(app: &str, count: u32) -> ScaleRequest {
    ScaleRequest {
        items: vec![ScaleItem {
            name: app.to_string(),
            count,
            properties: Default::default(),
        }],
    }
}

#[tokio::test]
async fn test_install() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;

    let release = harness
        .state
        .releases
        .install(install_request("r", &pkg, ""))
        .await
        .unwrap();

    assert_eq!(release.version, 1);
    assert_eq!(release.status(), StatusCode::Deployed);
    assert_eq!(release.info.description, "Install complete");
    assert!(release.manifest.contains("log.level: DEBUG"));
    assert_eq!(release.info.app_statuses.len(), 1);
    assert_eq!(harness.backend.running(), vec![release.deployments["log"].clone()]);

    let deployment = harness.backend.deployment(&release.deployments["log"]).unwrap();
    assert_eq!(deployment.request.release_name, "r");
    assert_eq!(deployment.request.application_properties["log.level"], "DEBUG");

    let state = harness.state.releases.state("r").await.unwrap();
    assert_eq!(state, ReleaseState::Initial);
}

#[tokio::test]
async fn test_install_values_override_package_defaults() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;

    let release = harness
        .state
        .releases
        .install(install_request("r", &pkg, &app_values("WARN")))
        .await
        .unwrap();

    let deployment = harness.backend.deployment(&release.deployments["log"]).unwrap();
    assert_eq!(deployment.request.application_properties["log.level"], "WARN");
    assert_eq!(deployment.request.version, "1.0.0");
}

#[tokio::test]
async fn test_install_validation() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    let err = assert_err!(releases.install(install_request(" ", &pkg, "")).await);
    assert_eq!(err.kind(), ErrorKind::Validation);

    let mut request = install_request("r", &pkg, "");
    request.platform_name = "mars".to_string();
    let err = assert_err!(releases.install(request).await);
    assert_eq!(err.kind(), ErrorKind::Validation);

    let missing = package("nope", "1.0.0", "");
    let err = assert_err!(releases.install(install_request("r", &missing, "")).await);
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = assert_err!(releases.install(install_request("r", &pkg, "broken: true")).await);
    assert_eq!(err.kind(), ErrorKind::Validation);

    // Nothing reached the backend or the store
    assert!(harness.backend.running().is_empty());
    assert!(harness.releases.history("r").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unnamed_application_is_rejected() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    let err = assert_err!(
        releases
            .install(install_request("r", &pkg, "anonymous: true"))
            .await
    );
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("metadata.name"), "{}", err);
    assert!(harness.backend.running().is_empty());
    assert!(harness.releases.history("r").await.unwrap().is_empty());

    // An upgrade rendering an unnamed application never reaches the backend
    let v1 = releases.install(install_request("r", &pkg, "")).await.unwrap();
    let overrides = format!("anonymous: true\n{}", app_values("WARN"));
    let err = assert_err!(releases.upgrade(upgrade_request("r", &pkg, &overrides)).await);
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(harness.backend.running(), vec![v1.deployments["log"].clone()]);
    assert_eq!(harness.releases.history("r").await.unwrap().len(), 1);
    assert_eq!(releases.state("r").await.unwrap(), ReleaseState::Initial);
}

#[tokio::test]
async fn test_upgrade_of_unsupported_kind() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    assert_ok!(
        releases
            .install(install_request("r", &pkg, "kind: HelmChart"))
            .await
    );
    let err = assert_err!(
        releases
            .upgrade(upgrade_request("r", &pkg, &app_values("WARN")))
            .await
    );
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("[\"DeployerApplication\"]"), "{}", err);
    assert_eq!(harness.backend.running().len(), 1);
}

#[tokio::test]
async fn test_install_over_live_release_conflicts() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    assert_ok!(releases.install(install_request("r", &pkg, "")).await);
    let err = assert_err!(releases.install(install_request("r", &pkg, "")).await);
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // The machine is usable again after the refusal
    assert_eq!(releases.state("r").await.unwrap(), ReleaseState::Initial);
    assert_ok!(releases.status("r", None).await);
}

#[tokio::test]
async fn test_install_failure_marks_release_failed() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    harness.backend.fail_app("log");

    let err = assert_err!(
        harness
            .state
            .releases
            .install(install_request("r", &pkg, ""))
            .await
    );
    assert_eq!(err.kind(), ErrorKind::Backend);

    let stored = harness.releases.find_latest("r").await.unwrap();
    assert_eq!(stored.status(), StatusCode::Failed);
    assert_eq!(stored.info.description, "Install failed");
    assert_eq!(
        harness.state.releases.state("r").await.unwrap(),
        ReleaseState::Initial
    );
}

#[tokio::test]
async fn test_delete_and_reinstall() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    assert_ok!(releases.install(install_request("r", &pkg, "")).await);
    let deleted = releases.delete("r", DeleteProperties::default()).await.unwrap();

    assert_eq!(deleted.version, 1);
    assert_eq!(deleted.status(), StatusCode::Deleted);
    assert!(deleted.info.deleted.is_some());
    assert!(harness.backend.running().is_empty());

    let err = assert_err!(releases.delete("r", DeleteProperties::default()).await);
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = assert_err!(releases.delete("unknown", DeleteProperties::default()).await);
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Deleted logs are empty
    assert!(releases.log("r", None).await.unwrap().is_empty());

    let reinstalled = releases.install(install_request("r", &pkg, "")).await.unwrap();
    assert_eq!(reinstalled.version, 2);
    assert_eq!(harness.backend.running().len(), 1);
}

#[tokio::test]
async fn test_deleted_release_drops_its_state_machine() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    assert_ok!(releases.install(install_request("r1", &pkg, "")).await);
    assert_ok!(releases.install(install_request("r2", &pkg, "")).await);
    assert_eq!(releases.active_releases(), vec!["r1".to_string(), "r2".to_string()]);

    assert_ok!(releases.delete("r1", DeleteProperties::default()).await);
    assert_eq!(releases.active_releases(), vec!["r2".to_string()]);
    assert_eq!(releases.state("r1").await.unwrap(), ReleaseState::Initial);

    // A failed delete keeps the machine
    let err = assert_err!(releases.delete("r1", DeleteProperties::default()).await);
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(releases.active_releases(), vec!["r1".to_string(), "r2".to_string()]);

    let reinstalled = releases.install(install_request("r1", &pkg, "")).await.unwrap();
    assert_eq!(reinstalled.version, 2);
    assert_eq!(reinstalled.status(), StatusCode::Deployed);
}

#[tokio::test]
async fn test_delete_package_guard() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    assert_ok!(releases.install(install_request("r1", &pkg, "")).await);
    assert_ok!(releases.install(install_request("r2", &pkg, "")).await);

    let with_package = DeleteProperties {
        delete_package: true,
    };
    let err = assert_err!(releases.delete("r1", with_package.clone()).await);
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.to_string().contains("r2-v1"), "{}", err);

    // Refused before anything was undeployed
    assert_eq!(harness.backend.running().len(), 2);
    assert_eq!(
        harness.releases.find_latest("r1").await.unwrap().status(),
        StatusCode::Deployed
    );

    assert_ok!(releases.delete("r2", DeleteProperties::default()).await);
    assert_ok!(releases.delete("r1", with_package).await);
    assert!(harness.backend.running().is_empty());

    let err = assert_err!(harness.packages.find("log", Some("1.0.0")).await);
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_scale() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    let installed = releases.install(install_request("r", &pkg, "")).await.unwrap();
    let scaled = releases.scale("r", scale_request("log", 3)).await.unwrap();

    assert_eq!(scaled.version, installed.version);
    let deployment = harness.backend.deployment(&scaled.deployments["log"]).unwrap();
    assert_eq!(deployment.count, 3);
    assert_eq!(scaled.info.app_statuses[0].instances.len(), 3);

    let instance = scaled.info.app_statuses[0].instances.values().next().unwrap();
    assert_eq!(instance.attributes["rigger.application.name"], "log");
    assert_eq!(instance.attributes["rigger.release.version"], "1");

    let err = assert_err!(releases.scale("r", scale_request("ghost", 2)).await);
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = assert_err!(releases.scale("r", ScaleRequest::default()).await);
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_queries() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    let r1 = releases.install(install_request("r1", &pkg, "")).await.unwrap();
    assert_ok!(releases.install(install_request("r2", &pkg, "")).await);

    let status = releases.status("r1", Some(1)).await.unwrap();
    assert_eq!(status.info.app_statuses[0].state, DeploymentState::Deployed);

    let statuses = releases
        .statuses(&["r1".to_string(), "r2".to_string()])
        .await
        .unwrap();
    assert_eq!(statuses.len(), 2);

    let logs = releases.log("r1", Some("log")).await.unwrap();
    let id = &r1.deployments["log"];
    assert_eq!(logs[id], format!("log of {}", id));
    let err = assert_err!(releases.log("r1", Some("ghost")).await);
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let manifest = releases.manifest("r1", None).await.unwrap();
    assert!(manifest.contains("kind: DeployerApplication"));
    let err = assert_err!(releases.manifest("r1", Some(7)).await);
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_ok!(releases.delete("r1", DeleteProperties::default()).await);
    assert_ok!(releases.install(install_request("r1", &pkg, "")).await);
    let history = releases.history("r1", None).await.unwrap();
    let versions: Vec<u32> = history.iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![2, 1]);
    assert_eq!(releases.history("r1", Some(1)).await.unwrap().len(), 1);

    let err = assert_err!(releases.history("nobody", None).await);
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_cancel_without_upgrade() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    assert!(!releases.cancel("r").await.unwrap());

    assert_ok!(releases.install(install_request("r", &pkg, "")).await);
    assert!(!releases.cancel("r").await.unwrap());
    assert_eq!(releases.state("r").await.unwrap(), ReleaseState::Initial);
    assert_eq!(
        harness.releases.find_latest("r").await.unwrap().status(),
        StatusCode::Deployed
    );
}

#[tokio::test]
async fn test_status_prefers_cached_batch_state() {
    let harness = Harness::with_cache_ttl(Duration::from_millis(300));
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    let installed = releases.install(install_request("r", &pkg, "")).await.unwrap();
    let id = installed.deployments["log"].clone();
    let calls = harness.backend.states_calls();
    harness.backend.set_state(&id, DeploymentState::Failed);

    // Cached batch answer overrides the failed per-id state, instances stay
    let status = releases.status("r", None).await.unwrap();
    let app = &status.info.app_statuses[0];
    assert_eq!(app.state, DeploymentState::Deployed);
    assert_eq!(app.instances.len(), 1);
    let instance = app.instances.values().next().unwrap();
    assert_eq!(instance.attributes["rigger.release.name"], "r");

    let states = releases.deployment_states("r").await.unwrap();
    assert_eq!(states[&id], DeploymentState::Deployed);
    assert_eq!(harness.backend.states_calls(), calls);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let status = releases.status("r", None).await.unwrap();
    assert_eq!(status.info.app_statuses[0].state, DeploymentState::Failed);
    assert_eq!(harness.backend.states_calls(), calls + 1);
}
