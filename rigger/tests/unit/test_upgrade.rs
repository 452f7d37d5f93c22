//! Upgrade, rollback, cancel and timeout tests

use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use rigger::errors::{ErrorKind, RiggerError};
use rigger::models::{
    DeleteProperties, RollbackRequest, ScaleItem, ScaleRequest, StatusCode, UpgradeRequest,
};
use rigger::orchestrator::{ReleaseService, ReleaseState};
use rigger::store::ReleaseStore;

use crate::common::{
    app_values, composite, install_request, package, upgrade_request, Harness,
};

fn rollback_request(release: &str, version: u32) -> RollbackRequest {
    RollbackRequest {
        release_name: release.to_string(),
        version,
        timeout: None,
    }
}

/// Wait until the release is waiting on the health of its target apps
async fn until_cancellable(releases: &ReleaseService, name: &str) {
    for _ in 0..500 {
        if releases.state(name).await.unwrap().is_cancellable() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("release [{}] never reached the health check", name);
}

#[tokio::test]
async fn test_upgrade() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    let v1 = releases.install(install_request("r", &pkg, "")).await.unwrap();
    let v2 = releases
        .upgrade(upgrade_request("r", &pkg, &app_values("error")))
        .await
        .unwrap();

    assert_eq!(v2.version, 2);
    assert_eq!(v2.status(), StatusCode::Deployed);
    assert_eq!(v2.info.description, "Upgrade complete");
    assert_ne!(v2.deployments["log"], v1.deployments["log"]);

    let deployment = harness.backend.deployment(&v2.deployments["log"]).unwrap();
    assert_eq!(deployment.request.application_properties["log.level"], "error");

    // Source apps are retired only after the target is healthy
    assert_eq!(harness.backend.running(), vec![v2.deployments["log"].clone()]);
    let v1 = harness.releases.find_by_name_and_version("r", 1).await.unwrap();
    assert_eq!(v1.status(), StatusCode::Deleted);
    assert_eq!(v1.info.description, "Superseded by version 2");
}

#[tokio::test]
async fn test_upgrade_without_changes() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    assert_ok!(releases.install(install_request("r", &pkg, "")).await);

    let err = assert_err!(releases.upgrade(upgrade_request("r", &pkg, "")).await);
    assert_eq!(err.kind(), ErrorKind::Analysis);

    let forced = releases
        .upgrade(UpgradeRequest {
            force: true,
            ..upgrade_request("r", &pkg, "")
        })
        .await
        .unwrap();
    assert_eq!(forced.status(), StatusCode::Deployed);
    assert_eq!(harness.backend.running().len(), 1);
}

#[tokio::test]
async fn test_upgrade_keeps_scaled_instance_count() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    assert_ok!(releases.install(install_request("r", &pkg, "")).await);
    let scale = ScaleRequest {
        items: vec![ScaleItem {
            name: "log".to_string(),
            count: 2,
            properties: Default::default(),
        }],
    };
    assert_ok!(releases.scale("r", scale).await);

    let v2 = releases
        .upgrade(upgrade_request("r", &pkg, &app_values("WARN")))
        .await
        .unwrap();
    let deployment = harness.backend.deployment(&v2.deployments["log"]).unwrap();
    assert_eq!(deployment.count, 2);
    assert_eq!(deployment.request.deployment_properties["deployer.count"], "2");
}

#[tokio::test]
async fn test_composite_upgrade_carries_unchanged_apps() {
    let harness = Harness::new();
    let pkg = composite(
        "stream",
        "1.0.0",
        vec![
            package("time", "1.0.0", &app_values("INFO")),
            package("log", "1.0.0", &app_values("INFO")),
        ],
    );
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    let v1 = releases.install(install_request("s", &pkg, "")).await.unwrap();
    let overrides = "log:\n  spec:\n    applicationProperties:\n      log.level: WARN\n";
    let v2 = releases
        .upgrade(upgrade_request("s", &pkg, overrides))
        .await
        .unwrap();

    assert_eq!(v2.deployments["time"], v1.deployments["time"]);
    assert_ne!(v2.deployments["log"], v1.deployments["log"]);
    let mut running = harness.backend.running();
    running.sort();
    let mut expected = vec![v2.deployments["time"].clone(), v2.deployments["log"].clone()];
    expected.sort();
    assert_eq!(running, expected);

    // Deleting the release undeploys the shared app once
    assert_ok!(releases.delete("s", DeleteProperties::default()).await);
    assert!(harness.backend.running().is_empty());
}

#[tokio::test]
async fn test_versions_increase_across_operations() {
    let harness = Harness::with_timeout(Duration::from_millis(50));
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    assert_eq!(releases.install(install_request("r", &pkg, "")).await.unwrap().version, 1);
    let v2 = releases
        .upgrade(upgrade_request("r", &pkg, &app_values("WARN")))
        .await
        .unwrap();
    assert_eq!(v2.version, 2);

    // A failed upgrade still consumes its version
    harness.backend.set_unhealthy(true);
    assert_err!(
        releases
            .upgrade(upgrade_request("r", &pkg, &app_values("ERROR")))
            .await
    );
    harness.backend.set_unhealthy(false);

    let rolled_back = releases.rollback(rollback_request("r", 0)).await.unwrap();
    assert_eq!(rolled_back.version, 4);

    let versions: Vec<u32> = releases
        .history("r", None)
        .await
        .unwrap()
        .iter()
        .map(|r| r.version)
        .collect();
    assert_eq!(versions, vec![4, 3, 2, 1]);
}

#[tokio::test]
async fn test_rollback_to_previous_version() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    assert_ok!(releases.install(install_request("r", &pkg, "")).await);
    assert_ok!(
        releases
            .upgrade(upgrade_request("r", &pkg, &app_values("WARN")))
            .await
    );

    let v3 = releases.rollback(rollback_request("r", 0)).await.unwrap();
    assert_eq!(v3.version, 3);
    assert_eq!(v3.status(), StatusCode::Deployed);
    assert_eq!(v3.info.description, "Rollback complete");

    let deployment = harness.backend.deployment(&v3.deployments["log"]).unwrap();
    assert_eq!(deployment.request.application_properties["log.level"], "DEBUG");
    assert_eq!(harness.backend.running().len(), 1);

    let v2 = harness.releases.find_by_name_and_version("r", 2).await.unwrap();
    assert_eq!(v2.status(), StatusCode::Deleted);
}

#[tokio::test]
async fn test_rollback_of_deleted_release_reinstalls() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    assert_ok!(releases.install(install_request("r", &pkg, "")).await);
    assert_ok!(releases.delete("r", DeleteProperties::default()).await);
    assert!(harness.backend.running().is_empty());

    let v2 = releases.rollback(rollback_request("r", 1)).await.unwrap();
    assert_eq!(v2.version, 2);
    assert_eq!(v2.status(), StatusCode::Deployed);
    assert_eq!(harness.backend.running(), vec![v2.deployments["log"].clone()]);
}

#[tokio::test]
async fn test_rollback_to_failed_version_conflicts() {
    let harness = Harness::with_timeout(Duration::from_millis(30));
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    assert_ok!(releases.install(install_request("r", &pkg, "")).await);
    harness.backend.set_unhealthy(true);
    assert_err!(
        releases
            .upgrade(upgrade_request("r", &pkg, &app_values("WARN")))
            .await
    );

    let err = assert_err!(releases.rollback(rollback_request("r", 2)).await);
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.to_string().contains("deployed or deleted"));

    let err = assert_err!(releases.rollback(rollback_request("r", 9)).await);
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Only version 1 is good and it is the current one
    let err = assert_err!(releases.rollback(rollback_request("r", 0)).await);
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_upgrade_timeout_leaves_targets_running() {
    let harness = Harness::with_timeout(Duration::from_millis(50));
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    let v1 = releases.install(install_request("r", &pkg, "")).await.unwrap();
    harness.backend.set_unhealthy(true);

    let err = assert_err!(
        releases
            .upgrade(upgrade_request("r", &pkg, &app_values("WARN")))
            .await
    );
    assert!(matches!(err, RiggerError::Timeout { version: 2, .. }), "{}", err);
    assert!(err.is_failure());

    let v2 = harness.releases.find_by_name_and_version("r", 2).await.unwrap();
    assert_eq!(v2.status(), StatusCode::Failed);
    assert!(v2.info.description.starts_with("Did not detect apps"));
    assert_eq!(harness.backend.running().len(), 2);
    assert!(harness.backend.running().contains(&v2.deployments["log"]));

    let current = harness.releases.find_latest_for_update("r").await.unwrap();
    assert_eq!(current.version, 1);
    assert_eq!(current.deployments, v1.deployments);
    assert_eq!(releases.state("r").await.unwrap(), ReleaseState::Initial);
}

#[tokio::test]
async fn test_cancel_during_health_wait() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = harness.state.releases.clone();

    let v1 = releases.install(install_request("r", &pkg, "")).await.unwrap();
    harness.backend.set_unhealthy(true);

    let upgrading = {
        let releases = releases.clone();
        let request = upgrade_request("r", &pkg, &app_values("WARN"));
        tokio::spawn(async move { releases.upgrade(request).await })
    };
    until_cancellable(&releases, "r").await;

    assert!(releases.cancel("r").await.unwrap());
    let err = upgrading.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(!err.is_failure());

    let v2 = harness.releases.find_by_name_and_version("r", 2).await.unwrap();
    assert_eq!(v2.status(), StatusCode::Failed);
    assert!(v2.info.description.starts_with("Cancelled after"));
    assert!(v2.deployments.is_empty());

    // Back on the pre-upgrade version with the target undeployed
    assert_eq!(harness.backend.running(), vec![v1.deployments["log"].clone()]);
    let current = harness.releases.find_latest_for_update("r").await.unwrap();
    assert_eq!(current.version, 1);
    assert!(!releases.cancel("r").await.unwrap());
}

#[tokio::test]
async fn test_cancel_during_health_check() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = harness.state.releases.clone();

    let v1 = releases.install(install_request("r", &pkg, "")).await.unwrap();
    harness.backend.hold_status_of(2);

    let upgrading = {
        let releases = releases.clone();
        let request = upgrade_request("r", &pkg, &app_values("WARN"));
        tokio::spawn(async move { releases.upgrade(request).await })
    };
    for _ in 0..500 {
        if harness.backend.held_calls() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(harness.backend.held_calls(), 1);
    assert_eq!(
        releases.state("r").await.unwrap(),
        ReleaseState::UpgradeCheckTargetApps
    );

    // Accepted now, applied once the check returns healthy
    assert!(releases.cancel("r").await.unwrap());
    harness.backend.release_status();

    let err = upgrading.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let v2 = harness.releases.find_by_name_and_version("r", 2).await.unwrap();
    assert_eq!(v2.status(), StatusCode::Failed);
    assert!(v2.info.description.starts_with("Cancelled after"));
    assert_eq!(harness.backend.running(), vec![v1.deployments["log"].clone()]);
    assert_eq!(releases.state("r").await.unwrap(), ReleaseState::Initial);
}

#[tokio::test]
async fn test_concurrent_upgrades_are_serialized() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = &harness.state.releases;

    assert_ok!(releases.install(install_request("r", &pkg, "")).await);
    let (first, second) = tokio::join!(
        releases.upgrade(upgrade_request("r", &pkg, &app_values("WARN"))),
        releases.upgrade(upgrade_request("r", &pkg, &app_values("ERROR"))),
    );

    let outcomes = [first, second];
    let succeeded: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
    let refused: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().err()).collect();
    assert_eq!(succeeded.len(), 1);
    assert_eq!(refused.len(), 1);
    assert_eq!(refused[0].kind(), ErrorKind::Conflict);
    assert!(refused[0].to_string().contains("not in a state ready to upgrade"));

    // Only one target was ever deployed
    assert_eq!(succeeded[0].version, 2);
    assert_eq!(releases.history("r", None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_operations_refused_while_upgrading() {
    let harness = Harness::new();
    let pkg = package("log", "1.0.0", &app_values("DEBUG"));
    harness.add_package(&pkg).await;
    let releases = harness.state.releases.clone();

    assert_ok!(releases.install(install_request("r", &pkg, "")).await);
    harness.backend.set_unhealthy(true);

    let upgrading = {
        let releases = Arc::clone(&releases);
        let request = upgrade_request("r", &pkg, &app_values("WARN"));
        tokio::spawn(async move { releases.upgrade(request).await })
    };
    until_cancellable(&releases, "r").await;

    let err = assert_err!(releases.delete("r", DeleteProperties::default()).await);
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let err = assert_err!(releases.rollback(rollback_request("r", 0)).await);
    assert_eq!(err.kind(), ErrorKind::Conflict);

    harness.backend.mark_all_deployed();
    let v2 = upgrading.await.unwrap().unwrap();
    assert_eq!(v2.version, 2);
    assert_eq!(v2.status(), StatusCode::Deployed);
}
