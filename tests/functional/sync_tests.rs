//! ConfigMap synchronization against the in-memory cluster.

use std::sync::Arc;

use ca_injector::resources::{ConfigMapSynchronizer, SyncOutcome};
use ca_injector::Error;

use crate::common::{CONFIGMAP_NAME, FakeCluster, OTHER_CERTIFICATE, TEST_CERTIFICATE};

fn synchronizer(cluster: &Arc<FakeCluster>) -> ConfigMapSynchronizer {
    ConfigMapSynchronizer::new(cluster.clone(), CONFIGMAP_NAME)
}

#[tokio::test]
async fn test_upsert_twice_creates_once() {
    let cluster = Arc::new(FakeCluster::new());
    let sync = synchronizer(&cluster);

    assert_eq!(sync.upsert("team-a", "a", TEST_CERTIFICATE).await.unwrap(), SyncOutcome::Created);
    assert_eq!(sync.upsert("team-a", "a", TEST_CERTIFICATE).await.unwrap(), SyncOutcome::Unchanged);

    assert_eq!(cluster.creates(), 1);
    assert_eq!(cluster.updates(), 0);
}

#[tokio::test]
async fn test_changed_content_updates_and_preserves_other_keys() {
    let cluster = Arc::new(FakeCluster::new().with_config_map(
        "team-a",
        CONFIGMAP_NAME,
        &[("unrelated", "keep me")],
    ));
    let sync = synchronizer(&cluster);

    assert_eq!(sync.upsert("team-a", "a", TEST_CERTIFICATE).await.unwrap(), SyncOutcome::Updated);
    assert_eq!(sync.upsert("team-a", "a", OTHER_CERTIFICATE).await.unwrap(), SyncOutcome::Updated);

    let data = cluster.config_map_data("team-a", CONFIGMAP_NAME).unwrap();
    assert_eq!(data["a"], OTHER_CERTIFICATE);
    assert_eq!(data["unrelated"], "keep me");
    assert_eq!(cluster.creates(), 0);
    assert_eq!(cluster.updates(), 2);
}

#[tokio::test]
async fn test_create_then_update() {
    let cluster = Arc::new(FakeCluster::new());
    let sync = synchronizer(&cluster);

    sync.upsert("team-a", "a", TEST_CERTIFICATE).await.unwrap();
    sync.upsert("team-a", "a", OTHER_CERTIFICATE).await.unwrap();

    assert_eq!(cluster.creates(), 1);
    assert_eq!(cluster.updates(), 1);
}

#[tokio::test]
async fn test_namespaces_are_independent() {
    let cluster = Arc::new(FakeCluster::new());
    let sync = synchronizer(&cluster);

    sync.upsert("team-a", "a", TEST_CERTIFICATE).await.unwrap();
    sync.upsert("team-b", "a", TEST_CERTIFICATE).await.unwrap();

    assert_eq!(cluster.creates(), 2);
    assert!(cluster.config_map_data("team-b", CONFIGMAP_NAME).is_some());
}

#[tokio::test]
async fn test_created_configmap_is_labelled() {
    let cluster = Arc::new(FakeCluster::new());
    synchronizer(&cluster).upsert("team-a", "a", TEST_CERTIFICATE).await.unwrap();

    let cm = cluster.config_map("team-a", CONFIGMAP_NAME).unwrap();
    assert_eq!(
        cm.metadata.labels.unwrap()["app.kubernetes.io/managed-by"],
        "ca-injector"
    );
}

#[tokio::test]
async fn test_concurrent_upserts_keep_every_bundle() {
    let cluster = Arc::new(FakeCluster::new());
    let sync = synchronizer(&cluster);

    let (a, b) = tokio::join!(
        sync.upsert("team-a", "a", TEST_CERTIFICATE),
        sync.upsert("team-a", "b", OTHER_CERTIFICATE),
    );
    a.unwrap();
    b.unwrap();

    let data = cluster.config_map_data("team-a", CONFIGMAP_NAME).unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(cluster.creates(), 1);
}

#[tokio::test]
async fn test_outage_is_sync_error() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.set_unavailable(true);

    let err = synchronizer(&cluster)
        .upsert("team-a", "a", TEST_CERTIFICATE)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Sync { ref namespace, .. } if namespace == "team-a"));
}
