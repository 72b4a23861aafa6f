//! End-to-end reconciliation against the in-memory store: the full
//! installation walk from an empty cluster to Running, and deference to a
//! foreign metrics provider.

use std::sync::Arc;

use kube::ResourceExt;
use plateau_operator::crd::ClusterPhase;
use plateau_operator::handlers::component_labels;
use plateau_operator::handlers::image_hub::IMAGE_HUB_NAME;
use plateau_operator::handlers::metrics_server::{
    METRICS_API_NAME, METRICS_SERVER_NAME,
};
use plateau_operator::probes::DEFAULT_STORAGE_CLASS;
use plateau_operator::store::MemoryStore;

mod common;
use common::{
    cluster, progress_config_map, ready_pod, run_one_pass, selector_service,
    storage_class, uniq,
};

#[test_log::test(tokio::test)]
async fn installation_walks_pending_installing_running() {
    let ns = "platform";
    let store = Arc::new(MemoryStore::new());
    let cluster = cluster(ns, &uniq("cluster"));
    let mut phases = Vec::new();

    // Pass 1: empty cluster, nothing can provision yet.
    let status = run_one_pass(store.clone(), &cluster, None).await;
    phases.push(status.phase.unwrap());
    assert_eq!(status.phase, Some(ClusterPhase::Pending));
    assert!(store.deployment(ns, IMAGE_HUB_NAME).await.is_none());
    assert!(store.registration(METRICS_API_NAME).await.is_none());

    // Storage arrives; the hub may provision.
    store.seed_storage_class(storage_class(DEFAULT_STORAGE_CLASS)).await;
    let status = run_one_pass(store.clone(), &cluster, Some(&status)).await;
    phases.push(status.phase.unwrap());
    assert_eq!(status.phase, Some(ClusterPhase::Installing));
    assert!(store.deployment(ns, IMAGE_HUB_NAME).await.is_some());
    // The metrics server still waits for platform images.
    assert!(store.deployment(ns, METRICS_SERVER_NAME).await.is_none());

    // Hub comes up and the installer finishes the package stages.
    store
        .seed_pod(ready_pod(ns, "image-hub-0", component_labels(IMAGE_HUB_NAME)))
        .await;
    store
        .seed_config_map(
            ns,
            progress_config_map(&[
                ("packageExtracted", true),
                ("imageLoaded", true),
                ("imagePushed", true),
            ]),
        )
        .await;
    let status = run_one_pass(store.clone(), &cluster, Some(&status)).await;
    phases.push(status.phase.unwrap());
    assert_eq!(status.phase, Some(ClusterPhase::Installing));

    // The metrics server provisioned this pass: workload, endpoint, and a
    // freshly created singleton registration.
    assert!(store.deployment(ns, METRICS_SERVER_NAME).await.is_some());
    assert!(store.service(ns, METRICS_SERVER_NAME).await.is_some());
    let registration = store
        .registration(METRICS_API_NAME)
        .await
        .expect("registration created");
    let first_revision = registration.resource_version().unwrap();

    // Metrics pods become ready; the cluster converges.
    store
        .seed_pod(ready_pod(
            ns,
            "metrics-server-0",
            component_labels(METRICS_SERVER_NAME),
        ))
        .await;
    let status = run_one_pass(store.clone(), &cluster, Some(&status)).await;
    phases.push(status.phase.unwrap());
    assert_eq!(status.phase, Some(ClusterPhase::Running));
    assert_eq!(status.reason.as_deref(), Some("InstallationComplete"));

    // The singleton went through the update path with the observed token.
    let registration = store.registration(METRICS_API_NAME).await.unwrap();
    assert_ne!(registration.resource_version().unwrap(), first_revision);

    // Each phase was entered exactly once, in installation order.
    assert_eq!(
        phases,
        vec![
            ClusterPhase::Pending,
            ClusterPhase::Installing,
            ClusterPhase::Installing,
            ClusterPhase::Running,
        ]
    );

    // A converged cluster stays converged under repeated reconciliation.
    let settled = run_one_pass(store.clone(), &cluster, Some(&status)).await;
    assert_eq!(settled.phase, Some(ClusterPhase::Running));
}

#[test_log::test(tokio::test)]
async fn foreign_metrics_provider_is_left_alone() {
    let ns = "platform";
    let store = Arc::new(MemoryStore::new());
    let cluster = cluster(ns, &uniq("cluster"));

    // Another party already registered the metrics API, backed by its own
    // service and pods in a different namespace.
    let foreign_selector = std::collections::BTreeMap::from([(
        "app".to_string(),
        "other-metrics".to_string(),
    )]);
    store
        .seed_registration(common::foreign_registration("other", "other-svc"))
        .await;
    store
        .seed_service(
            "other",
            selector_service("other", "other-svc", foreign_selector.clone()),
        )
        .await;
    store
        .seed_pod(ready_pod("other", "other-metrics-0", foreign_selector))
        .await;

    // Everything else is in place for a full installation.
    store.seed_storage_class(storage_class(DEFAULT_STORAGE_CLASS)).await;
    store
        .seed_pod(ready_pod(ns, "image-hub-0", component_labels(IMAGE_HUB_NAME)))
        .await;
    store
        .seed_config_map(
            ns,
            progress_config_map(&[
                ("packageExtracted", true),
                ("imageLoaded", true),
                ("imagePushed", true),
            ]),
        )
        .await;

    let status = run_one_pass(store.clone(), &cluster, None).await;

    // No competing workload or endpoint was rendered, and the foreign
    // registration kept its back-reference.
    assert!(store.deployment(ns, METRICS_SERVER_NAME).await.is_none());
    assert!(store.service(ns, METRICS_SERVER_NAME).await.is_none());
    let registration = store.registration(METRICS_API_NAME).await.unwrap();
    let backing = registration.spec.unwrap().service.unwrap();
    assert_eq!(backing.namespace.as_deref(), Some("other"));
    assert_eq!(backing.name.as_deref(), Some("other-svc"));

    // Health still converges through the foreign pods.
    assert_eq!(status.phase, Some(ClusterPhase::Running));
}
