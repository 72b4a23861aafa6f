#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use envconfig::Envconfig;
use k8s_openapi::api::core::v1::{
    ConfigMap, Pod, PodCondition, PodStatus, Service, ServiceSpec,
};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::{
    APIService, APIServiceSpec, ServiceReference,
};

use plateau_operator::config::OperatorConfig;
use plateau_operator::controller::reconcile::run_pass;
use plateau_operator::controller::retry::RetryConfig;
use plateau_operator::controller::status_aggregator::aggregate;
use plateau_operator::crd::{
    PlatformCluster, PlatformClusterSpec, PlatformClusterStatus,
};
use plateau_operator::handlers::{PassContext, declared_components};
use plateau_operator::probes::checklist_probes;
use plateau_operator::store::MemoryStore;

// DNS-1123 safe numeric suffix for unique names
pub const DIGITS: [char; 10] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];

pub fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(6, &DIGITS))
}

pub fn cluster(namespace: &str, name: &str) -> PlatformCluster {
    cluster_with(namespace, name, PlatformClusterSpec::default())
}

pub fn cluster_with(
    namespace: &str,
    name: &str,
    spec: PlatformClusterSpec,
) -> PlatformCluster {
    let mut cluster = PlatformCluster::new(name, spec);
    cluster.metadata.namespace = Some(namespace.to_string());
    cluster
}

pub fn ready_pod(
    namespace: &str,
    name: &str,
    labels: BTreeMap<String, String>,
) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        status: Some(PodStatus {
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn storage_class(name: &str) -> StorageClass {
    StorageClass {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        provisioner: "plateau.io/local-path".to_string(),
        ..Default::default()
    }
}

pub fn progress_config_map(stages: &[(&str, bool)]) -> ConfigMap {
    let data = stages
        .iter()
        .map(|(key, done)| (key.to_string(), done.to_string()))
        .collect::<BTreeMap<_, _>>();
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(plateau_operator::probes::PROGRESS_CONFIG_MAP.into()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

pub fn selector_service(
    namespace: &str,
    name: &str,
    selector: BTreeMap<String, String>,
) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A metrics API registration owned by someone else, backed by the given
/// service reference.
pub fn foreign_registration(namespace: &str, name: &str) -> APIService {
    APIService {
        metadata: ObjectMeta {
            name: Some(
                plateau_operator::handlers::metrics_server::METRICS_API_NAME
                    .to_string(),
            ),
            ..Default::default()
        },
        spec: Some(APIServiceSpec {
            service: Some(ServiceReference {
                namespace: Some(namespace.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            }),
            group: Some("metrics.k8s.io".to_string()),
            version: Some("v1beta1".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn test_config() -> OperatorConfig {
    OperatorConfig::init_from_hashmap(&HashMap::new()).expect("defaults")
}

/// Drive one full reconcile pass against the in-memory store and fold the
/// outcomes into a new status, the way the controller does.
pub async fn run_one_pass(
    store: Arc<MemoryStore>,
    cluster: &PlatformCluster,
    previous: Option<&PlatformClusterStatus>,
) -> PlatformClusterStatus {
    let cfg = test_config();
    let ctx = Arc::new(PassContext::new(
        store,
        Arc::new(cluster.clone()),
        None,
    ));
    let handlers = declared_components(cluster, &cfg);
    let probes = checklist_probes();
    let retry = RetryConfig::with_max_attempts(cfg.conflict_retries);
    let outcomes = run_pass(ctx, &handlers, &probes, &retry).await;
    aggregate(previous, &outcomes, Utc::now())
}
