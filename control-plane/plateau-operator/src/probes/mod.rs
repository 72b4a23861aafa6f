//! Installation-progress probes.
//!
//! Each checklist condition is backed by one probe. Probes are read-only
//! and never fail a pass: a transient store error surfaces as an `Unknown`
//! observation so the operator can see the probe itself is in trouble.

use async_trait::async_trait;
use tracing::debug;

use crate::crd::{
    ClusterConditionType, ConditionStatus, NodeAvailPorts, StorageClassInfo,
};
use crate::handlers::{ChecklistSnapshot, PassContext, pod_ready};

/// Storage class the operator provisions when the spec names none.
pub const DEFAULT_STORAGE_CLASS: &str = "plateau-local";

/// ConfigMap the package installer records its progress in, per cluster
/// namespace.
pub const PROGRESS_CONFIG_MAP: &str = "plateau-install-progress";

/// One checklist observation produced by a probe.
#[derive(Clone, Debug)]
pub struct Observation {
    pub type_: ClusterConditionType,
    pub status: ConditionStatus,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl Observation {
    fn of(
        type_: ClusterConditionType,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_,
            status,
            reason: Some(reason.to_string()),
            message: Some(message.into()),
        }
    }

    fn unknown(type_: ClusterConditionType, message: impl Into<String>) -> Self {
        Self::of(type_, ConditionStatus::Unknown, "ProbeFailed", message)
    }
}

#[async_trait]
pub trait InstallProbe: Send + Sync {
    fn condition_type(&self) -> ClusterConditionType;

    async fn observe(&self, ctx: &PassContext) -> Observation;
}

/// The probe set for the fixed checklist, in installation order.
pub fn checklist_probes() -> Vec<Box<dyn InstallProbe>> {
    vec![
        Box::new(StorageReadyProbe),
        Box::new(ImageRepositoryProbe),
        Box::new(PackageStageProbe {
            type_: ClusterConditionType::PackageExtracted,
            key: "packageExtracted",
        }),
        Box::new(PackageStageProbe {
            type_: ClusterConditionType::ImageLoaded,
            key: "imageLoaded",
        }),
        Box::new(PackageStageProbe {
            type_: ClusterConditionType::ImagePushed,
            key: "imagePushed",
        }),
    ]
}

/// Collapse a pass's observations into the snapshot handlers gate on.
pub fn snapshot_from(observations: &[Observation]) -> ChecklistSnapshot {
    let holds = |t: ClusterConditionType| {
        observations
            .iter()
            .any(|o| o.type_ == t && o.status == ConditionStatus::True)
    };
    ChecklistSnapshot {
        storage_ready: holds(ClusterConditionType::StorageReady),
        image_repository_installed: holds(ClusterConditionType::ImageRepositoryInstalled),
        package_extracted: holds(ClusterConditionType::PackageExtracted),
        image_loaded: holds(ClusterConditionType::ImageLoaded),
        image_pushed: holds(ClusterConditionType::ImagePushed),
    }
}

/// True when the storage class platform components will claim exists.
pub struct StorageReadyProbe;

#[async_trait]
impl InstallProbe for StorageReadyProbe {
    fn condition_type(&self) -> ClusterConditionType {
        ClusterConditionType::StorageReady
    }

    async fn observe(&self, ctx: &PassContext) -> Observation {
        let wanted = ctx
            .cluster
            .spec
            .storage_class_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_STORAGE_CLASS);
        match ctx.store.list_storage_classes().await {
            Ok(classes) => {
                if classes
                    .iter()
                    .any(|sc| sc.metadata.name.as_deref() == Some(wanted))
                {
                    Observation::of(
                        self.condition_type(),
                        ConditionStatus::True,
                        "StorageClassReady",
                        format!("storage class {wanted} is available"),
                    )
                } else {
                    Observation::of(
                        self.condition_type(),
                        ConditionStatus::False,
                        "StorageClassNotFound",
                        format!("storage class {wanted} does not exist yet"),
                    )
                }
            }
            Err(err) => Observation::unknown(self.condition_type(), err.to_string()),
        }
    }
}

/// True when an image repository is reachable: either the external hub
/// configured in the spec, or at least one ready pod of the platform's own
/// registry.
pub struct ImageRepositoryProbe;

#[async_trait]
impl InstallProbe for ImageRepositoryProbe {
    fn condition_type(&self) -> ClusterConditionType {
        ClusterConditionType::ImageRepositoryInstalled
    }

    async fn observe(&self, ctx: &PassContext) -> Observation {
        if let Some(hub) = ctx.cluster.spec.image_hub.as_ref() {
            return Observation::of(
                self.condition_type(),
                ConditionStatus::True,
                "ExternalImageHub",
                format!("using external image hub {}", hub.domain),
            );
        }
        let namespace = ctx
            .cluster
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let selector =
            crate::handlers::component_labels(crate::handlers::image_hub::IMAGE_HUB_NAME);
        match ctx.store.list_pods(&namespace, &selector).await {
            Ok(pods) => {
                let ready = pods.iter().filter(|p| pod_ready(p)).count();
                debug!(ready, total = pods.len(), "image hub pods observed");
                if ready > 0 {
                    Observation::of(
                        self.condition_type(),
                        ConditionStatus::True,
                        "ImageHubReady",
                        format!("{ready} image hub pod(s) ready"),
                    )
                } else {
                    Observation::of(
                        self.condition_type(),
                        ConditionStatus::False,
                        "ImageHubNotReady",
                        "no ready image hub pods",
                    )
                }
            }
            Err(err) => Observation::unknown(self.condition_type(), err.to_string()),
        }
    }
}

/// Reads one stage flag from the installer's progress ConfigMap.
pub struct PackageStageProbe {
    type_: ClusterConditionType,
    key: &'static str,
}

#[async_trait]
impl InstallProbe for PackageStageProbe {
    fn condition_type(&self) -> ClusterConditionType {
        self.type_
    }

    async fn observe(&self, ctx: &PassContext) -> Observation {
        let namespace = ctx
            .cluster
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        match ctx.store.get_config_map(&namespace, PROGRESS_CONFIG_MAP).await {
            Ok(Some(cm)) => {
                let done = cm
                    .data
                    .as_ref()
                    .and_then(|d| d.get(self.key))
                    .is_some_and(|v| v == "true");
                if done {
                    Observation::of(
                        self.condition_type(),
                        ConditionStatus::True,
                        "StageComplete",
                        format!("installer reported {} complete", self.key),
                    )
                } else {
                    Observation::of(
                        self.condition_type(),
                        ConditionStatus::False,
                        "StagePending",
                        format!("installer has not completed {}", self.key),
                    )
                }
            }
            Ok(None) => Observation::of(
                self.condition_type(),
                ConditionStatus::False,
                "WaitingForPackage",
                "package installer has not started",
            ),
            Err(err) => Observation::unknown(self.condition_type(), err.to_string()),
        }
    }
}

/// Storage classes present in the cluster, for the status subresource.
/// `None` on probe failure so previously reported values are preserved.
pub async fn discover_storage_classes(
    ctx: &PassContext,
) -> Option<Vec<StorageClassInfo>> {
    match ctx.store.list_storage_classes().await {
        Ok(classes) => Some(
            classes
                .into_iter()
                .filter_map(|sc| {
                    sc.metadata.name.clone().map(|name| StorageClassInfo {
                        name,
                        provisioner: sc.provisioner,
                    })
                })
                .collect(),
        ),
        Err(err) => {
            debug!(%err, "storage class discovery failed");
            None
        }
    }
}

/// Gateway ports the platform advertises on each node, for the status
/// subresource. Actual port occupancy scanning happens on the nodes
/// themselves; the operator reports the advertised set per node address.
pub async fn discover_node_avail_ports(
    ctx: &PassContext,
) -> Option<Vec<NodeAvailPorts>> {
    const GATEWAY_PORTS: [i32; 4] = [80, 443, 6060, 7070];

    match ctx.store.list_nodes().await {
        Ok(nodes) => Some(
            nodes
                .into_iter()
                .map(|node| {
                    let node_ip = node.status.as_ref().and_then(|s| {
                        s.addresses.as_ref().and_then(|addrs| {
                            addrs
                                .iter()
                                .find(|a| a.type_ == "InternalIP")
                                .map(|a| a.address.clone())
                        })
                    });
                    NodeAvailPorts {
                        node_name: node.metadata.name.clone(),
                        node_ip,
                        ports: GATEWAY_PORTS.to_vec(),
                    }
                })
                .collect(),
        ),
        Err(err) => {
            debug!(%err, "node discovery failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::api::storage::v1::StorageClass;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;
    use crate::crd::{PlatformCluster, PlatformClusterSpec};
    use crate::store::MemoryStore;

    fn ctx(store: Arc<MemoryStore>) -> PassContext {
        let mut cluster =
            PlatformCluster::new("cluster", PlatformClusterSpec::default());
        cluster.metadata.namespace = Some("platform".into());
        PassContext::new(store, Arc::new(cluster), None)
    }

    #[tokio::test]
    async fn storage_probe_tracks_default_class() {
        let store = Arc::new(MemoryStore::new());
        let ctx = ctx(store.clone());

        let obs = StorageReadyProbe.observe(&ctx).await;
        assert_eq!(obs.status, ConditionStatus::False);

        store
            .seed_storage_class(StorageClass {
                metadata: ObjectMeta {
                    name: Some(DEFAULT_STORAGE_CLASS.into()),
                    ..Default::default()
                },
                provisioner: "plateau.io/local-path".into(),
                ..Default::default()
            })
            .await;
        let obs = StorageReadyProbe.observe(&ctx).await;
        assert_eq!(obs.status, ConditionStatus::True);
    }

    #[tokio::test]
    async fn package_probe_reads_stage_flags() {
        let store = Arc::new(MemoryStore::new());
        let ctx = ctx(store.clone());
        let probe = PackageStageProbe {
            type_: ClusterConditionType::ImagePushed,
            key: "imagePushed",
        };

        let obs = probe.observe(&ctx).await;
        assert_eq!(obs.status, ConditionStatus::False);
        assert_eq!(obs.reason.as_deref(), Some("WaitingForPackage"));

        let mut data = BTreeMap::new();
        data.insert("imagePushed".to_string(), "true".to_string());
        store
            .seed_config_map(
                "platform",
                ConfigMap {
                    metadata: ObjectMeta {
                        name: Some(PROGRESS_CONFIG_MAP.into()),
                        ..Default::default()
                    },
                    data: Some(data),
                    ..Default::default()
                },
            )
            .await;
        let obs = probe.observe(&ctx).await;
        assert_eq!(obs.status, ConditionStatus::True);
    }

    #[tokio::test]
    async fn node_discovery_reports_internal_addresses() {
        use k8s_openapi::api::core::v1::{Node, NodeAddress, NodeStatus};

        let store = Arc::new(MemoryStore::new());
        store
            .seed_node(Node {
                metadata: ObjectMeta {
                    name: Some("node-1".into()),
                    ..Default::default()
                },
                status: Some(NodeStatus {
                    addresses: Some(vec![NodeAddress {
                        type_: "InternalIP".into(),
                        address: "10.0.0.4".into(),
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .await;
        let ctx = ctx(store);

        let ports = discover_node_avail_ports(&ctx).await.unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].node_name.as_deref(), Some("node-1"));
        assert_eq!(ports[0].node_ip.as_deref(), Some("10.0.0.4"));
        assert!(ports[0].ports.contains(&443));
    }

    #[test]
    fn snapshot_requires_true_status() {
        let observations = vec![
            Observation::of(
                ClusterConditionType::StorageReady,
                ConditionStatus::True,
                "StorageClassReady",
                "",
            ),
            Observation::of(
                ClusterConditionType::ImagePushed,
                ConditionStatus::Unknown,
                "ProbeFailed",
                "",
            ),
        ];
        let snapshot = snapshot_from(&observations);
        assert!(snapshot.storage_ready);
        assert!(!snapshot.image_pushed);
    }
}
