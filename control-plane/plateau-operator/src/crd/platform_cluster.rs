use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default domain of the platform-managed image repository, used when the
/// spec leaves `imageRepositoryDomain` unset.
pub const DEFAULT_IMAGE_REPOSITORY_DOMAIN: &str = "hub.plateau.local";

/// Connection information for the image repository holding platform images.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct ImageHub {
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Connection information for a platform database.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct Database {
    pub host: String,
    pub port: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Client configuration for the coordination service.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct EtcdConfig {
    /// Endpoints is a list of URLs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<String>,
    /// Whether to use TLS to connect to etcd.
    #[serde(default, rename = "useTLS")]
    pub use_tls: bool,
    /// Selector for the secret holding client certificates when TLS is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_secret: Option<LabelSelector>,
}

#[derive(
    CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default,
)]
#[kube(
    group = "plateau.io",
    version = "v1alpha1",
    kind = "PlatformCluster",
    plural = "platformclusters",
    namespaced,
    status = "PlatformClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct PlatformClusterSpec {
    /// Domain name of the image repository the platform is installed from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_repository_domain: Option<String>,
    /// External image hub. The operator provisions its own registry when
    /// this is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_hub: Option<ImageHub>,
    /// Storage class used by platform components. The operator provisions a
    /// default one when this is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    /// Region database connection. The operator provisions a database when
    /// this is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_database: Option<Database>,
    /// Console database connection. The operator provisions a database when
    /// this is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_database: Option<Database>,
    /// Coordination-service connection. The operator provisions etcd when
    /// this is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etcd_config: Option<EtcdConfig>,
}

impl PlatformClusterSpec {
    pub fn image_repository_domain(&self) -> &str {
        self.image_repository_domain
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_IMAGE_REPOSITORY_DOMAIN)
    }
}

/// Installation phase of the cluster at the current time.
#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq,
)]
pub enum ClusterPhase {
    /// Accepted by the system, but no component has started provisioning.
    Pending,
    /// Installation in progress.
    Installing,
    /// All checklist conditions hold and every component reports healthy.
    Running,
}

impl Default for ClusterPhase {
    fn default() -> Self {
        ClusterPhase::Pending
    }
}

/// Installation-progress checklist entries tracked in the cluster status.
#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq,
)]
pub enum ClusterConditionType {
    StorageReady,
    ImageRepositoryInstalled,
    PackageExtracted,
    ImageLoaded,
    ImagePushed,
    #[serde(other)]
    Unknown,
}

impl ClusterConditionType {
    /// The fixed checklist, in installation order. All of these must be
    /// `True` before the cluster can be considered running.
    pub const CHECKLIST: [ClusterConditionType; 5] = [
        ClusterConditionType::StorageReady,
        ClusterConditionType::ImageRepositoryInstalled,
        ClusterConditionType::PackageExtracted,
        ClusterConditionType::ImageLoaded,
        ClusterConditionType::ImagePushed,
    ];
}

#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq,
)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Details for one checklist condition of the cluster.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct ClusterCondition {
    #[serde(rename = "type")]
    pub type_: ClusterConditionType,
    pub status: ConditionStatus,
    /// Last time the condition was observed, regardless of outcome.
    #[serde(rename = "lastProbeTime", skip_serializing_if = "Option::is_none")]
    pub last_probe_time: Option<String>,
    /// Last time the condition transitioned from one status to another.
    #[serde(
        rename = "lastTransitionTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_transition_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct NodeAvailPorts {
    #[serde(rename = "nodeName", skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(rename = "nodeIP", skip_serializing_if = "Option::is_none")]
    pub node_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<i32>,
}

/// A storage class observed in the cluster.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct StorageClassInfo {
    pub name: String,
    pub provisioner: String,
}

/// Observed state of a PlatformCluster. Written only by the status
/// aggregator, as one commit per reconcile pass.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlatformClusterStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<ClusterPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<ClusterCondition>>,
    /// A human readable message indicating details about why the cluster is
    /// in this phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// A brief CamelCase reason for the current phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "nodeAvailPorts", skip_serializing_if = "Option::is_none")]
    pub node_avail_ports: Option<Vec<NodeAvailPorts>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_classes: Option<Vec<StorageClassInfo>>,
}

impl PlatformClusterStatus {
    pub fn phase(&self) -> ClusterPhase {
        self.phase.unwrap_or_default()
    }
}
