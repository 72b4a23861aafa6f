//! Component handlers: one per manageable platform component, all speaking
//! the same lifecycle protocol.
//!
//! A reconcile pass drives each handler through `before` → `resources` →
//! apply → `after` → `discover`, in that order. `before` computes the
//! [`AdoptionDecision`] for components backed by a singleton cluster
//! resource; the decision is threaded by reference through the remaining
//! calls, so nothing can consult it before it exists.

pub mod adoption;
pub mod image_hub;
pub mod metrics_server;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};

pub use adoption::{AdoptionDecision, ServiceRef, resolve_adoption};
pub use image_hub::ImageHub;
pub use metrics_server::MetricsServer;

use crate::config::OperatorConfig;
use crate::crd::PlatformCluster;
use crate::store::{ObjectStore, StoreError};

/// Label key carrying the component name on every rendered object.
pub const LABEL_NAME: &str = "name";
/// Label key marking objects managed by this operator.
pub const LABEL_CREATOR: &str = "creator";
/// Value of [`LABEL_CREATOR`] for objects we render.
pub const CREATOR: &str = "plateau-operator";

/// Base label set for a component's rendered objects. Also used as the
/// workload selector, so callers must never mutate a shared copy in place;
/// see [`labels_with`].
pub fn component_labels(component: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_NAME.to_string(), component.to_string());
    labels.insert(LABEL_CREATOR.to_string(), CREATOR.to_string());
    labels
}

/// Copy-on-write label augmentation. Returns a new map; the base is shared
/// between objects in a pass (it doubles as the workload selector) and must
/// stay untouched.
pub fn labels_with(
    base: &BTreeMap<String, String>,
    extra: &[(&str, &str)],
) -> BTreeMap<String, String> {
    let mut out = base.clone();
    for (k, v) in extra {
        out.insert((*k).to_string(), (*v).to_string());
    }
    out
}

/// Whether a pod reports the `Ready` condition.
pub fn pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Identity and workload shape of one manageable component. Immutable input
/// for the duration of a reconcile pass.
#[derive(Clone, Debug)]
pub struct ComponentSpec {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub replicas: i32,
    pub image_pull_policy: String,
}

/// Read-only inputs shared by every handler invocation within one pass:
/// the store handle, the cluster snapshot, and the pass deadline.
pub struct PassContext {
    pub store: Arc<dyn ObjectStore>,
    pub cluster: Arc<PlatformCluster>,
    pub deadline: Option<Instant>,
}

impl PassContext {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        cluster: Arc<PlatformCluster>,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            store,
            cluster,
            deadline,
        }
    }

    /// Whether the pass deadline has passed. Checked between handler steps;
    /// in-flight store calls are left to complete or fail on their own.
    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    /// Control-plane access failed in a retryable way; the whole pass is
    /// requeued.
    #[error("transient access failure: {0}")]
    Transient(String),
    /// A singleton write lost against a newer revision.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The component or cluster spec is unusable. Fatal to this component
    /// only; other components keep reconciling.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl HandlerError {
    /// Whether requeueing the pass can help. Configuration errors need a
    /// spec change and are the only non-retryable case.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, HandlerError::Configuration(_))
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => HandlerError::Conflict(err.to_string()),
            StoreError::Transient(msg) => HandlerError::Transient(msg),
        }
    }
}

/// One declarative object a handler wants applied. The singleton
/// registration is deliberately absent: it needs revision-token handling
/// and is upserted in `after` instead.
#[derive(Clone, Debug)]
pub enum DesiredObject {
    Workload(Deployment),
    Endpoint(Service),
}

/// Checklist snapshot a pass starts from, used to gate component
/// provisioning on installation progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChecklistSnapshot {
    pub storage_ready: bool,
    pub image_repository_installed: bool,
    pub package_extracted: bool,
    pub image_loaded: bool,
    pub image_pushed: bool,
}

/// The component lifecycle protocol.
#[async_trait]
pub trait ComponentHandler: Send + Sync {
    /// Component name; doubles as the fixed name of its rendered objects.
    fn name(&self) -> &str;

    fn spec(&self) -> &ComponentSpec;

    /// Whether the component may start provisioning given current
    /// installation progress. Components pulling platform images must wait
    /// until those images are pushed to the hub.
    fn ready_to_provision(&self, checklist: &ChecklistSnapshot) -> bool {
        checklist.image_pushed
    }

    /// Minimum healthy pod count `discover` must report for the component
    /// to count as healthy.
    fn expected_ready(&self, _ctx: &PassContext) -> i32 {
        self.spec().replicas
    }

    /// Inspect the control plane for a pre-existing singleton relevant to
    /// this component and decide ownership. Never mutates; idempotent.
    async fn before(&self, ctx: &PassContext) -> Result<AdoptionDecision, HandlerError>;

    /// Pure function of the specs and the adoption decision. Empty when the
    /// component is not owned.
    fn resources(
        &self,
        ctx: &PassContext,
        decision: &AdoptionDecision,
    ) -> Result<Vec<DesiredObject>, HandlerError>;

    /// Side effects beyond the declarative object set, typically the
    /// singleton registration upsert. Skipped entirely when not owned.
    async fn after(
        &self,
        ctx: &PassContext,
        decision: &AdoptionDecision,
    ) -> Result<(), HandlerError>;

    /// Resolve the live pods backing this component for health aggregation.
    async fn discover(
        &self,
        ctx: &PassContext,
        decision: &AdoptionDecision,
    ) -> Result<Vec<Pod>, HandlerError>;
}

/// The components declared for a cluster, in installation order.
pub fn declared_components(
    cluster: &PlatformCluster,
    cfg: &OperatorConfig,
) -> Vec<Arc<dyn ComponentHandler>> {
    let namespace = cluster
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| "default".to_string());
    vec![
        Arc::new(ImageHub::new(ComponentSpec {
            name: image_hub::IMAGE_HUB_NAME.to_string(),
            namespace: namespace.clone(),
            image: cfg.image_hub_image.clone(),
            replicas: cfg.component_replicas,
            image_pull_policy: cfg.image_pull_policy.clone(),
        })),
        Arc::new(MetricsServer::new(ComponentSpec {
            name: metrics_server::METRICS_SERVER_NAME.to_string(),
            namespace,
            image: cfg.metrics_server_image.clone(),
            replicas: cfg.component_replicas,
            image_pull_policy: cfg.image_pull_policy.clone(),
        })),
    ]
}
