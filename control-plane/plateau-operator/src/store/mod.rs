//! Control-plane access primitives consumed by the reconciliation kernel.
//!
//! Every read/write the handlers and probes perform goes through the
//! [`ObjectStore`] trait, so a pass can run against the live cluster
//! ([`kube::KubeStore`]) or fully in-process ([`memory::MemoryStore`]).
//! "Not found" is `Ok(None)` on reads, never an error; write races surface
//! as [`StoreError::Conflict`] and everything else retryable as
//! [`StoreError::Transient`].

pub mod kube;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod, Service};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::APIService;

pub use self::kube::KubeStore;
pub use self::memory::MemoryStore;

/// Opaque optimistic-concurrency token captured when a singleton is fetched.
/// An update must carry the token of the revision it was derived from; a
/// stale token fails with [`StoreError::Conflict`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevisionToken(String);

impl RevisionToken {
    pub fn new(revision: impl Into<String>) -> Self {
        Self(revision.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The write lost against a newer revision of the object.
    #[error("conflict writing {kind} {name}: stale revision")]
    Conflict { kind: &'static str, name: String },
    /// The control plane was unreachable or the request failed in a
    /// retryable way.
    #[error("transient access failure: {0}")]
    Transient(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Get/create/update primitives against the control plane, scoped to the
/// object kinds the kernel manages or observes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a cluster-scoped singleton registration together with its
    /// current revision token.
    async fn get_registration(
        &self,
        name: &str,
    ) -> StoreResult<Option<(APIService, RevisionToken)>>;

    /// Create a registration that does not exist yet. The desired object
    /// must not carry a revision token.
    async fn create_registration(&self, desired: APIService) -> StoreResult<()>;

    /// Replace an existing registration. `token` must be the revision the
    /// desired state was derived from.
    async fn update_registration(
        &self,
        desired: APIService,
        token: RevisionToken,
    ) -> StoreResult<()>;

    /// Apply a workload declaratively; repeated application of the same
    /// desired state is a no-op.
    async fn apply_deployment(
        &self,
        namespace: &str,
        desired: Deployment,
    ) -> StoreResult<()>;

    /// Apply a network endpoint declaratively.
    async fn apply_service(
        &self,
        namespace: &str,
        desired: Service,
    ) -> StoreResult<()>;

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<Service>>;

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> StoreResult<Vec<Pod>>;

    async fn list_storage_classes(&self) -> StoreResult<Vec<StorageClass>>;

    async fn list_nodes(&self) -> StoreResult<Vec<Node>>;

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<ConfigMap>>;
}
