//! In-process [`ObjectStore`] used by the test suite and the dev profile.
//!
//! Revision tokens are a monotonically increasing counter; updates carrying
//! a stale token fail with [`StoreError::Conflict`], mirroring the API
//! server's optimistic-concurrency behavior.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod, Service};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::APIService;
use kube::ResourceExt;
use tokio::sync::Mutex;

use super::{ObjectStore, RevisionToken, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    revision: u64,
    registrations: BTreeMap<String, APIService>,
    deployments: BTreeMap<(String, String), Deployment>,
    services: BTreeMap<(String, String), Service>,
    pods: Vec<Pod>,
    storage_classes: Vec<StorageClass>,
    nodes: Vec<Node>,
    config_maps: BTreeMap<(String, String), ConfigMap>,
}

impl Inner {
    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_registration(&self, mut reg: APIService) {
        let mut inner = self.inner.lock().await;
        let rev = inner.next_revision();
        reg.metadata.resource_version = Some(rev);
        inner.registrations.insert(reg.name_any(), reg);
    }

    pub async fn seed_pod(&self, pod: Pod) {
        self.inner.lock().await.pods.push(pod);
    }

    pub async fn seed_service(&self, namespace: &str, svc: Service) {
        self.inner
            .lock()
            .await
            .services
            .insert((namespace.to_string(), svc.name_any()), svc);
    }

    pub async fn seed_storage_class(&self, sc: StorageClass) {
        self.inner.lock().await.storage_classes.push(sc);
    }

    pub async fn seed_node(&self, node: Node) {
        self.inner.lock().await.nodes.push(node);
    }

    pub async fn seed_config_map(&self, namespace: &str, cm: ConfigMap) {
        self.inner
            .lock()
            .await
            .config_maps
            .insert((namespace.to_string(), cm.name_any()), cm);
    }

    pub async fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.inner
            .lock()
            .await
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub async fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.inner
            .lock()
            .await
            .services
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub async fn registration(&self, name: &str) -> Option<APIService> {
        self.inner.lock().await.registrations.get(name).cloned()
    }
}

fn matches_selector(pod: &Pod, selector: &BTreeMap<String, String>) -> bool {
    let labels = &pod.metadata.labels;
    selector.iter().all(|(k, v)| {
        labels
            .as_ref()
            .and_then(|l| l.get(k))
            .is_some_and(|found| found == v)
    })
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_registration(
        &self,
        name: &str,
    ) -> StoreResult<Option<(APIService, RevisionToken)>> {
        let inner = self.inner.lock().await;
        Ok(inner.registrations.get(name).map(|reg| {
            let token = RevisionToken::new(reg.resource_version().unwrap_or_default());
            (reg.clone(), token)
        }))
    }

    async fn create_registration(&self, mut desired: APIService) -> StoreResult<()> {
        let name = desired.name_any();
        let mut inner = self.inner.lock().await;
        if inner.registrations.contains_key(&name) {
            return Err(StoreError::Conflict {
                kind: "APIService",
                name,
            });
        }
        let rev = inner.next_revision();
        desired.metadata.resource_version = Some(rev);
        inner.registrations.insert(name, desired);
        Ok(())
    }

    async fn update_registration(
        &self,
        mut desired: APIService,
        token: RevisionToken,
    ) -> StoreResult<()> {
        let name = desired.name_any();
        let mut inner = self.inner.lock().await;
        let current = inner.registrations.get(&name).ok_or_else(|| {
            StoreError::Transient(format!("registration {name} vanished"))
        })?;
        if current.resource_version().as_deref() != Some(token.as_str()) {
            return Err(StoreError::Conflict {
                kind: "APIService",
                name,
            });
        }
        let rev = inner.next_revision();
        desired.metadata.resource_version = Some(rev);
        inner.registrations.insert(name, desired);
        Ok(())
    }

    async fn apply_deployment(
        &self,
        namespace: &str,
        desired: Deployment,
    ) -> StoreResult<()> {
        let key = (namespace.to_string(), desired.name_any());
        self.inner.lock().await.deployments.insert(key, desired);
        Ok(())
    }

    async fn apply_service(
        &self,
        namespace: &str,
        desired: Service,
    ) -> StoreResult<()> {
        let key = (namespace.to_string(), desired.name_any());
        self.inner.lock().await.services.insert(key, desired);
        Ok(())
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<Service>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .services
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> StoreResult<Vec<Pod>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .pods
            .iter()
            .filter(|p| p.metadata.namespace.as_deref() == Some(namespace))
            .filter(|p| matches_selector(p, selector))
            .cloned()
            .collect())
    }

    async fn list_storage_classes(&self) -> StoreResult<Vec<StorageClass>> {
        Ok(self.inner.lock().await.storage_classes.clone())
    }

    async fn list_nodes(&self) -> StoreResult<Vec<Node>> {
        Ok(self.inner.lock().await.nodes.clone())
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<ConfigMap>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}
