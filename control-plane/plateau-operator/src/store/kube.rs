//! [`ObjectStore`] backed by the Kubernetes API.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod, Service};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::APIService;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::trace;

use super::{ObjectStore, RevisionToken, StoreError, StoreResult};

/// Field manager recorded on server-side-applied objects.
const FIELD_MANAGER: &str = "plateau-operator";

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn apply_params() -> PatchParams {
        PatchParams::apply(FIELD_MANAGER).force()
    }
}

fn classify(err: kube::Error, kind: &'static str, name: &str) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict {
            kind,
            name: name.to_string(),
        },
        other => StoreError::Transient(other.to_string()),
    }
}

fn selector_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_registration(
        &self,
        name: &str,
    ) -> StoreResult<Option<(APIService, RevisionToken)>> {
        let api: Api<APIService> = Api::all(self.client.clone());
        let found = api
            .get_opt(name)
            .await
            .map_err(|e| classify(e, "APIService", name))?;
        Ok(found.map(|reg| {
            let token = RevisionToken::new(reg.resource_version().unwrap_or_default());
            (reg, token)
        }))
    }

    async fn create_registration(&self, desired: APIService) -> StoreResult<()> {
        let name = desired.name_any();
        let api: Api<APIService> = Api::all(self.client.clone());
        api.create(&PostParams::default(), &desired)
            .await
            .map_err(|e| classify(e, "APIService", &name))?;
        trace!(%name, "store: registration created");
        Ok(())
    }

    async fn update_registration(
        &self,
        mut desired: APIService,
        token: RevisionToken,
    ) -> StoreResult<()> {
        let name = desired.name_any();
        desired.metadata.resource_version = Some(token.as_str().to_string());
        let api: Api<APIService> = Api::all(self.client.clone());
        api.replace(&name, &PostParams::default(), &desired)
            .await
            .map_err(|e| classify(e, "APIService", &name))?;
        trace!(%name, "store: registration updated");
        Ok(())
    }

    async fn apply_deployment(
        &self,
        namespace: &str,
        desired: Deployment,
    ) -> StoreResult<()> {
        let name = desired.name_any();
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let json = serde_json::to_value(&desired)
            .map_err(|e| StoreError::Transient(e.to_string()))?;
        api.patch(&name, &Self::apply_params(), &Patch::Apply(&json))
            .await
            .map_err(|e| classify(e, "Deployment", &name))?;
        Ok(())
    }

    async fn apply_service(
        &self,
        namespace: &str,
        desired: Service,
    ) -> StoreResult<()> {
        let name = desired.name_any();
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let json = serde_json::to_value(&desired)
            .map_err(|e| StoreError::Transient(e.to_string()))?;
        api.patch(&name, &Self::apply_params(), &Patch::Apply(&json))
            .await
            .map_err(|e| classify(e, "Service", &name))?;
        Ok(())
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<Service>> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| classify(e, "Service", name))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> StoreResult<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default().labels(&selector_string(selector));
        let list = api
            .list(&lp)
            .await
            .map_err(|e| classify(e, "Pod", namespace))?;
        Ok(list.items)
    }

    async fn list_storage_classes(&self) -> StoreResult<Vec<StorageClass>> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| classify(e, "StorageClass", ""))?;
        Ok(list.items)
    }

    async fn list_nodes(&self) -> StoreResult<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| classify(e, "Node", ""))?;
        Ok(list.items)
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<ConfigMap>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| classify(e, "ConfigMap", name))
    }
}
