//! Handler for the platform image repository.
//!
//! When the cluster spec carries an external `imageHub`, there is nothing
//! to provision and the component is satisfied externally. Otherwise the
//! platform runs its own registry; its health backs the
//! `ImageRepositoryInstalled` condition. There is no singleton involved, so
//! `before` never has an adoption tie-break to run.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, Pod, PodSpec, PodTemplateSpec, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, ObjectMeta,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{
    AdoptionDecision, ChecklistSnapshot, ComponentHandler, ComponentSpec,
    DesiredObject, HandlerError, PassContext, component_labels,
};

pub const IMAGE_HUB_NAME: &str = "image-hub";

const REGISTRY_PORT: i32 = 5000;

pub struct ImageHub {
    spec: ComponentSpec,
    labels: BTreeMap<String, String>,
}

impl ImageHub {
    pub fn new(spec: ComponentSpec) -> Self {
        let labels = component_labels(&spec.name);
        Self { spec, labels }
    }

    fn external(&self, ctx: &PassContext) -> bool {
        ctx.cluster.spec.image_hub.is_some()
    }

    fn deployment(&self, ctx: &PassContext) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(IMAGE_HUB_NAME.to_string()),
                namespace: Some(self.spec.namespace.clone()),
                labels: Some(self.labels.clone()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(self.spec.replicas),
                selector: LabelSelector {
                    match_labels: Some(self.labels.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(self.labels.clone()),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: IMAGE_HUB_NAME.to_string(),
                            image: Some(self.spec.image.clone()),
                            image_pull_policy: Some(
                                self.spec.image_pull_policy.clone(),
                            ),
                            env: Some(vec![EnvVar {
                                name: "REGISTRY_HTTP_HOST".to_string(),
                                value: Some(format!(
                                    "https://{}",
                                    ctx.cluster.spec.image_repository_domain()
                                )),
                                ..Default::default()
                            }]),
                            ports: Some(vec![ContainerPort {
                                name: Some("registry".to_string()),
                                container_port: REGISTRY_PORT,
                                ..Default::default()
                            }]),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn service(&self) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(IMAGE_HUB_NAME.to_string()),
                namespace: Some(self.spec.namespace.clone()),
                labels: Some(self.labels.clone()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    port: 443,
                    target_port: Some(IntOrString::Int(REGISTRY_PORT)),
                    ..Default::default()
                }]),
                selector: Some(self.labels.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ComponentHandler for ImageHub {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn spec(&self) -> &ComponentSpec {
        &self.spec
    }

    /// The registry image comes from a public mirror, not the platform
    /// package; only storage has to be ready first.
    fn ready_to_provision(&self, checklist: &ChecklistSnapshot) -> bool {
        checklist.storage_ready
    }

    fn expected_ready(&self, ctx: &PassContext) -> i32 {
        if self.external(ctx) {
            0
        } else {
            self.spec.replicas
        }
    }

    async fn before(
        &self,
        _ctx: &PassContext,
    ) -> Result<AdoptionDecision, HandlerError> {
        Ok(AdoptionDecision::owned(self.labels.clone()))
    }

    fn resources(
        &self,
        ctx: &PassContext,
        decision: &AdoptionDecision,
    ) -> Result<Vec<DesiredObject>, HandlerError> {
        if !decision.owned || self.external(ctx) {
            return Ok(vec![]);
        }
        if self.spec.image.is_empty() {
            return Err(HandlerError::Configuration(format!(
                "component {} has no image configured",
                self.spec.name
            )));
        }
        Ok(vec![
            DesiredObject::Workload(self.deployment(ctx)),
            DesiredObject::Endpoint(self.service()),
        ])
    }

    async fn after(
        &self,
        _ctx: &PassContext,
        _decision: &AdoptionDecision,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn discover(
        &self,
        ctx: &PassContext,
        decision: &AdoptionDecision,
    ) -> Result<Vec<Pod>, HandlerError> {
        if self.external(ctx) {
            return Ok(vec![]);
        }
        Ok(ctx
            .store
            .list_pods(&self.spec.namespace, &decision.effective_selector)
            .await?)
    }
}
