//! Handler for the cluster metrics aggregator.
//!
//! The metrics API is served through an aggregated-API registration, a
//! cluster-scoped singleton at a well-known name. Another metrics provider
//! may already hold that registration, so `before` runs the adoption
//! tie-break and the rest of the lifecycle defers to a foreign owner.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, Pod, PodSpec,
    PodTemplateSpec, SecurityContext, Service, ServicePort, ServiceSpec,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, ObjectMeta,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::{
    APIService, APIServiceSpec, ServiceReference,
};
use tracing::info;

use super::{
    AdoptionDecision, ComponentHandler, ComponentSpec, DesiredObject,
    HandlerError, PassContext, ServiceRef, component_labels, labels_with,
    resolve_adoption,
};

pub const METRICS_SERVER_NAME: &str = "metrics-server";

/// Well-known name of the aggregated metrics API registration.
pub const METRICS_API_NAME: &str = "v1beta1.metrics.k8s.io";

const METRICS_API_GROUP: &str = "metrics.k8s.io";
const METRICS_API_VERSION: &str = "v1beta1";
const SECURE_PORT: i32 = 4443;

pub struct MetricsServer {
    spec: ComponentSpec,
    labels: BTreeMap<String, String>,
}

impl MetricsServer {
    pub fn new(spec: ComponentSpec) -> Self {
        let labels = component_labels(&spec.name);
        Self { spec, labels }
    }

    fn expected_ref(&self) -> ServiceRef {
        ServiceRef {
            namespace: self.spec.namespace.clone(),
            name: METRICS_SERVER_NAME.to_string(),
        }
    }

    fn deployment(&self) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(METRICS_SERVER_NAME.to_string()),
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
                        service_account_name: Some(super::CREATOR.to_string()),
                        termination_grace_period_seconds: Some(0),
                        node_selector: Some(BTreeMap::from([(
                            "kubernetes.io/os".to_string(),
                            "linux".to_string(),
                        )])),
                        containers: vec![Container {
                            name: METRICS_SERVER_NAME.to_string(),
                            image: Some(self.spec.image.clone()),
                            image_pull_policy: Some(
                                self.spec.image_pull_policy.clone(),
                            ),
                            args: Some(vec![
                                "--cert-dir=/tmp".to_string(),
                                format!("--secure-port={SECURE_PORT}"),
                                "--kubelet-insecure-tls".to_string(),
                                "--kubelet-preferred-address-types=InternalIP"
                                    .to_string(),
                            ]),
                            ports: Some(vec![ContainerPort {
                                name: Some("main-port".to_string()),
                                container_port: SECURE_PORT,
                                ..Default::default()
                            }]),
                            security_context: Some(SecurityContext {
                                read_only_root_filesystem: Some(true),
                                run_as_non_root: Some(true),
                                run_as_user: Some(1000),
                                ..Default::default()
                            }),
                            volume_mounts: Some(vec![VolumeMount {
                                name: "tmp-dir".to_string(),
                                mount_path: "/tmp".to_string(),
                                ..Default::default()
                            }]),
                            ..Default::default()
                        }],
                        volumes: Some(vec![Volume {
                            name: "tmp-dir".to_string(),
                            empty_dir: Some(EmptyDirVolumeSource::default()),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn service(&self) -> Service {
        // The endpoint carries extra well-known labels; the base map doubles
        // as the workload selector and must not absorb them.
        let endpoint_labels = labels_with(
            &self.labels,
            &[
                ("kubernetes.io/name", "Metrics-server"),
                ("kubernetes.io/cluster-service", "true"),
            ],
        );
        Service {
            metadata: ObjectMeta {
                name: Some(METRICS_SERVER_NAME.to_string()),
                namespace: Some(self.spec.namespace.clone()),
                labels: Some(endpoint_labels),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    port: 443,
                    target_port: Some(IntOrString::Int(SECURE_PORT)),
                    ..Default::default()
                }]),
                selector: Some(self.labels.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn registration(&self) -> APIService {
        APIService {
            metadata: ObjectMeta {
                name: Some(METRICS_API_NAME.to_string()),
                ..Default::default()
            },
            spec: Some(APIServiceSpec {
                service: Some(ServiceReference {
                    namespace: Some(self.spec.namespace.clone()),
                    name: Some(METRICS_SERVER_NAME.to_string()),
                    ..Default::default()
                }),
                group: Some(METRICS_API_GROUP.to_string()),
                version: Some(METRICS_API_VERSION.to_string()),
                insecure_skip_tls_verify: Some(true),
                group_priority_minimum: 100,
                version_priority: 30,
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ComponentHandler for MetricsServer {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn spec(&self) -> &ComponentSpec {
        &self.spec
    }

    async fn before(
        &self,
        ctx: &PassContext,
    ) -> Result<AdoptionDecision, HandlerError> {
        let existing = ctx.store.get_registration(METRICS_API_NAME).await?;
        Ok(resolve_adoption(
            existing.as_ref().map(|(reg, _)| reg),
            &self.expected_ref(),
            &self.labels,
        ))
    }

    fn resources(
        &self,
        _ctx: &PassContext,
        decision: &AdoptionDecision,
    ) -> Result<Vec<DesiredObject>, HandlerError> {
        if !decision.owned {
            return Ok(vec![]);
        }
        if self.spec.image.is_empty() {
            return Err(HandlerError::Configuration(format!(
                "component {} has no image configured",
                self.spec.name
            )));
        }
        Ok(vec![
            DesiredObject::Workload(self.deployment()),
            DesiredObject::Endpoint(self.service()),
        ])
    }

    async fn after(
        &self,
        ctx: &PassContext,
        decision: &AdoptionDecision,
    ) -> Result<(), HandlerError> {
        if !decision.owned {
            return Ok(());
        }
        let desired = self.registration();
        match ctx.store.get_registration(METRICS_API_NAME).await? {
            None => {
                ctx.store.create_registration(desired).await?;
            }
            Some((_, token)) => {
                info!(name = METRICS_API_NAME, "updating existing registration");
                ctx.store.update_registration(desired, token).await?;
            }
        }
        Ok(())
    }

    async fn discover(
        &self,
        ctx: &PassContext,
        decision: &AdoptionDecision,
    ) -> Result<Vec<Pod>, HandlerError> {
        if decision.owned {
            return Ok(ctx
                .store
                .list_pods(&self.spec.namespace, &decision.effective_selector)
                .await?);
        }
        // Foreign owner: resolve pods through the singleton's back-reference
        // and the selector of the Service it points at.
        let Some(foreign) = decision.foreign_ref.as_ref() else {
            return Ok(vec![]);
        };
        let svc = ctx
            .store
            .get_service(&foreign.namespace, &foreign.name)
            .await?
            .ok_or_else(|| {
                HandlerError::Transient(format!(
                    "backing service {}/{} not found",
                    foreign.namespace, foreign.name
                ))
            })?;
        let selector = svc
            .spec
            .and_then(|spec| spec.selector)
            .unwrap_or_default();
        Ok(ctx.store.list_pods(&foreign.namespace, &selector).await?)
    }
}
