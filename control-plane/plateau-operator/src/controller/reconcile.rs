//! The per-pass reconciliation driver.
//!
//! One pass probes installation progress, drives every declared component
//! handler through `before` → `resources` → apply → `after` → `discover`,
//! and joins all outcomes before the aggregator computes the single status
//! commit. Handlers for distinct components run concurrently; ordering
//! within one handler is strict.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{instrument, warn};

use crate::handlers::{
    ChecklistSnapshot, ComponentHandler, DesiredObject, PassContext, pod_ready,
};
use crate::probes::{self, InstallProbe};

use super::retry::{RetryConfig, retry_on_conflict};
use super::status_aggregator::{ComponentOutcome, PassOutcomes};

/// Run one reconcile pass for a cluster.
#[instrument(skip_all, fields(
    cluster = %ctx.cluster.metadata.name.as_deref().unwrap_or("unknown")
))]
pub async fn run_pass(
    ctx: Arc<PassContext>,
    handlers: &[Arc<dyn ComponentHandler>],
    probes: &[Box<dyn InstallProbe>],
    retry: &RetryConfig,
) -> PassOutcomes {
    // Observe installation progress first; handlers gate provisioning on it.
    let mut observations = Vec::with_capacity(probes.len());
    for probe in probes {
        observations.push(probe.observe(&ctx).await);
    }
    let snapshot = probes::snapshot_from(&observations);

    let tasks = handlers.iter().map(|handler| {
        let ctx = ctx.clone();
        let handler = handler.clone();
        let retry = retry.clone();
        tokio::spawn(async move {
            run_handler(&ctx, handler.as_ref(), snapshot, &retry).await
        })
    });
    let mut components = Vec::with_capacity(handlers.len());
    for joined in join_all(tasks).await {
        match joined {
            Ok(outcome) => components.push(outcome),
            Err(err) => warn!(%err, "handler task aborted"),
        }
    }

    let storage_classes = probes::discover_storage_classes(&ctx).await;
    let node_avail_ports = probes::discover_node_avail_ports(&ctx).await;

    PassOutcomes {
        components,
        observations,
        storage_classes,
        node_avail_ports,
    }
}

async fn run_handler(
    ctx: &PassContext,
    handler: &dyn ComponentHandler,
    checklist: ChecklistSnapshot,
    retry: &RetryConfig,
) -> ComponentOutcome {
    let name = handler.name().to_string();

    if !handler.ready_to_provision(&checklist) {
        return ComponentOutcome::waiting(name);
    }

    // The adoption decision must exist before anything mutates.
    let decision = match handler.before(ctx).await {
        Ok(decision) => decision,
        Err(err) => return ComponentOutcome::failed(name, &err),
    };
    if ctx.expired() {
        return ComponentOutcome::canceled(name);
    }

    let desired = match handler.resources(ctx, &decision) {
        Ok(desired) => desired,
        Err(err) => return ComponentOutcome::failed(name, &err),
    };
    let provisioning = !desired.is_empty();
    let namespace = handler.spec().namespace.clone();
    for object in desired {
        let applied = match object {
            DesiredObject::Workload(dep) => {
                ctx.store.apply_deployment(&namespace, dep).await
            }
            DesiredObject::Endpoint(svc) => {
                ctx.store.apply_service(&namespace, svc).await
            }
        };
        if let Err(err) = applied {
            return ComponentOutcome::failed(name, &err.into());
        }
    }
    if ctx.expired() {
        return ComponentOutcome::canceled(name);
    }

    // Singleton upsert; conflicts re-run the whole fetch-and-apply so the
    // retry picks up the newest revision token.
    let operation = format!("{name}.after");
    if let Err(err) =
        retry_on_conflict(retry, &operation, || handler.after(ctx, &decision))
            .await
    {
        return ComponentOutcome::failed(name, &err);
    }

    let pods = match handler.discover(ctx, &decision).await {
        Ok(pods) => pods,
        Err(err) => return ComponentOutcome::failed(name, &err),
    };
    let ready = pods.iter().filter(|p| pod_ready(p)).count() as i32;
    let expected = handler.expected_ready(ctx);

    ComponentOutcome {
        component: name,
        provisioning,
        ready,
        expected,
        healthy: ready >= expected,
        error: None,
        transient: false,
    }
}
