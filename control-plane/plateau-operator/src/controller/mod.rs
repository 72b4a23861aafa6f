pub mod conditions;
pub mod reconcile;
pub mod retry;
pub mod status_aggregator;


use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::StreamExt;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::{Controller, watcher::Config};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::{error, info, instrument, trace};

use crate::config::OperatorConfig;
use crate::crd::{ClusterPhase, PlatformCluster, PlatformClusterStatus};
use crate::handlers::{self, PassContext};
use crate::probes;
use crate::store::{KubeStore, ObjectStore};

use self::retry::RetryConfig;
use self::status_aggregator::aggregate;

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error("status write failed: {0}")]
    StatusWrite(String),
}

#[derive(Clone)]
pub struct ControllerContext {
    pub client: Client,
    pub store: Arc<dyn ObjectStore>,
    pub cfg: OperatorConfig,
}

pub async fn run_controller(
    client: Client,
    cfg: OperatorConfig,
) -> anyhow::Result<()> {
    let api: Api<PlatformCluster> = Api::all(client.clone());
    let ctx = Arc::new(ControllerContext {
        store: Arc::new(KubeStore::new(client.clone())),
        client,
        cfg,
    });

    Controller::new(api, Config::default())
        .run(reconcile_cluster, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((_obj_ref, action)) => {
                    info!("reconciled: requeue={:?}", action)
                }
                Err(e) => error!(error = ?e, "reconcile error"),
            }
        })
        .await;

    Ok(())
}

#[instrument(skip_all, fields(
    ns = %obj.namespace().unwrap_or_else(|| "default".into()),
    name = %obj.name_any()
))]
async fn reconcile_cluster(
    obj: Arc<PlatformCluster>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    let ns = obj.namespace().unwrap_or_else(|| "default".to_string());
    let name = obj.name_any();

    let deadline =
        Instant::now() + Duration::from_secs(ctx.cfg.pass_timeout_secs);
    let pass = Arc::new(PassContext::new(
        ctx.store.clone(),
        obj.clone(),
        Some(deadline),
    ));
    let declared = handlers::declared_components(&obj, &ctx.cfg);
    let probe_set = probes::checklist_probes();
    let retry = RetryConfig::with_max_attempts(ctx.cfg.conflict_retries);

    let outcomes =
        reconcile::run_pass(pass, &declared, &probe_set, &retry).await;
    let transient = outcomes.has_transient_failures();

    // Single status commit per pass, and only when it changes materially.
    let status = aggregate(obj.status.as_ref(), &outcomes, Utc::now());
    let running = status.phase == Some(ClusterPhase::Running);
    if should_patch_status(obj.status.as_ref(), &status) {
        let api: Api<PlatformCluster> =
            Api::namespaced(ctx.client.clone(), &ns);
        let patch = json!({ "status": status });
        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ReconcileErr::StatusWrite(e.to_string()))?;
    } else {
        trace!("status unchanged; skipping patch");
    }

    let requeue = if transient {
        ctx.cfg.transient_requeue_secs
    } else if running {
        ctx.cfg.resync_secs
    } else {
        ctx.cfg.requeue_secs
    };
    Ok(Action::requeue(Duration::from_secs(requeue)))
}

/// Compare statuses ignoring probe/transition timestamps, which advance on
/// every pass and would otherwise cause endless write churn.
fn should_patch_status(
    current: Option<&PlatformClusterStatus>,
    desired: &PlatformClusterStatus,
) -> bool {
    match current {
        None => true,
        Some(cur) => normalize_status(cur) != normalize_status(desired),
    }
}

fn normalize_status(status: &PlatformClusterStatus) -> serde_json::Value {
    let mut value = serde_json::to_value(status).unwrap_or_else(|_| json!({}));
    if let serde_json::Value::Object(ref mut map) = value {
        if let Some(serde_json::Value::Array(conds)) = map.get_mut("conditions")
        {
            for cond in conds.iter_mut() {
                if let Some(obj) = cond.as_object_mut() {
                    obj.remove("lastProbeTime");
                    obj.remove("lastTransitionTime");
                }
            }
        }
    }
    value
}

fn error_policy(
    _obj: Arc<PlatformCluster>,
    error: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    let delay = match error {
        ReconcileErr::StatusWrite(_) => ctx.cfg.transient_requeue_secs,
    };
    Action::requeue(Duration::from_secs(delay))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ClusterCondition, ClusterConditionType, ConditionStatus};

    fn status_with_probe_time(probe_time: &str) -> PlatformClusterStatus {
        PlatformClusterStatus {
            phase: Some(ClusterPhase::Installing),
            conditions: Some(vec![ClusterCondition {
                type_: ClusterConditionType::StorageReady,
                status: ConditionStatus::True,
                last_probe_time: Some(probe_time.to_string()),
                last_transition_time: Some("t0".to_string()),
                reason: None,
                message: None,
            }]),
            ..Default::default()
        }
    }

    #[test]
    fn timestamp_only_churn_skips_the_patch() {
        let current = status_with_probe_time("t1");
        let desired = status_with_probe_time("t2");
        assert!(!should_patch_status(Some(&current), &desired));
    }

    #[test]
    fn material_changes_trigger_the_patch() {
        let current = status_with_probe_time("t1");
        let mut desired = status_with_probe_time("t2");
        desired.phase = Some(ClusterPhase::Running);
        assert!(should_patch_status(Some(&current), &desired));
    }
}
