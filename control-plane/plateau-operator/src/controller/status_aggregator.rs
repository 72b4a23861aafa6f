//! Folds handler outcomes and probe observations into one cluster status.
//!
//! Handlers never touch the status themselves; they return
//! [`ComponentOutcome`] records and this module computes the single status
//! commit a pass publishes.

use chrono::{DateTime, Utc};

use crate::crd::{
    ClusterConditionType, ClusterPhase, NodeAvailPorts, PlatformClusterStatus,
    StorageClassInfo,
};
use crate::handlers::HandlerError;
use crate::probes::Observation;

use super::conditions::{apply_observation, condition_holds};

/// What one component handler contributed to a pass.
#[derive(Clone, Debug)]
pub struct ComponentOutcome {
    pub component: String,
    /// The handler applied (or reapplied) objects this pass.
    pub provisioning: bool,
    pub ready: i32,
    pub expected: i32,
    pub healthy: bool,
    pub error: Option<String>,
    /// The error is retryable and the pass should requeue sooner.
    pub transient: bool,
}

impl ComponentOutcome {
    /// The component cannot start yet; installation prerequisites are
    /// still unmet.
    pub fn waiting(component: String) -> Self {
        Self {
            component,
            provisioning: false,
            ready: 0,
            expected: 0,
            healthy: false,
            error: None,
            transient: false,
        }
    }

    pub fn canceled(component: String) -> Self {
        Self {
            transient: true,
            error: Some("pass deadline exceeded".to_string()),
            ..Self::waiting(component)
        }
    }

    pub fn failed(component: String, err: &HandlerError) -> Self {
        Self {
            transient: err.is_retryable(),
            error: Some(err.to_string()),
            ..Self::waiting(component)
        }
    }
}

/// Everything a pass produced, joined before any status write. Discovery
/// extras are `None` when their probe failed, so previously published
/// values survive.
#[derive(Default)]
pub struct PassOutcomes {
    pub components: Vec<ComponentOutcome>,
    pub observations: Vec<Observation>,
    pub storage_classes: Option<Vec<StorageClassInfo>>,
    pub node_avail_ports: Option<Vec<NodeAvailPorts>>,
}

impl PassOutcomes {
    pub fn has_transient_failures(&self) -> bool {
        self.components.iter().any(|c| c.transient)
    }
}

/// Compute the status a pass publishes, starting from the previously
/// persisted one.
///
/// Phase rules: `Running` iff every checklist condition is `True` and every
/// component reports at least its expected healthy count; otherwise
/// `Installing` once any component has begun provisioning (a cluster never
/// falls back to `Pending`); `Pending` before that.
pub fn aggregate(
    previous: Option<&PlatformClusterStatus>,
    outcomes: &PassOutcomes,
    now: DateTime<Utc>,
) -> PlatformClusterStatus {
    let now = now.to_rfc3339();
    let mut status = previous.cloned().unwrap_or_default();

    let mut conditions = status.conditions.take().unwrap_or_default();
    for obs in &outcomes.observations {
        apply_observation(&mut conditions, obs, &now);
    }

    let unmet_conditions = ClusterConditionType::CHECKLIST
        .iter()
        .filter(|t| !condition_holds(&conditions, **t))
        .count();
    let unhealthy = outcomes
        .components
        .iter()
        .filter(|c| !c.healthy)
        .count();
    let started = outcomes.components.iter().any(|c| c.provisioning)
        || previous.is_some_and(|p| p.phase() != ClusterPhase::Pending);

    let phase = if unmet_conditions == 0 && unhealthy == 0 {
        ClusterPhase::Running
    } else if started {
        ClusterPhase::Installing
    } else {
        ClusterPhase::Pending
    };

    let failure = outcomes.components.iter().find(|c| c.error.is_some());
    let (reason, message) = match failure {
        Some(c) => (
            "ComponentFailure".to_string(),
            format!(
                "component {}: {}",
                c.component,
                c.error.as_deref().unwrap_or_default()
            ),
        ),
        None => match phase {
            ClusterPhase::Running => (
                "InstallationComplete".to_string(),
                "all components are running".to_string(),
            ),
            ClusterPhase::Installing => (
                "Installing".to_string(),
                format!(
                    "waiting on {unmet_conditions} checklist condition(s), {unhealthy} component(s) not ready"
                ),
            ),
            ClusterPhase::Pending => (
                "Waiting".to_string(),
                "waiting for installation prerequisites".to_string(),
            ),
        },
    };

    status.phase = Some(phase);
    status.conditions = Some(conditions);
    status.reason = Some(reason);
    status.message = Some(message);
    if let Some(classes) = &outcomes.storage_classes {
        status.storage_classes = Some(classes.clone());
    }
    if let Some(ports) = &outcomes.node_avail_ports {
        status.node_avail_ports = Some(ports.clone());
    }
    status
}
