//! Condition bookkeeping for the cluster status.

use crate::crd::{ClusterCondition, ClusterConditionType, ConditionStatus};
use crate::probes::Observation;

/// Fold one observation into the condition list. Conditions stay unique by
/// type; `lastProbeTime` advances on every observation while
/// `lastTransitionTime` moves only when the status value actually changes.
pub fn apply_observation(
    conditions: &mut Vec<ClusterCondition>,
    obs: &Observation,
    now: &str,
) {
    match conditions.iter_mut().find(|c| c.type_ == obs.type_) {
        Some(existing) => {
            existing.last_probe_time = Some(now.to_string());
            if existing.status != obs.status {
                existing.status = obs.status;
                existing.reason = obs.reason.clone();
                existing.message = obs.message.clone();
                existing.last_transition_time = Some(now.to_string());
            }
        }
        None => conditions.push(ClusterCondition {
            type_: obs.type_,
            status: obs.status,
            last_probe_time: Some(now.to_string()),
            last_transition_time: Some(now.to_string()),
            reason: obs.reason.clone(),
            message: obs.message.clone(),
        }),
    }
}

pub fn condition_holds(
    conditions: &[ClusterCondition],
    type_: ClusterConditionType,
) -> bool {
    conditions
        .iter()
        .any(|c| c.type_ == type_ && c.status == ConditionStatus::True)
}
