//! Ownership tie-break for singleton cluster resources.
//!
//! The platform may only manage a singleton it created itself. The resolver
//! compares the singleton's recorded backing reference against the
//! platform's expected identity; any ambiguity resolves toward *not*
//! touching the resource.

use std::collections::BTreeMap;

use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::APIService;

/// Back-reference to the concrete Service backing a singleton registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceRef {
    pub namespace: String,
    pub name: String,
}

/// Outcome of the ownership tie-break, computed once per pass in `before`
/// and immutable thereafter.
#[derive(Clone, Debug)]
pub struct AdoptionDecision {
    /// Whether the platform manages the component's objects.
    pub owned: bool,
    /// Pod selector to discover the component's workload with. The
    /// component's own labels when owned, the foreign Service's selector
    /// indirection otherwise (resolved lazily in `discover`).
    pub effective_selector: BTreeMap<String, String>,
    /// Backing reference of the foreign singleton, when not owned.
    pub foreign_ref: Option<ServiceRef>,
}

impl AdoptionDecision {
    pub fn owned(selector: BTreeMap<String, String>) -> Self {
        Self {
            owned: true,
            effective_selector: selector,
            foreign_ref: None,
        }
    }

    pub fn foreign(
        selector: BTreeMap<String, String>,
        foreign_ref: Option<ServiceRef>,
    ) -> Self {
        Self {
            owned: false,
            effective_selector: selector,
            foreign_ref,
        }
    }
}

/// Decision rule:
/// 1. No pre-existing singleton: owned. The platform may freely create it.
/// 2. Singleton exists and its backing reference matches `expected`: owned;
///    the platform created it previously and may update it in place.
/// 3. Backing reference differs or is absent: foreign. No objects are
///    rendered and the singleton is left alone; discovery is redirected
///    through the recorded reference when one exists.
pub fn resolve_adoption(
    existing: Option<&APIService>,
    expected: &ServiceRef,
    own_labels: &BTreeMap<String, String>,
) -> AdoptionDecision {
    let Some(registration) = existing else {
        return AdoptionDecision::owned(own_labels.clone());
    };

    let backing = registration
        .spec
        .as_ref()
        .and_then(|spec| spec.service.as_ref());
    match backing {
        Some(svc)
            if svc.namespace.as_deref() == Some(expected.namespace.as_str())
                && svc.name.as_deref() == Some(expected.name.as_str()) =>
        {
            AdoptionDecision::owned(own_labels.clone())
        }
        Some(svc) => AdoptionDecision::foreign(
            own_labels.clone(),
            Some(ServiceRef {
                namespace: svc.namespace.clone().unwrap_or_default(),
                name: svc.name.clone().unwrap_or_default(),
            }),
        ),
        // A registration without a backing reference cannot be proven ours.
        None => AdoptionDecision::foreign(own_labels.clone(), None),
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::{
        APIServiceSpec, ServiceReference,
    };

    use super::*;
    use crate::handlers::component_labels;

    fn registration(namespace: Option<&str>, name: Option<&str>) -> APIService {
        APIService {
            metadata: ObjectMeta {
                name: Some("v1beta1.metrics.k8s.io".into()),
                ..Default::default()
            },
            spec: Some(APIServiceSpec {
                service: Some(ServiceReference {
                    namespace: namespace.map(String::from),
                    name: name.map(String::from),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn expected() -> ServiceRef {
        ServiceRef {
            namespace: "platform".into(),
            name: "metrics-server".into(),
        }
    }

    #[test]
    fn absent_singleton_defaults_to_owned() {
        let decision =
            resolve_adoption(None, &expected(), &component_labels("metrics-server"));
        assert!(decision.owned);
        assert!(decision.foreign_ref.is_none());
    }

    #[test]
    fn matching_back_reference_is_owned() {
        let reg = registration(Some("platform"), Some("metrics-server"));
        let decision =
            resolve_adoption(Some(&reg), &expected(), &component_labels("metrics-server"));
        assert!(decision.owned);
    }

    #[test]
    fn mismatched_back_reference_defers_and_records_it() {
        let reg = registration(Some("other"), Some("other-svc"));
        let decision =
            resolve_adoption(Some(&reg), &expected(), &component_labels("metrics-server"));
        assert!(!decision.owned);
        assert_eq!(
            decision.foreign_ref,
            Some(ServiceRef {
                namespace: "other".into(),
                name: "other-svc".into(),
            })
        );
    }

    #[test]
    fn missing_back_reference_defers_without_redirect() {
        let reg = APIService {
            metadata: ObjectMeta {
                name: Some("v1beta1.metrics.k8s.io".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let decision =
            resolve_adoption(Some(&reg), &expected(), &component_labels("metrics-server"));
        assert!(!decision.owned);
        assert!(decision.foreign_ref.is_none());
    }
}
