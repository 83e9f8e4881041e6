//! # Admission Policy
//!
//! Decides whether an ingested object belongs in the Accepted or Rejected
//! store. The stores know nothing about policy; the decision is made here,
//! before the store is touched.
//!
//! Host rules live here as well since they are the other piece of operator
//! input that shapes a global service.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Debug;
use std::sync::{Arc, PoisonError, RwLock};

use crate::controller::key::ObjectRef;
use crate::controller::store::ObjectSnapshot;
use crate::crd::{GlobalDeploymentPolicySpec, GslbHostRuleSpec};

/// Everything the policy may look at for one object
#[derive(Debug, Clone, Copy)]
pub struct AdmissionCandidate<'a> {
    pub object: &'a ObjectRef,
    pub snapshot: &'a ObjectSnapshot,
    pub namespace_labels: &'a BTreeMap<String, String>,
}

pub trait PolicyEvaluator: Send + Sync + Debug {
    fn is_accepted(&self, candidate: &AdmissionCandidate<'_>) -> bool;

    /// Traffic-split weight for members in `cluster`
    fn weight_for(&self, _cluster: &str) -> Option<u32> {
        None
    }
}

/// Evaluator built from a GlobalDeploymentPolicy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GdpPolicy {
    match_clusters: BTreeSet<String>,
    app_labels: BTreeMap<String, String>,
    namespace_labels: BTreeMap<String, String>,
    weights: BTreeMap<String, u32>,
}

fn labels_match(selector: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

impl GdpPolicy {
    #[must_use]
    pub fn from_spec(spec: &GlobalDeploymentPolicySpec) -> Self {
        Self {
            match_clusters: spec.match_clusters.iter().cloned().collect(),
            app_labels: spec
                .match_rules
                .app_selector
                .as_ref()
                .map(|s| s.label.clone())
                .unwrap_or_default(),
            namespace_labels: spec
                .match_rules
                .namespace_selector
                .as_ref()
                .map(|s| s.label.clone())
                .unwrap_or_default(),
            weights: spec
                .traffic_split
                .iter()
                .map(|ts| (ts.cluster.clone(), ts.weight))
                .collect(),
        }
    }
}

impl PolicyEvaluator for GdpPolicy {
    fn is_accepted(&self, candidate: &AdmissionCandidate<'_>) -> bool {
        if !self.match_clusters.contains(candidate.object.cluster()) {
            return false;
        }
        if !labels_match(&self.app_labels, &candidate.snapshot.labels) {
            return false;
        }
        if !labels_match(&self.namespace_labels, candidate.namespace_labels) {
            return false;
        }
        candidate.snapshot.ip_addr.is_some()
    }

    fn weight_for(&self, cluster: &str) -> Option<u32> {
        self.weights.get(cluster).copied()
    }
}

/// The currently installed policy. With no policy every object is rejected.
#[derive(Debug, Default)]
pub struct PolicyStore {
    current: RwLock<Option<Arc<dyn PolicyEvaluator>>>,
}

impl PolicyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, policy: Option<Arc<dyn PolicyEvaluator>>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = policy;
    }

    #[must_use]
    pub fn current(&self) -> Option<Arc<dyn PolicyEvaluator>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn is_accepted(&self, candidate: &AdmissionCandidate<'_>) -> bool {
        self.current().is_some_and(|p| p.is_accepted(candidate))
    }

    #[must_use]
    pub fn weight_for(&self, cluster: &str) -> Option<u32> {
        self.current().and_then(|p| p.weight_for(cluster))
    }
}

/// Host rules indexed by FQDN
#[derive(Debug, Default)]
pub struct HostRuleTable {
    rules: RwLock<HashMap<String, GslbHostRuleSpec>>,
}

impl HostRuleTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the previous rule for the FQDN
    pub fn upsert(&self, rule: GslbHostRuleSpec) -> Option<GslbHostRuleSpec> {
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(rule.fqdn.clone(), rule)
    }

    pub fn remove(&self, fqdn: &str) -> Option<GslbHostRuleSpec> {
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(fqdn)
    }

    #[must_use]
    pub fn get(&self, fqdn: &str) -> Option<GslbHostRuleSpec> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fqdn)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{LabelSelector, MatchRules, TrafficSplit};

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn gdp() -> GdpPolicy {
        GdpPolicy::from_spec(&GlobalDeploymentPolicySpec {
            match_rules: MatchRules {
                app_selector: Some(LabelSelector {
                    label: labels(&[("app", "gslb")]),
                }),
                namespace_selector: Some(LabelSelector {
                    label: labels(&[("team", "web")]),
                }),
            },
            match_clusters: vec!["c1".to_string()],
            traffic_split: vec![TrafficSplit {
                cluster: "c1".to_string(),
                weight: 7,
            }],
        })
    }

    #[test]
    fn test_gdp_admission() {
        let policy = gdp();
        let obj = ObjectRef::ingress("c1", "ns", "ing", "foo.com");
        let snapshot = ObjectSnapshot {
            hostname: "foo.com".to_string(),
            ip_addr: Some("10.0.0.1".to_string()),
            labels: labels(&[("app", "gslb"), ("tier", "x")]),
            ..Default::default()
        };
        let ns_labels = labels(&[("team", "web")]);
        let candidate = AdmissionCandidate {
            object: &obj,
            snapshot: &snapshot,
            namespace_labels: &ns_labels,
        };
        assert!(policy.is_accepted(&candidate));

        let other_cluster = ObjectRef::ingress("c2", "ns", "ing", "foo.com");
        assert!(!policy.is_accepted(&AdmissionCandidate {
            object: &other_cluster,
            ..candidate
        }));

        let no_ip = ObjectSnapshot {
            ip_addr: None,
            ..snapshot.clone()
        };
        assert!(!policy.is_accepted(&AdmissionCandidate {
            snapshot: &no_ip,
            ..candidate
        }));

        let empty = BTreeMap::new();
        assert!(!policy.is_accepted(&AdmissionCandidate {
            namespace_labels: &empty,
            ..candidate
        }));

        assert_eq!(policy.weight_for("c1"), Some(7));
        assert_eq!(policy.weight_for("c2"), None);
    }

    #[test]
    fn test_policy_store_rejects_without_policy() {
        let store = PolicyStore::new();
        let obj = ObjectRef::service("c1", "ns", "svc");
        let snapshot = ObjectSnapshot {
            ip_addr: Some("10.0.0.1".to_string()),
            labels: labels(&[("app", "gslb")]),
            ..Default::default()
        };
        let ns_labels = labels(&[("team", "web")]);
        let candidate = AdmissionCandidate {
            object: &obj,
            snapshot: &snapshot,
            namespace_labels: &ns_labels,
        };
        assert!(!store.is_accepted(&candidate));
        store.replace(Some(Arc::new(gdp())));
        assert!(store.is_accepted(&candidate));
        store.replace(None);
        assert!(!store.is_accepted(&candidate));
    }

    #[test]
    fn test_host_rule_table() {
        let table = HostRuleTable::new();
        let rule = GslbHostRuleSpec {
            fqdn: "foo.com".to_string(),
            ttl: Some(10),
            ..Default::default()
        };
        assert!(table.upsert(rule.clone()).is_none());
        assert_eq!(table.get("foo.com"), Some(rule));
        assert!(table.remove("foo.com").is_some());
        assert!(table.get("foo.com").is_none());
    }
}
