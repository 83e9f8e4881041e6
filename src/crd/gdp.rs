//! # GlobalDeploymentPolicy
//!
//! Selects which applications, namespaces and clusters take part in global
//! load balancing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// GlobalDeploymentPolicy Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: amko.vmware.com/v1alpha1
/// kind: GlobalDeploymentPolicy
/// metadata:
///   name: global-gdp
///   namespace: avi-system
/// spec:
///   matchRules:
///     appSelector:
///       label:
///         app: gslb
///   matchClusters:
///     - cluster1-admin
///     - cluster2-admin
///   trafficSplit:
///     - cluster: cluster1-admin
///       weight: 8
///     - cluster: cluster2-admin
///       weight: 2
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "GlobalDeploymentPolicy",
    group = "amko.vmware.com",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::GlobalDeploymentPolicyStatus",
    shortname = "gdp"
)]
#[serde(rename_all = "camelCase")]
pub struct GlobalDeploymentPolicySpec {
    #[serde(default)]
    pub match_rules: MatchRules,
    #[serde(default)]
    pub match_clusters: Vec<String>,
    #[serde(default)]
    pub traffic_split: Vec<TrafficSplit>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchRules {
    #[serde(default)]
    pub app_selector: Option<LabelSelector>,
    #[serde(default)]
    pub namespace_selector: Option<LabelSelector>,
}

/// Every listed label must be present with the same value
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct LabelSelector {
    #[serde(default)]
    pub label: BTreeMap<String, String>,
}

/// Relative weight of one cluster, 1 to 20
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct TrafficSplit {
    pub cluster: String,
    pub weight: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GlobalDeploymentPolicyStatus {
    #[serde(default)]
    pub error_status: Option<String>,
}
