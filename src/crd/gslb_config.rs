//! # GSLBConfig
//!
//! The single authoritative configuration: which cluster leads and which
//! member clusters are watched.

use serde::{Deserialize, Serialize};

/// GSLBConfig Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: amko.vmware.com/v1alpha1
/// kind: GSLBConfig
/// metadata:
///   name: gc-1
///   namespace: avi-system
/// spec:
///   gslbLeader:
///     credentials: gslb-avi-secret
///     controllerVersion: 20.1.4
///     controllerIP: 10.10.10.10
///   memberClusters:
///     - clusterContext: cluster1-admin
///     - clusterContext: cluster2-admin
///   refreshInterval: 1800
///   logLevel: INFO
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "GSLBConfig",
    root = "GslbConfig",
    group = "amko.vmware.com",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::GslbConfigStatus",
    shortname = "gc",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GslbConfigSpec {
    pub gslb_leader: GslbLeader,
    /// Cluster contexts (from the member kubeconfig) to watch
    pub member_clusters: Vec<MemberCluster>,
    /// Full refresh interval of load-balancer controller state (seconds)
    #[serde(default)]
    pub refresh_interval: Option<i64>,
    /// ERROR, WARN, INFO, DEBUG, TRACE
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GslbLeader {
    /// Secret holding the load-balancer controller credentials
    #[serde(default)]
    pub credentials: String,
    #[serde(default)]
    pub controller_version: String,
    #[serde(rename = "controllerIP", default)]
    pub controller_ip: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberCluster {
    pub cluster_context: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GslbConfigStatus {
    /// Human-readable controller state, e.g. persistent push failures
    #[serde(default)]
    pub state: Option<String>,
}

pub fn default_log_level() -> String {
    "INFO".to_string()
}

impl GslbConfigSpec {
    /// Member cluster contexts in declaration order
    #[must_use]
    pub fn cluster_contexts(&self) -> Vec<String> {
        self.member_clusters
            .iter()
            .map(|m| m.cluster_context.clone())
            .collect()
    }
}
