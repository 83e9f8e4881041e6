//! # GSLBHostRule
//!
//! Per-FQDN overrides applied when a global service is synthesized.

use serde::{Deserialize, Serialize};

use crate::crd::TrafficSplit;

/// GSLBHostRule Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: amko.vmware.com/v1alpha1
/// kind: GSLBHostRule
/// metadata:
///   name: gs-foo
///   namespace: avi-system
/// spec:
///   fqdn: foo.avi.com
///   ttl: 30
///   sitePersistence:
///     enabled: true
///     profileRef: gap-1
///   healthMonitorRefs:
///     - my-hm
///   trafficSplit:
///     - cluster: cluster1-admin
///       weight: 15
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "GSLBHostRule",
    root = "GslbHostRule",
    group = "amko.vmware.com",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::GslbHostRuleStatus",
    shortname = "ghr",
    printcolumn = r#"{"name":"FQDN", "type":"string", "jsonPath":".spec.fqdn"}, {"name":"Status", "type":"string", "jsonPath":".status.status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GslbHostRuleSpec {
    /// Global service this rule applies to
    pub fqdn: String,
    /// DNS TTL override (seconds)
    #[serde(default)]
    pub ttl: Option<i64>,
    #[serde(default)]
    pub site_persistence: Option<SitePersistence>,
    /// Custom health monitors; when set they replace the generated ones
    #[serde(default)]
    pub health_monitor_refs: Vec<String>,
    #[serde(default)]
    pub traffic_split: Vec<TrafficSplit>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SitePersistence {
    pub enabled: bool,
    #[serde(default)]
    pub profile_ref: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GslbHostRuleStatus {
    #[serde(default)]
    pub error: Option<String>,
    /// Accepted or Rejected
    #[serde(default)]
    pub status: Option<String>,
}
