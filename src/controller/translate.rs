//! # Translation
//!
//! Turns member-cluster objects into [`ObjectSnapshot`]s. The load-balancer
//! address is read from object status and only trusted when it parses as an
//! IP address.

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use crate::constants::AKO_ROUTER_PREFIX;
use crate::controller::store::ObjectSnapshot;

/// Only `LoadBalancer` services take part in global load balancing
pub const LOAD_BALANCER_SERVICE_TYPE: &str = "LoadBalancer";

fn is_ip(s: &str) -> bool {
    s.parse::<IpAddr>().is_ok()
}

fn labels_of(meta: &ObjectMeta) -> BTreeMap<String, String> {
    meta.labels.clone().unwrap_or_default()
}

/// A virtual host of an ingress together with its load-balancer IP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressHostIp {
    pub hostname: String,
    pub ip: String,
}

/// Hosts named by the ingress rules
#[must_use]
pub fn ingress_rule_hosts(ingress: &Ingress) -> BTreeSet<String> {
    ingress
        .spec
        .as_ref()
        .and_then(|s| s.rules.as_ref())
        .into_iter()
        .flatten()
        .filter_map(|r| r.host.clone())
        .filter(|h| !h.is_empty())
        .collect()
}

/// `(hostname, ip)` pairs from the ingress status, restricted to hosts the
/// rules actually declare
#[must_use]
pub fn ingress_host_ips(ingress: &Ingress) -> Vec<IngressHostIp> {
    let hosts = ingress_rule_hosts(ingress);
    ingress
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let ip = entry.ip.as_deref().filter(|ip| is_ip(ip))?;
            let hostname = entry.hostname.as_deref().filter(|h| !h.is_empty())?;
            hosts.contains(hostname).then(|| IngressHostIp {
                hostname: hostname.to_string(),
                ip: ip.to_string(),
            })
        })
        .collect()
}

/// One snapshot per rule host, keyed by hostname
#[must_use]
pub fn ingress_snapshots(ingress: &Ingress) -> BTreeMap<String, ObjectSnapshot> {
    let Some(spec) = ingress.spec.as_ref() else {
        return BTreeMap::new();
    };
    let tls_hosts: BTreeSet<String> = spec
        .tls
        .iter()
        .flatten()
        .flat_map(|t| t.hosts.iter().flatten().cloned())
        .collect();
    let ips = ingress_host_ips(ingress);
    let labels = labels_of(&ingress.metadata);

    let mut snapshots: BTreeMap<String, ObjectSnapshot> = BTreeMap::new();
    for rule in spec.rules.iter().flatten() {
        let Some(host) = rule.host.as_deref().filter(|h| !h.is_empty()) else {
            continue;
        };
        let entry = snapshots
            .entry(host.to_string())
            .or_insert_with(|| ObjectSnapshot {
                hostname: host.to_string(),
                ip_addr: ips
                    .iter()
                    .find(|p| p.hostname == host)
                    .map(|p| p.ip.clone()),
                labels: labels.clone(),
                tls: tls_hosts.contains(host),
                ..Default::default()
            });
        let paths = rule
            .http
            .iter()
            .flat_map(|h| h.paths.iter())
            .map(|p| p.path.clone().unwrap_or_else(|| "/".to_string()));
        for path in paths {
            if !entry.paths.contains(&path) {
                entry.paths.push(path);
            }
        }
    }

    snapshots
        .into_iter()
        .map(|(host, s)| (host, s.with_checksum()))
        .collect()
}

/// Snapshot of a `LoadBalancer` service; `None` for any other service type
#[must_use]
pub fn service_snapshot(service: &Service) -> Option<ObjectSnapshot> {
    let spec = service.spec.as_ref()?;
    if spec.type_.as_deref() != Some(LOAD_BALANCER_SERVICE_TYPE) {
        return None;
    }
    let lb_entry = service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|entries| {
            entries
                .iter()
                .find(|e| e.ip.as_deref().is_some_and(is_ip))
        });
    let hostname = lb_entry
        .and_then(|e| e.hostname.clone())
        .filter(|h| !h.is_empty())
        .or_else(|| service.metadata.name.clone())
        .unwrap_or_default();
    let port = spec.ports.as_ref().and_then(|p| p.first());

    Some(
        ObjectSnapshot {
            hostname,
            ip_addr: lb_entry.and_then(|e| e.ip.clone()),
            labels: labels_of(&service.metadata),
            protocol: Some(
                port.and_then(|p| p.protocol.clone())
                    .unwrap_or_else(|| "TCP".to_string()),
            ),
            port: port.map(|p| p.port),
            ..Default::default()
        }
        .with_checksum(),
    )
}

/// OpenShift route, reduced to the fields used here
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Route {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: RouteSpec,
    #[serde(default)]
    pub status: RouteStatus,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouteSpec {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub tls: Option<RouteTls>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouteTls {
    #[serde(default)]
    pub termination: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouteStatus {
    #[serde(default)]
    pub ingress: Vec<RouteIngress>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteIngress {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub router_name: String,
    #[serde(default)]
    pub conditions: Vec<RouteCondition>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouteCondition {
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// IP published by our router for the route's own host
#[must_use]
pub fn route_ip_addr(route: &Route) -> Option<String> {
    route
        .status
        .ingress
        .iter()
        .filter(|i| i.router_name.starts_with(AKO_ROUTER_PREFIX) && i.host == route.spec.host)
        .flat_map(|i| i.conditions.iter())
        .filter_map(|c| c.message.as_deref())
        .find(|m| is_ip(m))
        .map(str::to_string)
}

#[must_use]
pub fn route_snapshot(route: &Route) -> ObjectSnapshot {
    let termination = route.spec.tls.as_ref().map(|t| t.termination.clone());
    ObjectSnapshot {
        hostname: route.spec.host.clone(),
        ip_addr: route_ip_addr(route),
        labels: labels_of(&route.metadata),
        paths: route.spec.path.iter().filter(|p| !p.is_empty()).cloned().collect(),
        tls: termination.is_some(),
        termination,
        ..Default::default()
    }
    .with_checksum()
}
