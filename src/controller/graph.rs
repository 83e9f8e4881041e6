//! # Global Service Graph
//!
//! Synthesizes one global service per hostname from the Accepted stores of
//! every member cluster. A key transiently missing from the stores simply
//! does not contribute a member.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::controller::checksum::{fnv1a_32, health_monitor_checksum, service_checksum};
use crate::controller::health_monitor::{
    build_non_path_hm_name, build_path_hm_name, hm_type_for_protocol, hm_type_for_tls,
    DEFAULT_HTTPS_HEALTH_MONITOR_PORT, DEFAULT_HTTP_HEALTH_MONITOR_PORT,
    DEFAULT_TCP_HEALTH_MONITOR_PORT, HEALTH_MONITOR_TYPE_TCP, PASSTHROUGH_HEALTH_MONITOR,
};
use crate::controller::key::ObjectType;
use crate::controller::policy::{HostRuleTable, PolicyStore};
use crate::controller::store::{ObjectSnapshot, ObjectStores, StoreKind};
use crate::constants::{MIN_TRAFFIC_WEIGHT, PASSTHROUGH_ROUTE};
use crate::crd::SitePersistence;

/// One accepted object contributing to a global service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GsMember {
    pub cluster: String,
    pub object_type: ObjectType,
    /// `namespace/name` or `namespace/name/hostname`
    pub key: String,
    pub ip_addr: String,
    pub weight: u32,
    #[serde(skip)]
    snapshot: ObjectSnapshot,
}

impl GsMember {
    /// `Type/cluster/namespace/name[/hostname]`
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}/{}/{}", self.object_type, self.cluster, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMonitor {
    pub name: String,
    pub hm_type: String,
    pub port: i32,
    pub checksum: u32,
}

impl HealthMonitor {
    fn new(name: String, hm_type: &str, port: i32) -> Self {
        let checksum = health_monitor_checksum(&name, hm_type, port);
        Self {
            name,
            hm_type: hm_type.to_string(),
            port,
            checksum,
        }
    }
}

/// Synthesized global service, ready to hand to the pusher
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalService {
    pub name: String,
    pub domains: Vec<String>,
    pub members: Vec<GsMember>,
    /// Generated monitors; empty when a host rule supplies custom ones
    pub health_monitors: Vec<HealthMonitor>,
    pub health_monitor_refs: Vec<String>,
    pub ttl: Option<i64>,
    pub site_persistence: Option<SitePersistence>,
    pub checksum: u32,
}

impl GlobalService {
    /// Names of all monitors attached to this service
    #[must_use]
    pub fn health_monitor_names(&self) -> Vec<String> {
        if self.health_monitor_refs.is_empty() {
            self.health_monitors.iter().map(|h| h.name.clone()).collect()
        } else {
            self.health_monitor_refs.clone()
        }
    }

    #[must_use]
    pub fn member_ips(&self) -> Vec<String> {
        self.members.iter().map(|m| m.ip_addr.clone()).collect()
    }

    fn compute_checksum(&self) -> u32 {
        // Weights are part of each member's descriptor so split changes re-push
        let members: Vec<String> = self
            .members
            .iter()
            .map(|m| format!("{}:{}", m.identity(), m.weight))
            .collect();
        let properties = format!(
            "ttl={:?};persistence={:?}",
            self.ttl,
            self.site_persistence
                .as_ref()
                .map(|p| p.profile_ref.clone().unwrap_or_default())
        );
        // Monitor definitions, not just names, so a type or port change re-pushes
        let monitors = self
            .health_monitors
            .iter()
            .fold(0u32, |sum, hm| sum.wrapping_add(hm.checksum));
        service_checksum(
            &self.member_ips(),
            &self.domains,
            &members,
            &self.health_monitor_names(),
        )
        .wrapping_add(fnv1a_32(properties.as_bytes()))
        .wrapping_add(monitors)
    }
}

fn member_monitors(gs_name: &str, member: &GsMember) -> Vec<HealthMonitor> {
    let snapshot = &member.snapshot;
    match member.object_type {
        ObjectType::Route if snapshot.termination.as_deref() == Some(PASSTHROUGH_ROUTE) => {
            vec![HealthMonitor::new(
                PASSTHROUGH_HEALTH_MONITOR.to_string(),
                HEALTH_MONITOR_TYPE_TCP,
                DEFAULT_HTTPS_HEALTH_MONITOR_PORT,
            )]
        }
        ObjectType::Route | ObjectType::Ingress => {
            let hm_type = hm_type_for_tls(snapshot.tls);
            let port = if snapshot.tls {
                DEFAULT_HTTPS_HEALTH_MONITOR_PORT
            } else {
                DEFAULT_HTTP_HEALTH_MONITOR_PORT
            };
            if snapshot.paths.is_empty() {
                vec![HealthMonitor::new(build_non_path_hm_name(gs_name), hm_type, port)]
            } else {
                snapshot
                    .paths
                    .iter()
                    .map(|path| {
                        HealthMonitor::new(
                            build_path_hm_name(gs_name, path, snapshot.tls),
                            hm_type,
                            port,
                        )
                    })
                    .collect()
            }
        }
        ObjectType::Service => {
            let protocol = snapshot.protocol.as_deref().unwrap_or("TCP");
            match hm_type_for_protocol(protocol) {
                Ok(hm_type) => vec![HealthMonitor::new(
                    build_non_path_hm_name(gs_name),
                    hm_type,
                    snapshot.port.unwrap_or(DEFAULT_TCP_HEALTH_MONITOR_PORT),
                )],
                Err(e) => {
                    warn!(gs = gs_name, member = %member.identity(), error = %e, "no health monitor for member");
                    Vec::new()
                }
            }
        }
    }
}

/// Build the global service for `name`, or `None` when it has no members
#[must_use]
pub fn build_global_service(
    name: &str,
    stores: &ObjectStores,
    policy: &PolicyStore,
    host_rules: &HostRuleTable,
) -> Option<GlobalService> {
    let rule = host_rules.get(name);
    let rule_weights: BTreeMap<&str, u32> = rule
        .iter()
        .flat_map(|r| r.traffic_split.iter())
        .map(|ts| (ts.cluster.as_str(), ts.weight))
        .collect();

    let mut members = Vec::new();
    for obj_type in ObjectType::ALL {
        for cluster in stores.clusters(obj_type) {
            let weight = rule_weights
                .get(cluster.as_str())
                .copied()
                .or_else(|| policy.weight_for(&cluster))
                .unwrap_or(MIN_TRAFFIC_WEIGHT);
            for (key, snapshot) in stores.list(StoreKind::Accepted, &cluster, obj_type) {
                if snapshot.hostname != name {
                    continue;
                }
                let Some(ip_addr) = snapshot.ip_addr.clone() else {
                    continue;
                };
                members.push(GsMember {
                    cluster: cluster.clone(),
                    object_type: obj_type,
                    key,
                    ip_addr,
                    weight,
                    snapshot,
                });
            }
        }
    }
    if members.is_empty() {
        return None;
    }
    members.sort_by_key(GsMember::identity);

    let mut monitors: BTreeMap<String, HealthMonitor> = BTreeMap::new();
    let health_monitor_refs = rule
        .as_ref()
        .map(|r| r.health_monitor_refs.clone())
        .unwrap_or_default();
    if health_monitor_refs.is_empty() {
        for member in &members {
            for hm in member_monitors(name, member) {
                monitors.entry(hm.name.clone()).or_insert(hm);
            }
        }
    }

    let mut gs = GlobalService {
        name: name.to_string(),
        domains: vec![name.to_string()],
        members,
        health_monitors: monitors.into_values().collect(),
        health_monitor_refs,
        ttl: rule.as_ref().and_then(|r| r.ttl),
        site_persistence: rule
            .and_then(|r| r.site_persistence)
            .filter(|p| p.enabled),
        checksum: 0,
    };
    gs.checksum = gs.compute_checksum();
    Some(gs)
}

/// Every hostname that currently has an accepted object
#[must_use]
pub fn known_service_names(stores: &ObjectStores) -> Vec<String> {
    let mut names: Vec<String> = stores
        .list_all(StoreKind::Accepted)
        .into_iter()
        .map(|(_, _, _, s)| s.hostname)
        .filter(|h| !h.is_empty())
        .collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::policy::GdpPolicy;
    use crate::crd::{GlobalDeploymentPolicySpec, GslbHostRuleSpec, TrafficSplit};
    use std::sync::Arc;

    fn snapshot(host: &str, ip: &str, paths: &[&str]) -> ObjectSnapshot {
        ObjectSnapshot {
            hostname: host.to_string(),
            ip_addr: Some(ip.to_string()),
            paths: paths.iter().map(|p| (*p).to_string()).collect(),
            ..Default::default()
        }
    }

    fn stores() -> ObjectStores {
        let stores = ObjectStores::new();
        stores.add(
            StoreKind::Accepted,
            "c1",
            ObjectType::Ingress,
            "ns/ing/foo.com",
            snapshot("foo.com", "10.0.0.1", &["/a"]),
        );
        stores.add(
            StoreKind::Accepted,
            "c2",
            ObjectType::Ingress,
            "ns/ing/foo.com",
            snapshot("foo.com", "10.0.0.2", &["/a", "/b"]),
        );
        stores.add(
            StoreKind::Rejected,
            "c3",
            ObjectType::Ingress,
            "ns/ing/foo.com",
            snapshot("foo.com", "10.0.0.3", &["/a"]),
        );
        stores.add(
            StoreKind::Accepted,
            "c1",
            ObjectType::Ingress,
            "ns/ing/bar.com",
            snapshot("bar.com", "10.0.0.4", &[]),
        );
        stores
    }

    #[test]
    fn test_build_collects_accepted_members() {
        let gs = build_global_service("foo.com", &stores(), &PolicyStore::new(), &HostRuleTable::new())
            .unwrap();
        assert_eq!(gs.domains, vec!["foo.com".to_string()]);
        assert_eq!(gs.member_ips(), vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
        assert_eq!(
            gs.health_monitor_names(),
            vec![
                "amko--http--foo.com--/a".to_string(),
                "amko--http--foo.com--/b".to_string()
            ]
        );
        assert!(gs.members.iter().all(|m| m.weight == 1));
        assert_ne!(gs.checksum, 0);

        let bar = build_global_service("bar.com", &stores(), &PolicyStore::new(), &HostRuleTable::new())
            .unwrap();
        assert_eq!(bar.health_monitor_names(), vec!["amko--bar.com".to_string()]);
        assert!(build_global_service("none.com", &stores(), &PolicyStore::new(), &HostRuleTable::new())
            .is_none());
    }

    #[test]
    fn test_checksum_is_stable_and_tracks_membership() {
        let policy = PolicyStore::new();
        let rules = HostRuleTable::new();
        let s = stores();
        let first = build_global_service("foo.com", &s, &policy, &rules).unwrap();
        let again = build_global_service("foo.com", &s, &policy, &rules).unwrap();
        assert_eq!(first.checksum, again.checksum);

        s.delete(StoreKind::Accepted, "c2", ObjectType::Ingress, "ns/ing/foo.com");
        let fewer = build_global_service("foo.com", &s, &policy, &rules).unwrap();
        assert_ne!(first.checksum, fewer.checksum);
    }

    #[test]
    fn test_weights_from_host_rule_then_policy() {
        let policy = PolicyStore::new();
        policy.replace(Some(Arc::new(GdpPolicy::from_spec(&GlobalDeploymentPolicySpec {
            traffic_split: vec![
                TrafficSplit {
                    cluster: "c1".to_string(),
                    weight: 4,
                },
                TrafficSplit {
                    cluster: "c2".to_string(),
                    weight: 6,
                },
            ],
            ..Default::default()
        }))));
        let rules = HostRuleTable::new();
        let s = stores();
        let before = build_global_service("foo.com", &s, &policy, &rules).unwrap();
        let weights: Vec<u32> = before.members.iter().map(|m| m.weight).collect();
        assert_eq!(weights, vec![4, 6]);

        rules.upsert(GslbHostRuleSpec {
            fqdn: "foo.com".to_string(),
            ttl: Some(30),
            site_persistence: Some(SitePersistence {
                enabled: true,
                profile_ref: Some("gap-1".to_string()),
            }),
            health_monitor_refs: vec!["custom-hm".to_string()],
            traffic_split: vec![TrafficSplit {
                cluster: "c2".to_string(),
                weight: 15,
            }],
        });
        let after = build_global_service("foo.com", &s, &policy, &rules).unwrap();
        let weights: Vec<u32> = after.members.iter().map(|m| m.weight).collect();
        assert_eq!(weights, vec![4, 15]);
        assert_eq!(after.ttl, Some(30));
        assert!(after.health_monitors.is_empty());
        assert_eq!(after.health_monitor_names(), vec!["custom-hm".to_string()]);
        assert_ne!(before.checksum, after.checksum);
    }

    #[test]
    fn test_monitor_type_and_port_changes_change_checksum() {
        let policy = PolicyStore::new();
        let rules = HostRuleTable::new();
        let s = ObjectStores::new();
        s.add(
            StoreKind::Accepted,
            "c1",
            ObjectType::Ingress,
            "ns/ing/foo.com",
            snapshot("foo.com", "10.0.0.1", &[]),
        );
        let plain = build_global_service("foo.com", &s, &policy, &rules).unwrap();
        s.add(
            StoreKind::Accepted,
            "c1",
            ObjectType::Ingress,
            "ns/ing/foo.com",
            ObjectSnapshot {
                tls: true,
                ..snapshot("foo.com", "10.0.0.1", &[])
            },
        );
        let secure = build_global_service("foo.com", &s, &policy, &rules).unwrap();
        assert_eq!(plain.health_monitor_names(), secure.health_monitor_names());
        assert_eq!(secure.health_monitors[0].port, DEFAULT_HTTPS_HEALTH_MONITOR_PORT);
        assert_ne!(plain.checksum, secure.checksum);

        let svc = |port| ObjectSnapshot {
            protocol: Some("TCP".to_string()),
            port: Some(port),
            ..snapshot("svc.com", "10.0.0.7", &[])
        };
        s.add(StoreKind::Accepted, "c1", ObjectType::Service, "ns/svc", svc(80));
        let before = build_global_service("svc.com", &s, &policy, &rules).unwrap();
        s.add(StoreKind::Accepted, "c1", ObjectType::Service, "ns/svc", svc(8443));
        let after = build_global_service("svc.com", &s, &policy, &rules).unwrap();
        assert_eq!(before.health_monitor_names(), after.health_monitor_names());
        assert_ne!(before.checksum, after.checksum);
    }

    #[test]
    fn test_passthrough_and_service_monitors() {
        let s = ObjectStores::new();
        s.add(
            StoreKind::Accepted,
            "c1",
            ObjectType::Route,
            "ns/r",
            ObjectSnapshot {
                termination: Some("passthrough".to_string()),
                tls: true,
                ..snapshot("pt.com", "10.0.0.5", &[])
            },
        );
        s.add(
            StoreKind::Accepted,
            "c1",
            ObjectType::Service,
            "ns/svc",
            ObjectSnapshot {
                protocol: Some("UDP".to_string()),
                port: Some(53),
                ..snapshot("dns.com", "10.0.0.6", &[])
            },
        );
        let policy = PolicyStore::new();
        let rules = HostRuleTable::new();
        let pt = build_global_service("pt.com", &s, &policy, &rules).unwrap();
        assert_eq!(pt.health_monitor_names(), vec![PASSTHROUGH_HEALTH_MONITOR.to_string()]);
        let dns = build_global_service("dns.com", &s, &policy, &rules).unwrap();
        assert_eq!(dns.health_monitors[0].hm_type, "HEALTH_MONITOR_UDP");
        assert_eq!(dns.health_monitors[0].port, 53);
        assert_eq!(known_service_names(&s), vec!["dns.com".to_string(), "pt.com".to_string()]);
    }
}
