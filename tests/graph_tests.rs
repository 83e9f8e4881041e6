//! # Graph Tests
//!
//! Global service synthesis seen from outside the crate: fingerprints must not
//! depend on the order objects arrived in.

use gslb_controller::controller::graph::build_global_service;
use gslb_controller::prelude::*;

fn member(host: &str, ip: &str, paths: &[&str]) -> ObjectSnapshot {
    ObjectSnapshot {
        hostname: host.to_string(),
        ip_addr: Some(ip.to_string()),
        paths: paths.iter().map(|p| (*p).to_string()).collect(),
        ..Default::default()
    }
    .with_checksum()
}

fn entries() -> Vec<(&'static str, ObjectType, &'static str, ObjectSnapshot)> {
    vec![
        ("c1", ObjectType::Ingress, "ns/ing/foo.com", member("foo.com", "10.0.0.1", &["/b", "/a"])),
        ("c2", ObjectType::Ingress, "ns/ing/foo.com", member("foo.com", "10.0.0.2", &["/a"])),
        ("c2", ObjectType::Route, "ns/route", member("foo.com", "10.0.0.3", &["/c"])),
        ("c3", ObjectType::Service, "ns/svc", member("foo.com", "10.0.0.4", &[])),
    ]
}

fn fill(order: impl Iterator<Item = (&'static str, ObjectType, &'static str, ObjectSnapshot)>) -> ObjectStores {
    let stores = ObjectStores::new();
    for (cluster, obj_type, key, snapshot) in order {
        stores.add(StoreKind::Accepted, cluster, obj_type, key, snapshot);
    }
    stores
}

#[test]
fn test_checksum_independent_of_insertion_order() {
    let policy = PolicyStore::new();
    let rules = HostRuleTable::new();

    let forward = build_global_service("foo.com", &fill(entries().into_iter()), &policy, &rules)
        .expect("members present");
    let reverse = build_global_service("foo.com", &fill(entries().into_iter().rev()), &policy, &rules)
        .expect("members present");

    assert_eq!(forward.checksum, reverse.checksum);
    assert_eq!(forward.member_ips(), reverse.member_ips());
    assert_eq!(forward.health_monitor_names(), reverse.health_monitor_names());
    assert_eq!(forward.members.len(), 4);
}

#[test]
fn test_rejected_objects_never_become_members() {
    let stores = fill(entries().into_iter());
    stores.add(
        StoreKind::Rejected,
        "c4",
        ObjectType::Service,
        "ns/svc",
        member("foo.com", "10.0.0.9", &[]),
    );
    let gs = build_global_service("foo.com", &stores, &PolicyStore::new(), &HostRuleTable::new())
        .expect("members present");
    assert!(!gs.member_ips().contains(&"10.0.0.9".to_string()));
}

#[test]
fn test_host_rule_ttl_changes_checksum() {
    let stores = fill(entries().into_iter());
    let policy = PolicyStore::new();
    let rules = HostRuleTable::new();
    let plain = build_global_service("foo.com", &stores, &policy, &rules).expect("members present");

    rules.upsert(GslbHostRuleSpec {
        fqdn: "foo.com".to_string(),
        ttl: Some(10),
        ..Default::default()
    });
    let with_ttl = build_global_service("foo.com", &stores, &policy, &rules).expect("members present");
    assert_eq!(with_ttl.ttl, Some(10));
    assert_ne!(plain.checksum, with_ttl.checksum);

    // A rule for another fqdn leaves this service alone
    rules.remove("foo.com");
    rules.upsert(GslbHostRuleSpec {
        fqdn: "bar.com".to_string(),
        ttl: Some(99),
        ..Default::default()
    });
    let again = build_global_service("foo.com", &stores, &policy, &rules).expect("members present");
    assert_eq!(plain.checksum, again.checksum);
}
