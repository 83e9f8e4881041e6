//! # Cluster Object Stores
//!
//! Accepted/Rejected classification of every ingested object, partitioned by
//! member cluster and object type.
//!
//! Both classifications of a `(cluster, type)` partition live behind the same
//! lock, so moving a key between Accepted and Rejected is a single critical
//! section: a reader never sees the key in both stores, nor in neither.
//! The store holds no policy knowledge; callers decide the [`StoreKind`].

use crate::controller::checksum::fnv1a_32;
use crate::controller::key::ObjectType;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Which classification an object sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Accepted,
    Rejected,
}

impl StoreKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Accepted => "Accepted",
            StoreKind::Rejected => "Rejected",
        }
    }

    #[must_use]
    pub fn other(&self) -> StoreKind {
        match self {
            StoreKind::Accepted => StoreKind::Rejected,
            StoreKind::Rejected => StoreKind::Accepted,
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last-known state of one watched object (or one ingress host)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectSnapshot {
    pub hostname: String,
    pub ip_addr: Option<String>,
    pub labels: BTreeMap<String, String>,
    /// Paths served for this host (ingress rules, route path)
    pub paths: Vec<String>,
    pub tls: bool,
    /// Route termination, e.g. `passthrough`
    pub termination: Option<String>,
    /// Service protocol and port, for TCP/UDP monitors
    pub protocol: Option<String>,
    pub port: Option<i32>,
    pub checksum: u32,
}

impl ObjectSnapshot {
    /// Recompute `checksum` over the fields that matter downstream
    #[must_use]
    pub fn with_checksum(mut self) -> Self {
        let mut paths = self.paths.clone();
        paths.sort();
        let labels: Vec<String> = self.labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let material = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.hostname,
            self.ip_addr.as_deref().unwrap_or_default(),
            labels.join(","),
            paths.join(","),
            self.tls,
            self.termination.as_deref().unwrap_or_default(),
            self.protocol.as_deref().unwrap_or_default(),
            self.port.unwrap_or_default(),
        );
        self.checksum = fnv1a_32(material.as_bytes());
        self
    }
}

#[derive(Debug, Default)]
struct Partition {
    accepted: HashMap<String, ObjectSnapshot>,
    rejected: HashMap<String, ObjectSnapshot>,
}

impl Partition {
    fn map(&self, kind: StoreKind) -> &HashMap<String, ObjectSnapshot> {
        match kind {
            StoreKind::Accepted => &self.accepted,
            StoreKind::Rejected => &self.rejected,
        }
    }

    fn map_mut(&mut self, kind: StoreKind) -> &mut HashMap<String, ObjectSnapshot> {
        match kind {
            StoreKind::Accepted => &mut self.accepted,
            StoreKind::Rejected => &mut self.rejected,
        }
    }
}

type PartitionKey = (String, ObjectType);

/// Result of placing an object into a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Key was not present in either store
    Inserted,
    /// Key stayed in the same store with new contents
    Updated,
    /// Key moved from the other store
    Moved,
}

/// Accepted/Rejected stores for all clusters and object types
#[derive(Default)]
pub struct ObjectStores {
    partitions: RwLock<HashMap<PartitionKey, Arc<RwLock<Partition>>>>,
}

impl fmt::Debug for ObjectStores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let partitions = self.partitions.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ObjectStores")
            .field("partitions", &partitions.len())
            .finish()
    }
}

impl ObjectStores {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, cluster: &str, obj_type: ObjectType) -> Option<Arc<RwLock<Partition>>> {
        let partitions = self.partitions.read().unwrap_or_else(PoisonError::into_inner);
        partitions.get(&(cluster.to_string(), obj_type)).cloned()
    }

    fn partition_or_create(&self, cluster: &str, obj_type: ObjectType) -> Arc<RwLock<Partition>> {
        if let Some(p) = self.partition(cluster, obj_type) {
            return p;
        }
        let mut partitions = self.partitions.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            partitions
                .entry((cluster.to_string(), obj_type))
                .or_default(),
        )
    }

    /// Put `snapshot` under `key` in `kind`, removing it from the other store in
    /// the same critical section.
    pub fn add(
        &self,
        kind: StoreKind,
        cluster: &str,
        obj_type: ObjectType,
        key: &str,
        snapshot: ObjectSnapshot,
    ) -> Placement {
        let partition = self.partition_or_create(cluster, obj_type);
        let mut guard = partition.write().unwrap_or_else(PoisonError::into_inner);
        let moved = guard.map_mut(kind.other()).remove(key).is_some();
        let existed = guard.map_mut(kind).insert(key.to_string(), snapshot).is_some();
        if moved {
            Placement::Moved
        } else if existed {
            Placement::Updated
        } else {
            Placement::Inserted
        }
    }

    #[must_use]
    pub fn get(
        &self,
        kind: StoreKind,
        cluster: &str,
        obj_type: ObjectType,
        key: &str,
    ) -> Option<ObjectSnapshot> {
        let partition = self.partition(cluster, obj_type)?;
        let guard = partition.read().unwrap_or_else(PoisonError::into_inner);
        guard.map(kind).get(key).cloned()
    }

    pub fn delete(
        &self,
        kind: StoreKind,
        cluster: &str,
        obj_type: ObjectType,
        key: &str,
    ) -> Option<ObjectSnapshot> {
        let partition = self.partition(cluster, obj_type)?;
        let mut guard = partition.write().unwrap_or_else(PoisonError::into_inner);
        guard.map_mut(kind).remove(key)
    }

    /// Remove `key` from whichever store holds it
    pub fn delete_any(
        &self,
        cluster: &str,
        obj_type: ObjectType,
        key: &str,
    ) -> Option<(StoreKind, ObjectSnapshot)> {
        let partition = self.partition(cluster, obj_type)?;
        let mut guard = partition.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(s) = guard.accepted.remove(key) {
            return Some((StoreKind::Accepted, s));
        }
        guard.rejected.remove(key).map(|s| (StoreKind::Rejected, s))
    }

    /// Which store currently holds `key`, if any
    #[must_use]
    pub fn locate(&self, cluster: &str, obj_type: ObjectType, key: &str) -> Option<StoreKind> {
        let partition = self.partition(cluster, obj_type)?;
        let guard = partition.read().unwrap_or_else(PoisonError::into_inner);
        if guard.accepted.contains_key(key) {
            Some(StoreKind::Accepted)
        } else if guard.rejected.contains_key(key) {
            Some(StoreKind::Rejected)
        } else {
            None
        }
    }

    /// Entries of one store for one cluster and type, sorted by key
    #[must_use]
    pub fn list(
        &self,
        kind: StoreKind,
        cluster: &str,
        obj_type: ObjectType,
    ) -> Vec<(String, ObjectSnapshot)> {
        let Some(partition) = self.partition(cluster, obj_type) else {
            return Vec::new();
        };
        let guard = partition.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = guard
            .map(kind)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Clusters that have a partition for `obj_type`, sorted
    #[must_use]
    pub fn clusters(&self, obj_type: ObjectType) -> Vec<String> {
        let partitions = self.partitions.read().unwrap_or_else(PoisonError::into_inner);
        let mut clusters: Vec<String> = partitions
            .keys()
            .filter(|(_, t)| *t == obj_type)
            .map(|(c, _)| c.clone())
            .collect();
        clusters.sort();
        clusters
    }

    /// Every entry of one store across all clusters and types
    #[must_use]
    pub fn list_all(&self, kind: StoreKind) -> Vec<(String, ObjectType, String, ObjectSnapshot)> {
        let mut out = Vec::new();
        for obj_type in ObjectType::ALL {
            for cluster in self.clusters(obj_type) {
                for (key, snapshot) in self.list(kind, &cluster, obj_type) {
                    out.push((cluster.clone(), obj_type, key, snapshot));
                }
            }
        }
        out
    }

    /// Move `key` out of `from` into the other store, but only if `from` still
    /// holds exactly `expected`. Returns false when a concurrent update or
    /// delete got there first; the store is then left untouched.
    pub fn move_if_unchanged(
        &self,
        from: StoreKind,
        cluster: &str,
        obj_type: ObjectType,
        key: &str,
        expected: &ObjectSnapshot,
    ) -> bool {
        let Some(partition) = self.partition(cluster, obj_type) else {
            return false;
        };
        let mut guard = partition.write().unwrap_or_else(PoisonError::into_inner);
        if guard.map(from).get(key) != Some(expected) {
            return false;
        }
        let Some(snapshot) = guard.map_mut(from).remove(key) else {
            return false;
        };
        guard.map_mut(from.other()).insert(key.to_string(), snapshot);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(host: &str, ip: &str) -> ObjectSnapshot {
        ObjectSnapshot {
            hostname: host.to_string(),
            ip_addr: Some(ip.to_string()),
            ..Default::default()
        }
        .with_checksum()
    }

    #[test]
    fn test_add_get_delete() {
        let stores = ObjectStores::new();
        let s = snapshot("h1.com", "10.0.0.1");
        assert_eq!(
            stores.add(StoreKind::Accepted, "c1", ObjectType::Route, "ns/r1", s.clone()),
            Placement::Inserted
        );
        assert_eq!(
            stores.get(StoreKind::Accepted, "c1", ObjectType::Route, "ns/r1"),
            Some(s.clone())
        );
        assert_eq!(stores.get(StoreKind::Rejected, "c1", ObjectType::Route, "ns/r1"), None);
        assert_eq!(stores.get(StoreKind::Accepted, "c2", ObjectType::Route, "ns/r1"), None);
        assert_eq!(
            stores.delete(StoreKind::Accepted, "c1", ObjectType::Route, "ns/r1"),
            Some(s)
        );
        assert!(stores.list(StoreKind::Accepted, "c1", ObjectType::Route).is_empty());
    }

    #[test]
    fn test_reclassification_never_leaves_key_in_both_stores() {
        let stores = ObjectStores::new();
        let s = snapshot("h1.com", "10.0.0.1");
        stores.add(StoreKind::Rejected, "c1", ObjectType::Ingress, "ns/i/h1.com", s.clone());
        assert_eq!(
            stores.add(StoreKind::Accepted, "c1", ObjectType::Ingress, "ns/i/h1.com", s.clone()),
            Placement::Moved
        );
        assert_eq!(
            stores.locate("c1", ObjectType::Ingress, "ns/i/h1.com"),
            Some(StoreKind::Accepted)
        );
        assert!(stores.list(StoreKind::Rejected, "c1", ObjectType::Ingress).is_empty());

        assert_eq!(
            stores.add(StoreKind::Accepted, "c1", ObjectType::Ingress, "ns/i/h1.com", s),
            Placement::Updated
        );
    }

    #[test]
    fn test_delete_any_removes_from_holding_store() {
        let stores = ObjectStores::new();
        stores.add(StoreKind::Rejected, "c1", ObjectType::Service, "ns/s", snapshot("a", "1.1.1.1"));
        let (kind, _) = stores.delete_any("c1", ObjectType::Service, "ns/s").unwrap();
        assert_eq!(kind, StoreKind::Rejected);
        assert!(stores.delete_any("c1", ObjectType::Service, "ns/s").is_none());
    }

    #[test]
    fn test_partitions_are_independent_per_type_and_cluster() {
        let stores = ObjectStores::new();
        stores.add(StoreKind::Accepted, "c1", ObjectType::Route, "ns/x", snapshot("a", "1.1.1.1"));
        stores.add(StoreKind::Accepted, "c2", ObjectType::Service, "ns/x", snapshot("a", "1.1.1.2"));
        assert_eq!(stores.clusters(ObjectType::Route), vec!["c1".to_string()]);
        assert_eq!(stores.list_all(StoreKind::Accepted).len(), 2);
        assert_eq!(stores.list(StoreKind::Accepted, "c1", ObjectType::Service).len(), 0);
    }

    #[test]
    fn test_move_if_unchanged_respects_concurrent_writes() {
        let stores = ObjectStores::new();
        let seen = snapshot("a.com", "10.0.0.1");
        stores.add(StoreKind::Rejected, "c1", ObjectType::Route, "ns/r", seen.clone());

        // Deleted after it was listed: stays deleted
        stores.delete_any("c1", ObjectType::Route, "ns/r");
        assert!(!stores.move_if_unchanged(StoreKind::Rejected, "c1", ObjectType::Route, "ns/r", &seen));
        assert_eq!(stores.locate("c1", ObjectType::Route, "ns/r"), None);

        // Updated after it was listed: the newer snapshot wins
        let newer = snapshot("a.com", "10.0.0.2");
        stores.add(StoreKind::Rejected, "c1", ObjectType::Route, "ns/r", newer.clone());
        assert!(!stores.move_if_unchanged(StoreKind::Rejected, "c1", ObjectType::Route, "ns/r", &seen));
        assert_eq!(
            stores.get(StoreKind::Rejected, "c1", ObjectType::Route, "ns/r"),
            Some(newer.clone())
        );

        assert!(stores.move_if_unchanged(StoreKind::Rejected, "c1", ObjectType::Route, "ns/r", &newer));
        assert_eq!(
            stores.get(StoreKind::Accepted, "c1", ObjectType::Route, "ns/r"),
            Some(newer)
        );
        assert_eq!(stores.get(StoreKind::Rejected, "c1", ObjectType::Route, "ns/r"), None);
    }

    #[test]
    fn test_concurrent_moves_keep_single_placement() {
        let stores = Arc::new(ObjectStores::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let stores = Arc::clone(&stores);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let kind = if i % 2 == 0 {
                            StoreKind::Accepted
                        } else {
                            StoreKind::Rejected
                        };
                        stores.add(kind, "c1", ObjectType::Route, "ns/r", snapshot("a", "1.1.1.1"));
                        assert!(stores.locate("c1", ObjectType::Route, "ns/r").is_some());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let accepted = stores.list(StoreKind::Accepted, "c1", ObjectType::Route).len();
        let rejected = stores.list(StoreKind::Rejected, "c1", ObjectType::Route).len();
        assert_eq!(accepted + rejected, 1);
    }
}
