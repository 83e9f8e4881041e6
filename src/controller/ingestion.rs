//! # Ingestion
//!
//! Processes one multi-cluster key at a time:
//!
//! 1. decode the key; malformed keys are format errors and are dropped
//! 2. DELETE removes the object from whichever store holds it
//! 3. ADD/UPDATE fetches the latest snapshot from the [`ObjectSource`],
//!    evaluates policy and places the object into Accepted or Rejected
//!
//! The result names the hostnames (global services) whose membership may have
//! changed so the caller can schedule a rebuild. Replaying a key is a no-op
//! apart from recomputing the same placement.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Debug;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::controller::key::{KeyError, MultiClusterKey, ObjectRef, ObjectType, Operation};
use crate::controller::policy::{AdmissionCandidate, PolicyStore};
use crate::controller::store::{ObjectSnapshot, ObjectStores, Placement, StoreKind};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cluster '{0}' is not available")]
    ClusterUnavailable(String),
    #[error("lookup of {object} failed: {message}")]
    Lookup { object: String, message: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    /// Non-retryable
    #[error("format error: {0}")]
    Format(#[from] KeyError),
    /// Retryable
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl IngestError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Source(_))
    }
}

/// Latest known state of member-cluster objects
pub trait ObjectSource: Send + Sync + Debug {
    /// `Ok(None)` when the object no longer exists
    fn fetch(&self, object: &ObjectRef) -> Result<Option<ObjectSnapshot>, SourceError>;

    fn namespace_labels(
        &self,
        cluster: &str,
        namespace: &str,
    ) -> Result<BTreeMap<String, String>, SourceError>;
}

/// Object source backed by maps, filled by the member watchers
#[derive(Debug, Default)]
pub struct InMemoryObjectSource {
    objects: RwLock<HashMap<ObjectRef, ObjectSnapshot>>,
    namespaces: RwLock<HashMap<(String, String), BTreeMap<String, String>>>,
    unavailable: RwLock<BTreeSet<String>>,
}

impl InMemoryObjectSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, object: ObjectRef, snapshot: ObjectSnapshot) {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(object, snapshot);
    }

    pub fn remove(&self, object: &ObjectRef) -> Option<ObjectSnapshot> {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(object)
    }

    /// Known ingress hosts of one ingress resource
    #[must_use]
    pub fn ingress_hosts(&self, cluster: &str, namespace: &str, name: &str) -> BTreeSet<String> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter_map(|o| match o {
                ObjectRef::Ingress(i)
                    if i.cluster == cluster && i.namespace == namespace && i.name == name =>
                {
                    Some(i.hostname.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Cached objects of one type in one cluster
    #[must_use]
    pub fn objects_of(&self, cluster: &str, obj_type: ObjectType) -> Vec<ObjectRef> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|o| o.cluster() == cluster && o.object_type() == obj_type)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn contains(&self, object: &ObjectRef) -> bool {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(object)
    }

    /// Returns true when the labels differ from the ones already known
    pub fn set_namespace_labels(
        &self,
        cluster: &str,
        namespace: &str,
        labels: BTreeMap<String, String>,
    ) -> bool {
        let previous = self
            .namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((cluster.to_string(), namespace.to_string()), labels.clone());
        previous.as_ref() != Some(&labels)
    }

    /// Mark a cluster as (un)reachable; lookups against it fail while unavailable
    pub fn set_cluster_available(&self, cluster: &str, available: bool) {
        let mut unavailable = self.unavailable.write().unwrap_or_else(PoisonError::into_inner);
        if available {
            unavailable.remove(cluster);
        } else {
            unavailable.insert(cluster.to_string());
        }
    }

    fn check_available(&self, cluster: &str) -> Result<(), SourceError> {
        if self
            .unavailable
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(cluster)
        {
            return Err(SourceError::ClusterUnavailable(cluster.to_string()));
        }
        Ok(())
    }
}

impl ObjectSource for InMemoryObjectSource {
    fn fetch(&self, object: &ObjectRef) -> Result<Option<ObjectSnapshot>, SourceError> {
        self.check_available(object.cluster())?;
        Ok(self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(object)
            .cloned())
    }

    fn namespace_labels(
        &self,
        cluster: &str,
        namespace: &str,
    ) -> Result<BTreeMap<String, String>, SourceError> {
        self.check_available(cluster)?;
        Ok(self
            .namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(cluster.to_string(), namespace.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// What one ingestion did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored {
        kind: StoreKind,
        placement: Placement,
        /// Hostnames whose global service must be rebuilt
        affected: BTreeSet<String>,
    },
    Deleted {
        kind: StoreKind,
        affected: BTreeSet<String>,
    },
    /// Nothing stored for the key; nothing to do
    Absent,
}

impl IngestOutcome {
    #[must_use]
    pub fn affected(&self) -> BTreeSet<String> {
        match self {
            IngestOutcome::Stored { affected, .. } | IngestOutcome::Deleted { affected, .. } => {
                affected.clone()
            }
            IngestOutcome::Absent => BTreeSet::new(),
        }
    }
}

#[derive(Debug)]
pub struct Ingestor {
    stores: Arc<ObjectStores>,
    source: Arc<dyn ObjectSource>,
    policy: Arc<PolicyStore>,
}

impl Ingestor {
    #[must_use]
    pub fn new(
        stores: Arc<ObjectStores>,
        source: Arc<dyn ObjectSource>,
        policy: Arc<PolicyStore>,
    ) -> Self {
        Self {
            stores,
            source,
            policy,
        }
    }

    #[must_use]
    pub fn stores(&self) -> &Arc<ObjectStores> {
        &self.stores
    }

    /// Decode and process one raw key
    pub fn process_key(&self, raw: &str) -> Result<IngestOutcome, IngestError> {
        let key = MultiClusterKey::decode(raw).inspect_err(|e| {
            metrics::increment_format_errors();
            warn!(key = raw, error = %e, "dropping malformed key");
        })?;
        metrics::increment_ingested(key.operation.as_str(), key.object.object_type().as_str());
        self.process(&key)
    }

    pub fn process(&self, key: &MultiClusterKey) -> Result<IngestOutcome, IngestError> {
        match key.operation {
            Operation::Delete => Ok(self.remove(&key.object)),
            Operation::Add | Operation::Update => match self.source.fetch(&key.object)? {
                Some(snapshot) => self.admit(&key.object, snapshot),
                None => {
                    debug!(object = %key.object.cluster_object_name(), "object gone, treating as delete");
                    Ok(self.remove(&key.object))
                }
            },
        }
    }

    fn remove(&self, object: &ObjectRef) -> IngestOutcome {
        match self
            .stores
            .delete_any(object.cluster(), object.object_type(), &object.store_key())
        {
            Some((kind, previous)) => {
                info!(
                    cluster = object.cluster(),
                    key = %object.store_key(),
                    store = %kind,
                    "deleted object"
                );
                IngestOutcome::Deleted {
                    kind,
                    affected: BTreeSet::from([previous.hostname]),
                }
            }
            None => IngestOutcome::Absent,
        }
    }

    fn admit(&self, object: &ObjectRef, snapshot: ObjectSnapshot) -> Result<IngestOutcome, IngestError> {
        let namespace_labels = self
            .source
            .namespace_labels(object.cluster(), object.namespace())?;
        let accepted = self.policy.is_accepted(&AdmissionCandidate {
            object,
            snapshot: &snapshot,
            namespace_labels: &namespace_labels,
        });
        let kind = if accepted {
            StoreKind::Accepted
        } else {
            StoreKind::Rejected
        };

        let store_key = object.store_key();
        let previous_host = self
            .stores
            .locate(object.cluster(), object.object_type(), &store_key)
            .and_then(|k| self.stores.get(k, object.cluster(), object.object_type(), &store_key))
            .map(|s| s.hostname);

        let mut affected = BTreeSet::from([snapshot.hostname.clone()]);
        affected.extend(previous_host);

        let placement = self.stores.add(
            kind,
            object.cluster(),
            object.object_type(),
            &store_key,
            snapshot,
        );
        metrics::increment_admissions(kind.as_str());
        debug!(
            cluster = object.cluster(),
            key = %store_key,
            store = %kind,
            placement = ?placement,
            "stored object"
        );
        Ok(IngestOutcome::Stored {
            kind,
            placement,
            affected,
        })
    }

    /// Re-run policy over every stored object, moving objects between stores
    /// as needed. Returns the hostnames of objects that moved.
    pub fn reevaluate_all(&self) -> BTreeSet<String> {
        let mut affected = BTreeSet::new();
        for kind in [StoreKind::Accepted, StoreKind::Rejected] {
            for (cluster, obj_type, key, snapshot) in self.stores.list_all(kind) {
                let labels = match self
                    .source
                    .namespace_labels(&cluster, namespace_of(&key))
                {
                    Ok(labels) => labels,
                    Err(e) => {
                        warn!(cluster = %cluster, key = %key, error = %e, "skipping re-evaluation");
                        continue;
                    }
                };
                let Some(object) = object_ref_for(&cluster, obj_type, &key) else {
                    continue;
                };
                let accepted = self.policy.is_accepted(&AdmissionCandidate {
                    object: &object,
                    snapshot: &snapshot,
                    namespace_labels: &labels,
                });
                let target = if accepted {
                    StoreKind::Accepted
                } else {
                    StoreKind::Rejected
                };
                if target == kind {
                    continue;
                }
                if self
                    .stores
                    .move_if_unchanged(kind, &cluster, obj_type, &key, &snapshot)
                {
                    info!(cluster = %cluster, key = %key, from = %kind, to = %target, "policy moved object");
                    affected.insert(snapshot.hostname);
                } else {
                    debug!(cluster = %cluster, key = %key, "object changed during re-evaluation, left to ingestion");
                }
            }
        }
        affected
    }
}

fn namespace_of(store_key: &str) -> &str {
    store_key.split('/').next().unwrap_or_default()
}

/// Rebuild the object identity from a store key
fn object_ref_for(cluster: &str, obj_type: ObjectType, store_key: &str) -> Option<ObjectRef> {
    let mut parts = store_key.splitn(3, '/');
    let namespace = parts.next()?;
    let name = parts.next()?;
    match obj_type {
        ObjectType::Ingress => Some(ObjectRef::ingress(cluster, namespace, name, parts.next()?)),
        ObjectType::Route => Some(ObjectRef::route(cluster, namespace, name)),
        ObjectType::Service => Some(ObjectRef::service(cluster, namespace, name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::policy::GdpPolicy;
    use crate::crd::GlobalDeploymentPolicySpec;

    fn setup(match_clusters: &[&str]) -> (Ingestor, Arc<InMemoryObjectSource>, Arc<PolicyStore>) {
        let source = Arc::new(InMemoryObjectSource::new());
        let policy = Arc::new(PolicyStore::new());
        policy.replace(Some(Arc::new(GdpPolicy::from_spec(&GlobalDeploymentPolicySpec {
            match_clusters: match_clusters.iter().map(|c| (*c).to_string()).collect(),
            ..Default::default()
        }))));
        let ingestor = Ingestor::new(
            Arc::new(ObjectStores::new()),
            Arc::clone(&source) as Arc<dyn ObjectSource>,
            Arc::clone(&policy),
        );
        (ingestor, source, policy)
    }

    fn host_snapshot(host: &str, ip: &str) -> ObjectSnapshot {
        ObjectSnapshot {
            hostname: host.to_string(),
            ip_addr: Some(ip.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_add_then_delete_ingress_host() {
        let (ingestor, source, _) = setup(&["cluster1"]);
        let object = ObjectRef::ingress("cluster1", "ns1", "app1", "host1.example.com");
        source.upsert(object, host_snapshot("host1.example.com", "10.0.0.1"));

        let outcome = ingestor
            .process_key("ADD/Ingress/cluster1/ns1/app1/host1.example.com")
            .unwrap();
        assert!(matches!(
            outcome,
            IngestOutcome::Stored {
                kind: StoreKind::Accepted,
                placement: Placement::Inserted,
                ..
            }
        ));
        assert!(ingestor
            .stores()
            .get(StoreKind::Accepted, "cluster1", ObjectType::Ingress, "ns1/app1/host1.example.com")
            .is_some());

        let outcome = ingestor
            .process_key("DELETE/Ingress/cluster1/ns1/app1/host1.example.com")
            .unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::Deleted {
                kind: StoreKind::Accepted,
                affected: BTreeSet::from(["host1.example.com".to_string()]),
            }
        );
        assert!(ingestor
            .stores()
            .locate("cluster1", ObjectType::Ingress, "ns1/app1/host1.example.com")
            .is_none());

        // Replayed delete is a no-op
        assert_eq!(
            ingestor
                .process_key("DELETE/Ingress/cluster1/ns1/app1/host1.example.com")
                .unwrap(),
            IngestOutcome::Absent
        );
    }

    #[test]
    fn test_rejected_when_cluster_not_matched() {
        let (ingestor, source, _) = setup(&["cluster1"]);
        source.upsert(
            ObjectRef::service("cluster2", "ns", "svc"),
            host_snapshot("svc.com", "10.0.0.2"),
        );
        let outcome = ingestor.process_key("ADD/LBSvc/cluster2/ns/svc").unwrap();
        assert!(matches!(
            outcome,
            IngestOutcome::Stored {
                kind: StoreKind::Rejected,
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_key_is_format_error() {
        let (ingestor, _, _) = setup(&["cluster1"]);
        let err = ingestor.process_key("ADD/Ingress/cluster1/ns1/app1").unwrap_err();
        assert!(!err.is_retryable());
        assert!(matches!(err, IngestError::Format(_)));
    }

    #[test]
    fn test_unavailable_cluster_is_retryable() {
        let (ingestor, source, _) = setup(&["cluster1"]);
        source.set_cluster_available("cluster1", false);
        let err = ingestor.process_key("UPDATE/Route/cluster1/ns/r").unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_missing_object_becomes_delete() {
        let (ingestor, source, _) = setup(&["cluster1"]);
        let object = ObjectRef::route("cluster1", "ns", "r");
        source.upsert(object.clone(), host_snapshot("r.com", "10.0.0.3"));
        ingestor.process_key("ADD/Route/cluster1/ns/r").unwrap();
        source.remove(&object);
        assert!(matches!(
            ingestor.process_key("UPDATE/Route/cluster1/ns/r").unwrap(),
            IngestOutcome::Deleted { .. }
        ));
    }

    #[test]
    fn test_hostname_change_affects_both_services() {
        let (ingestor, source, _) = setup(&["cluster1"]);
        let object = ObjectRef::route("cluster1", "ns", "r");
        source.upsert(object.clone(), host_snapshot("old.com", "10.0.0.3"));
        ingestor.process_key("ADD/Route/cluster1/ns/r").unwrap();
        source.upsert(object, host_snapshot("new.com", "10.0.0.3"));
        let outcome = ingestor.process_key("UPDATE/Route/cluster1/ns/r").unwrap();
        assert_eq!(
            outcome.affected(),
            BTreeSet::from(["new.com".to_string(), "old.com".to_string()])
        );
    }

    #[test]
    fn test_policy_change_moves_objects() {
        let (ingestor, source, policy) = setup(&["cluster1"]);
        source.upsert(
            ObjectRef::ingress("cluster1", "ns", "ing", "a.com"),
            host_snapshot("a.com", "10.0.0.1"),
        );
        ingestor.process_key("ADD/Ingress/cluster1/ns/ing/a.com").unwrap();

        policy.replace(Some(Arc::new(GdpPolicy::from_spec(&GlobalDeploymentPolicySpec {
            match_clusters: vec!["cluster2".to_string()],
            ..Default::default()
        }))));
        let moved = ingestor.reevaluate_all();
        assert_eq!(moved, BTreeSet::from(["a.com".to_string()]));
        assert_eq!(
            ingestor.stores().locate("cluster1", ObjectType::Ingress, "ns/ing/a.com"),
            Some(StoreKind::Rejected)
        );
        assert!(ingestor.reevaluate_all().is_empty());
    }

    /// Source that deletes one stored key the first time labels are looked up,
    /// standing in for a DELETE processed by another worker mid-pass
    #[derive(Debug)]
    struct DeletingSource {
        stores: Arc<ObjectStores>,
        fired: std::sync::atomic::AtomicBool,
    }

    impl ObjectSource for DeletingSource {
        fn fetch(&self, _object: &ObjectRef) -> Result<Option<ObjectSnapshot>, SourceError> {
            Ok(None)
        }

        fn namespace_labels(
            &self,
            _cluster: &str,
            _namespace: &str,
        ) -> Result<BTreeMap<String, String>, SourceError> {
            if !self.fired.swap(true, std::sync::atomic::Ordering::SeqCst) {
                self.stores.delete_any("cluster1", ObjectType::Route, "ns/r");
            }
            Ok(BTreeMap::new())
        }
    }

    #[test]
    fn test_reevaluation_does_not_resurrect_concurrent_delete() {
        let stores = Arc::new(ObjectStores::new());
        stores.add(
            StoreKind::Accepted,
            "cluster1",
            ObjectType::Route,
            "ns/r",
            host_snapshot("r.com", "10.0.0.3"),
        );
        let source = Arc::new(DeletingSource {
            stores: Arc::clone(&stores),
            fired: std::sync::atomic::AtomicBool::new(false),
        });
        // No policy: the route would move to Rejected
        let ingestor = Ingestor::new(
            Arc::clone(&stores),
            source as Arc<dyn ObjectSource>,
            Arc::new(PolicyStore::new()),
        );

        assert!(ingestor.reevaluate_all().is_empty());
        assert_eq!(stores.locate("cluster1", ObjectType::Route, "ns/r"), None);
    }
}
