//! # Member Events
//!
//! Turns member-cluster watch events into object source updates and
//! multi-cluster keys. The source is always updated before the key is
//! returned, so an ingestion worker picking the key up sees the new state.
//!
//! An ingress yields one key per virtual host; hosts that disappear from an
//! ingress yield DELETE keys. After a watch re-lists, cached objects missing
//! from the new listing yield DELETE keys as well.

use k8s_openapi::api::core::v1::{Namespace, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use crate::controller::ingestion::InMemoryObjectSource;
use crate::controller::key::{MultiClusterKey, ObjectRef, ObjectType, Operation};
use crate::controller::translate::{ingress_snapshots, route_snapshot, service_snapshot, Route};

fn namespace_or_default(ns: Option<String>) -> String {
    ns.unwrap_or_else(|| "default".to_string())
}

fn upsert_key(
    source: &InMemoryObjectSource,
    object: ObjectRef,
    snapshot: crate::controller::store::ObjectSnapshot,
) -> MultiClusterKey {
    let operation = if source.contains(&object) {
        Operation::Update
    } else {
        Operation::Add
    };
    source.upsert(object.clone(), snapshot);
    MultiClusterKey::new(operation, object)
}

fn delete_key(source: &InMemoryObjectSource, object: ObjectRef) -> Option<MultiClusterKey> {
    source
        .remove(&object)
        .map(|_| MultiClusterKey::new(Operation::Delete, object))
}

#[must_use]
pub fn ingress_applied(
    source: &InMemoryObjectSource,
    cluster: &str,
    ingress: &Ingress,
) -> Vec<MultiClusterKey> {
    let namespace = namespace_or_default(ingress.namespace());
    let name = ingress.name_any();
    let previous = source.ingress_hosts(cluster, &namespace, &name);
    let current = ingress_snapshots(ingress);

    let mut keys: Vec<MultiClusterKey> = previous
        .iter()
        .filter(|host| !current.contains_key(*host))
        .filter_map(|host| delete_key(source, ObjectRef::ingress(cluster, &namespace, &name, host)))
        .collect();
    keys.extend(current.into_iter().map(|(host, snapshot)| {
        upsert_key(
            source,
            ObjectRef::ingress(cluster, &namespace, &name, &host),
            snapshot,
        )
    }));
    keys
}

#[must_use]
pub fn ingress_deleted(
    source: &InMemoryObjectSource,
    cluster: &str,
    ingress: &Ingress,
) -> Vec<MultiClusterKey> {
    let namespace = namespace_or_default(ingress.namespace());
    let name = ingress.name_any();
    source
        .ingress_hosts(cluster, &namespace, &name)
        .iter()
        .filter_map(|host| delete_key(source, ObjectRef::ingress(cluster, &namespace, &name, host)))
        .collect()
}

/// Services that stop being `LoadBalancer` services are removed
#[must_use]
pub fn service_applied(
    source: &InMemoryObjectSource,
    cluster: &str,
    service: &Service,
) -> Option<MultiClusterKey> {
    let object = ObjectRef::service(
        cluster,
        &namespace_or_default(service.namespace()),
        &service.name_any(),
    );
    match service_snapshot(service) {
        Some(snapshot) => Some(upsert_key(source, object, snapshot)),
        None => delete_key(source, object),
    }
}

#[must_use]
pub fn service_deleted(
    source: &InMemoryObjectSource,
    cluster: &str,
    service: &Service,
) -> Option<MultiClusterKey> {
    delete_key(
        source,
        ObjectRef::service(
            cluster,
            &namespace_or_default(service.namespace()),
            &service.name_any(),
        ),
    )
}

fn route_ref(cluster: &str, route: &Route) -> ObjectRef {
    ObjectRef::route(
        cluster,
        &namespace_or_default(route.metadata.namespace.clone()),
        route.metadata.name.as_deref().unwrap_or_default(),
    )
}

#[must_use]
pub fn route_applied(source: &InMemoryObjectSource, cluster: &str, route: &Route) -> MultiClusterKey {
    upsert_key(source, route_ref(cluster, route), route_snapshot(route))
}

#[must_use]
pub fn route_deleted(
    source: &InMemoryObjectSource,
    cluster: &str,
    route: &Route,
) -> Option<MultiClusterKey> {
    delete_key(source, route_ref(cluster, route))
}

/// Returns true when the namespace labels changed
pub fn namespace_applied(source: &InMemoryObjectSource, cluster: &str, namespace: &Namespace) -> bool {
    source.set_namespace_labels(cluster, &namespace.name_any(), namespace.labels().clone())
}

/// Objects seen during one watch's current listing. Objects deleted while
/// the watch was down never get a delete event, so whatever the cache holds
/// for this cluster and type that the listing did not mention is removed
/// once the listing is complete.
#[derive(Debug)]
pub struct RelistTracker {
    cluster: String,
    obj_type: ObjectType,
    seen: Mutex<Option<HashSet<ObjectRef>>>,
}

impl RelistTracker {
    #[must_use]
    pub fn new(cluster: &str, obj_type: ObjectType) -> Self {
        Self {
            cluster: cluster.to_string(),
            obj_type,
            seen: Mutex::new(None),
        }
    }

    /// A new listing started
    pub fn begin(&self) {
        *self.seen.lock().unwrap_or_else(PoisonError::into_inner) = Some(HashSet::new());
    }

    /// Note the objects kept alive by the keys of one applied event
    pub fn record<'a>(&self, keys: impl IntoIterator<Item = &'a MultiClusterKey>) {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(seen) = seen.as_mut() {
            seen.extend(
                keys.into_iter()
                    .filter(|k| k.operation != Operation::Delete)
                    .map(|k| k.object.clone()),
            );
        }
    }

    /// The listing is complete: drop cached objects it did not mention
    #[must_use]
    pub fn finish(&self, source: &InMemoryObjectSource) -> Vec<MultiClusterKey> {
        let Some(seen) = self.seen.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return Vec::new();
        };
        source
            .objects_of(&self.cluster, self.obj_type)
            .into_iter()
            .filter(|object| !seen.contains(object))
            .filter_map(|object| delete_key(source, object))
            .collect()
    }
}
