//! # Publication
//!
//! Builds a global service and pushes it when it changed. The last pushed
//! checksum per service is the only de-duplication; build, compare and push
//! for one service run under that service's own async lock so two workers
//! never interleave on the same service.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info, Instrument};

use crate::controller::coordination::CoordinationContext;
use crate::controller::graph::{build_global_service, known_service_names};
use crate::controller::policy::{HostRuleTable, PolicyStore};
use crate::controller::push::{GslbServicePusher, PushError};
use crate::controller::store::ObjectStores;
use crate::observability::metrics;

/// What one publication attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Pushed { checksum: u32 },
    Unchanged,
    Deleted,
    /// No members and never pushed
    Nothing,
    /// Not leader, or bootstrap has not completed
    NotPermitted,
}

type ServiceSlot = Arc<tokio::sync::Mutex<Option<u32>>>;

pub struct GraphPublisher {
    stores: Arc<ObjectStores>,
    policy: Arc<PolicyStore>,
    host_rules: Arc<HostRuleTable>,
    pusher: Arc<dyn GslbServicePusher>,
    coordination: Arc<CoordinationContext>,
    last_pushed: Mutex<HashMap<String, ServiceSlot>>,
}

impl fmt::Debug for GraphPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let services = self
            .last_pushed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("GraphPublisher")
            .field("pusher", &self.pusher)
            .field("services", &services)
            .finish_non_exhaustive()
    }
}

impl GraphPublisher {
    #[must_use]
    pub fn new(
        stores: Arc<ObjectStores>,
        policy: Arc<PolicyStore>,
        host_rules: Arc<HostRuleTable>,
        pusher: Arc<dyn GslbServicePusher>,
        coordination: Arc<CoordinationContext>,
    ) -> Self {
        Self {
            stores,
            policy,
            host_rules,
            pusher,
            coordination,
            last_pushed: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, name: &str) -> ServiceSlot {
        let mut slots = self.last_pushed.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(name.to_string()).or_default())
    }

    /// Drop the slot of a service with nothing pushed, unless another worker
    /// is queued on it
    fn release_slot(&self, name: &str, slot: &ServiceSlot) {
        let mut slots = self.last_pushed.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = slots
            .get(name)
            .is_some_and(|held| Arc::ptr_eq(held, slot) && Arc::strong_count(slot) == 2);
        if idle {
            slots.remove(name);
        }
    }

    /// Checksum of the last successful push of `name`
    pub async fn last_pushed_checksum(&self, name: &str) -> Option<u32> {
        let slot = {
            let slots = self.last_pushed.lock().unwrap_or_else(PoisonError::into_inner);
            slots.get(name).cloned()
        }?;
        let guard = slot.lock().await;
        *guard
    }

    /// Every service that has members now or was pushed before
    #[must_use]
    pub fn service_names(&self) -> Vec<String> {
        let mut names = known_service_names(&self.stores);
        names.extend(
            self.last_pushed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .keys()
                .cloned(),
        );
        names.sort();
        names.dedup();
        names
    }

    /// Rebuild `name` and push, delete or skip as needed
    pub async fn publish(&self, name: &str) -> Result<PublishOutcome, PushError> {
        let span = tracing::info_span!("gslb.graph.publish", gs = name);
        async move {
            if !self.coordination.may_publish() {
                debug!("not permitted to publish, skipping");
                return Ok(PublishOutcome::NotPermitted);
            }

            let slot = self.slot(name);
            let mut last = slot.lock().await;
            let built =
                build_global_service(name, &self.stores, &self.policy, &self.host_rules);

            match (built, *last) {
                (Some(gs), Some(previous)) if previous == gs.checksum => {
                    metrics::increment_pushes_skipped();
                    debug!(checksum = gs.checksum, "unchanged, skipping push");
                    Ok(PublishOutcome::Unchanged)
                }
                (Some(gs), _) => {
                    let started = Instant::now();
                    let pushed = self.pusher.push(&gs).await;
                    metrics::observe_push_duration(started.elapsed().as_secs_f64());
                    pushed.inspect_err(|_| metrics::increment_push_errors())?;
                    *last = Some(gs.checksum);
                    metrics::increment_pushes();
                    info!(
                        checksum = gs.checksum,
                        members = gs.members.len(),
                        "pushed global service"
                    );
                    Ok(PublishOutcome::Pushed {
                        checksum: gs.checksum,
                    })
                }
                (None, Some(_)) => {
                    self.pusher.delete(name).await.inspect_err(|_| {
                        metrics::increment_push_errors();
                    })?;
                    *last = None;
                    self.release_slot(name, &slot);
                    info!("deleted global service with no members");
                    Ok(PublishOutcome::Deleted)
                }
                (None, None) => {
                    self.release_slot(name, &slot);
                    Ok(PublishOutcome::Nothing)
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::graph::GlobalService;
    use crate::controller::key::ObjectType;
    use crate::controller::store::{ObjectSnapshot, StoreKind};
    use crate::crd::{GslbConfig, GslbConfigSpec, GslbLeader, MemberCluster};
    use async_trait::async_trait;

    #[derive(Debug, Default)]
    struct RecordingPusher {
        pushed: Mutex<Vec<(String, u32)>>,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GslbServicePusher for RecordingPusher {
        async fn push(&self, service: &GlobalService) -> Result<(), PushError> {
            self.pushed
                .lock()
                .unwrap()
                .push((service.name.clone(), service.checksum));
            Ok(())
        }

        async fn delete(&self, name: &str) -> Result<(), PushError> {
            self.deleted.lock().unwrap().push(name.to_string());
            Ok(())
        }
    }

    fn snapshot(ip: &str) -> ObjectSnapshot {
        ObjectSnapshot {
            hostname: "foo.com".to_string(),
            ip_addr: Some(ip.to_string()),
            ..Default::default()
        }
    }

    fn setup(leader: bool) -> (Arc<ObjectStores>, Arc<RecordingPusher>, GraphPublisher) {
        let coordination = Arc::new(CoordinationContext::new());
        coordination
            .install_config(GslbConfig::new(
                "gc-1",
                GslbConfigSpec {
                    gslb_leader: GslbLeader::default(),
                    member_clusters: vec![MemberCluster {
                        cluster_context: "c1".to_string(),
                    }],
                    refresh_interval: None,
                    log_level: "INFO".to_string(),
                },
            ))
            .unwrap();
        coordination.set_leader(leader);

        let stores = Arc::new(ObjectStores::new());
        let pusher = Arc::new(RecordingPusher::default());
        let publisher = GraphPublisher::new(
            Arc::clone(&stores),
            Arc::new(PolicyStore::new()),
            Arc::new(HostRuleTable::new()),
            Arc::clone(&pusher) as Arc<dyn GslbServicePusher>,
            coordination,
        );
        (stores, pusher, publisher)
    }

    #[tokio::test]
    async fn test_unchanged_service_is_pushed_once() {
        let (stores, pusher, publisher) = setup(true);
        stores.add(StoreKind::Accepted, "c1", ObjectType::Service, "ns/a", snapshot("10.0.0.1"));

        let first = publisher.publish("foo.com").await.unwrap();
        assert!(matches!(first, PublishOutcome::Pushed { .. }));
        assert_eq!(
            publisher.publish("foo.com").await.unwrap(),
            PublishOutcome::Unchanged
        );
        assert_eq!(pusher.pushed.lock().unwrap().len(), 1);

        stores.add(StoreKind::Accepted, "c1", ObjectType::Service, "ns/b", snapshot("10.0.0.2"));
        let second = publisher.publish("foo.com").await.unwrap();
        assert!(matches!(second, PublishOutcome::Pushed { .. }));
        assert_ne!(first, second);
        assert_eq!(pusher.pushed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_follower_never_pushes() {
        let (stores, pusher, publisher) = setup(false);
        stores.add(StoreKind::Accepted, "c1", ObjectType::Service, "ns/a", snapshot("10.0.0.1"));
        assert_eq!(
            publisher.publish("foo.com").await.unwrap(),
            PublishOutcome::NotPermitted
        );
        assert!(pusher.pushed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_service_without_members_is_deleted_once() {
        let (stores, pusher, publisher) = setup(true);
        stores.add(StoreKind::Accepted, "c1", ObjectType::Service, "ns/a", snapshot("10.0.0.1"));
        publisher.publish("foo.com").await.unwrap();
        assert!(publisher.last_pushed_checksum("foo.com").await.is_some());

        stores.delete(StoreKind::Accepted, "c1", ObjectType::Service, "ns/a");
        assert_eq!(
            publisher.publish("foo.com").await.unwrap(),
            PublishOutcome::Deleted
        );
        assert_eq!(
            publisher.publish("foo.com").await.unwrap(),
            PublishOutcome::Nothing
        );
        assert_eq!(*pusher.deleted.lock().unwrap(), vec!["foo.com".to_string()]);
        assert!(publisher.last_pushed_checksum("foo.com").await.is_none());
    }

    #[tokio::test]
    async fn test_deleted_and_unknown_services_are_forgotten() {
        let (stores, _pusher, publisher) = setup(true);
        stores.add(StoreKind::Accepted, "c1", ObjectType::Service, "ns/a", snapshot("10.0.0.1"));
        publisher.publish("foo.com").await.unwrap();
        assert_eq!(publisher.service_names(), vec!["foo.com".to_string()]);

        // A name that never had members leaves nothing behind
        assert_eq!(
            publisher.publish("bar.com").await.unwrap(),
            PublishOutcome::Nothing
        );
        assert_eq!(publisher.service_names(), vec!["foo.com".to_string()]);

        stores.delete(StoreKind::Accepted, "c1", ObjectType::Service, "ns/a");
        assert_eq!(
            publisher.publish("foo.com").await.unwrap(),
            PublishOutcome::Deleted
        );
        assert!(publisher.service_names().is_empty());
        assert_eq!(format!("{publisher:?}").matches("services: 0").count(), 1);
    }

    #[tokio::test]
    async fn test_slot_with_waiting_worker_is_kept() {
        let (_stores, _pusher, publisher) = setup(true);
        let waiting = publisher.slot("foo.com");
        assert_eq!(
            publisher.publish("foo.com").await.unwrap(),
            PublishOutcome::Nothing
        );
        assert!(publisher.last_pushed.lock().unwrap().contains_key("foo.com"));

        drop(waiting);
        publisher.publish("foo.com").await.unwrap();
        assert!(!publisher.last_pushed.lock().unwrap().contains_key("foo.com"));
    }
}
