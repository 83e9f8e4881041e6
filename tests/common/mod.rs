//! Common test utilities for pipeline integration tests
//!
//! Builds a fully wired pipeline with in-memory collaborators: an object
//! source filled by the test, a policy accepting the given clusters, and a
//! pusher that records what it receives.

#![allow(dead_code, reason = "Each test binary uses a different subset of helpers")]

use async_trait::async_trait;
use gslb_controller::controller::graph::GlobalService;
use gslb_controller::controller::retry::RetryPolicy;
use gslb_controller::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Pusher that records every push and delete; fails the first `failures` pushes
#[derive(Debug, Default)]
pub struct RecordingPusher {
    pub pushed: Mutex<Vec<GlobalService>>,
    pub deleted: Mutex<Vec<String>>,
    failures: AtomicUsize,
    pub attempts: AtomicUsize,
}

impl RecordingPusher {
    pub fn failing(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            ..Default::default()
        }
    }

    pub fn pushes_for(&self, name: &str) -> Vec<GlobalService> {
        self.pushed
            .lock()
            .unwrap()
            .iter()
            .filter(|gs| gs.name == name)
            .cloned()
            .collect()
    }

    pub fn last_push(&self, name: &str) -> Option<GlobalService> {
        self.pushes_for(name).pop()
    }
}

#[async_trait]
impl GslbServicePusher for RecordingPusher {
    async fn push(&self, service: &GlobalService) -> Result<(), PushError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(PushError::Transient("load-balancer controller unavailable".to_string()));
        }
        self.pushed.lock().unwrap().push(service.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), PushError> {
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

pub fn gslb_config(clusters: &[&str]) -> GslbConfig {
    let mut config = GslbConfig::new(
        "gc-1",
        GslbConfigSpec {
            gslb_leader: GslbLeader::default(),
            member_clusters: clusters
                .iter()
                .map(|c| MemberCluster {
                    cluster_context: (*c).to_string(),
                })
                .collect(),
            refresh_interval: None,
            log_level: "INFO".to_string(),
        },
    );
    config.metadata.namespace = Some("avi-system".to_string());
    config
}

pub fn accept_clusters(clusters: &[&str]) -> Arc<dyn PolicyEvaluator> {
    Arc::new(GdpPolicy::from_spec(&GlobalDeploymentPolicySpec {
        match_clusters: clusters.iter().map(|c| (*c).to_string()).collect(),
        ..Default::default()
    }))
}

pub fn lb_snapshot(hostname: &str, ip: &str) -> ObjectSnapshot {
    ObjectSnapshot {
        hostname: hostname.to_string(),
        ip_addr: Some(ip.to_string()),
        protocol: Some("TCP".to_string()),
        port: Some(443),
        ..Default::default()
    }
    .with_checksum()
}

pub struct Harness {
    pub coordination: Arc<CoordinationContext>,
    pub source: Arc<InMemoryObjectSource>,
    pub stores: Arc<ObjectStores>,
    pub policy: Arc<PolicyStore>,
    pub host_rules: Arc<HostRuleTable>,
    pub pusher: Arc<RecordingPusher>,
    pub pipeline: Arc<Pipeline>,
}

pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        workers: 2,
        retry: RetryPolicy {
            budget: 2,
            fast_delay: Duration::from_millis(10),
            slow_interval: Duration::from_millis(100),
        },
        resync_interval: Duration::from_millis(20),
    }
}

impl Harness {
    pub fn new(pusher: RecordingPusher, settings: PipelineSettings) -> Self {
        let coordination = Arc::new(CoordinationContext::new());
        let source = Arc::new(InMemoryObjectSource::new());
        let stores = Arc::new(ObjectStores::new());
        let policy = Arc::new(PolicyStore::new());
        let host_rules = Arc::new(HostRuleTable::new());
        let pusher = Arc::new(pusher);

        let ingestor = Ingestor::new(
            Arc::clone(&stores),
            Arc::clone(&source) as Arc<dyn ObjectSource>,
            Arc::clone(&policy),
        );
        let publisher = GraphPublisher::new(
            Arc::clone(&stores),
            Arc::clone(&policy),
            Arc::clone(&host_rules),
            Arc::clone(&pusher) as Arc<dyn GslbServicePusher>,
            Arc::clone(&coordination),
        );
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&coordination),
            ingestor,
            publisher,
            settings,
        ));
        Self {
            coordination,
            source,
            stores,
            policy,
            host_rules,
            pusher,
            pipeline,
        }
    }

    /// Leader with a valid configuration for `clusters`, accepting all of them
    pub fn bootstrapped(pusher: RecordingPusher, clusters: &[&str]) -> Self {
        let harness = Self::new(pusher, fast_settings());
        harness.coordination.set_leader(true);
        harness.policy.replace(Some(accept_clusters(clusters)));
        harness
            .coordination
            .install_config(gslb_config(clusters))
            .unwrap();
        // Drop the resync raised by leadership so tests start from a quiet pipeline
        harness.coordination.take_resync();
        harness
    }

    /// Put a service into the source and enqueue its key
    pub fn add_service(&self, cluster: &str, name: &str, snapshot: ObjectSnapshot) {
        let object = ObjectRef::service(cluster, "shop", name);
        let operation = if self.source.contains(&object) {
            Operation::Update
        } else {
            Operation::Add
        };
        self.source.upsert(object.clone(), snapshot);
        self.pipeline
            .enqueue_key(&MultiClusterKey::new(operation, object));
    }

    pub fn delete_service(&self, cluster: &str, name: &str) {
        let object = ObjectRef::service(cluster, "shop", name);
        self.source.remove(&object);
        self.pipeline
            .enqueue_key(&MultiClusterKey::new(Operation::Delete, object));
    }
}

/// Poll `condition` every few milliseconds until it holds or five seconds pass
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
