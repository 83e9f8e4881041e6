//! # Coordination
//!
//! Process-wide state shared by every stage, constructed once at startup and
//! passed around as `Arc<CoordinationContext>`.
//!
//! - the active GSLB configuration, installed once and update-only afterwards
//! - the bootstrap gate, opened by the first installation and never closed
//! - the leader flag; only the leader publishes
//! - the resync flag, a single pending bit
//! - member cluster contexts that have been initialised
//! - one task tracker per worker stage plus a shared cancellation token
//!
//! Waiting on the bootstrap gate has no timeout. Without a configuration there
//! is no policy, and nothing may be admitted or published.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::constants::MAX_CLUSTERS;
use crate::crd::{validate_gslb_config, ConfigValidationError, GslbConfig, GslbConfigStatus};

/// Processing stages that own a worker group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkerStage {
    Ingestion,
    FastRetry,
    SlowRetry,
    Graph,
}

impl WorkerStage {
    pub const ALL: [WorkerStage; 4] = [
        WorkerStage::Ingestion,
        WorkerStage::FastRetry,
        WorkerStage::SlowRetry,
        WorkerStage::Graph,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStage::Ingestion => "ingestion",
            WorkerStage::FastRetry => "fastretry",
            WorkerStage::SlowRetry => "slowretry",
            WorkerStage::Graph => "graph",
        }
    }
}

impl fmt::Display for WorkerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`CoordinationContext::install_config`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigInstall {
    /// First valid configuration; the bootstrap gate opened
    Initial,
    /// Replaced an existing configuration
    Updated,
}

/// How shutdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Completed,
    /// The deadline passed; in-flight work was abandoned
    TimedOut,
}

pub struct CoordinationContext {
    config: RwLock<Option<GslbConfig>>,
    bootstrap: watch::Sender<bool>,
    leader: RwLock<bool>,
    resync: RwLock<bool>,
    clusters: RwLock<BTreeSet<String>>,
    workers: HashMap<WorkerStage, TaskTracker>,
    cancel: CancellationToken,
}

impl fmt::Debug for CoordinationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinationContext")
            .field("bootstrapped", &self.is_bootstrapped())
            .field("leader", &self.is_leader())
            .field("resync_required", &self.is_resync_required())
            .field("clusters", &self.clusters())
            .finish_non_exhaustive()
    }
}

impl Default for CoordinationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinationContext {
    #[must_use]
    pub fn new() -> Self {
        let (bootstrap, _) = watch::channel(false);
        Self {
            config: RwLock::new(None),
            bootstrap,
            leader: RwLock::new(false),
            resync: RwLock::new(false),
            clusters: RwLock::new(BTreeSet::new()),
            workers: WorkerStage::ALL
                .into_iter()
                .map(|stage| (stage, TaskTracker::new()))
                .collect(),
            cancel: CancellationToken::new(),
        }
    }

    // Configuration singleton

    /// Validate and install `config`. The first successful call opens the
    /// bootstrap gate; later calls replace the stored object.
    pub fn install_config(&self, config: GslbConfig) -> Result<ConfigInstall, ConfigValidationError> {
        validate_gslb_config(&config.spec)?;
        let install = {
            let mut current = self.config.write().unwrap_or_else(PoisonError::into_inner);
            let install = if current.is_some() {
                ConfigInstall::Updated
            } else {
                ConfigInstall::Initial
            };
            *current = Some(config);
            install
        };

        if install == ConfigInstall::Initial {
            self.bootstrap.send_replace(true);
            info!("gslb configuration installed, bootstrap complete");
        }
        Ok(install)
    }

    #[must_use]
    pub fn config(&self) -> Option<GslbConfig> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Name and namespace of the active configuration object
    #[must_use]
    pub fn config_name_and_namespace(&self) -> Option<(String, String)> {
        let guard = self.config.read().unwrap_or_else(PoisonError::into_inner);
        let config = guard.as_ref()?;
        Some((
            config.metadata.name.clone().unwrap_or_default(),
            config.metadata.namespace.clone().unwrap_or_default(),
        ))
    }

    /// Record a user-visible state message on the active configuration
    pub fn update_status(&self, state: &str) -> bool {
        let mut guard = self.config.write().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(config) => {
                config.status = Some(GslbConfigStatus {
                    state: Some(state.to_string()),
                });
                true
            }
            None => false,
        }
    }

    // Bootstrap gate

    #[must_use]
    pub fn is_bootstrapped(&self) -> bool {
        *self.bootstrap.borrow()
    }

    /// Block until a configuration has been installed. No timeout.
    pub async fn wait_bootstrapped(&self) {
        let mut rx = self.bootstrap.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        if rx.wait_for(|ready| *ready).await.is_err() {
            warn!("bootstrap gate closed before it opened");
        }
    }

    /// Like [`Self::wait_bootstrapped`] but gives up on shutdown. Returns
    /// whether the gate is open.
    pub async fn wait_bootstrapped_or_cancelled(&self) -> bool {
        tokio::select! {
            () = self.wait_bootstrapped() => true,
            () = self.cancel.cancelled() => false,
        }
    }

    // Leader flag

    #[must_use]
    pub fn is_leader(&self) -> bool {
        *self.leader.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the leader flag. Becoming leader requests a resync so this replica
    /// publishes its warm state.
    pub fn set_leader(&self, leader: bool) {
        let previous = {
            let mut guard = self.leader.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, leader)
        };
        if leader && !previous {
            info!("became leader");
            self.request_resync();
        } else if !leader && previous {
            info!("became follower");
        }
    }

    /// Only the bootstrapped leader may push to the load-balancer controller
    #[must_use]
    pub fn may_publish(&self) -> bool {
        self.is_bootstrapped() && self.is_leader()
    }

    // Resync flag

    pub fn request_resync(&self) {
        *self.resync.write().unwrap_or_else(PoisonError::into_inner) = true;
    }

    #[must_use]
    pub fn is_resync_required(&self) -> bool {
        *self.resync.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the flag; returns whether it was set
    pub fn take_resync(&self) -> bool {
        std::mem::take(&mut *self.resync.write().unwrap_or_else(PoisonError::into_inner))
    }

    // Cluster context registry

    /// Mark a member cluster context as initialised. Returns false if it was
    /// already known.
    pub fn add_cluster(&self, cluster: &str) -> Result<bool, ConfigValidationError> {
        let mut clusters = self.clusters.write().unwrap_or_else(PoisonError::into_inner);
        if clusters.contains(cluster) {
            return Ok(false);
        }
        if clusters.len() >= MAX_CLUSTERS {
            return Err(ConfigValidationError::TooManyClusters {
                found: clusters.len() + 1,
                max: MAX_CLUSTERS,
            });
        }
        clusters.insert(cluster.to_string());
        Ok(true)
    }

    #[must_use]
    pub fn is_cluster_initialized(&self, cluster: &str) -> bool {
        self.clusters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(cluster)
    }

    #[must_use]
    pub fn clusters(&self) -> Vec<String> {
        self.clusters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    // Worker groups and shutdown

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Spawn `task` on the tracker of `stage`
    pub fn spawn<F>(&self, stage: WorkerStage, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.workers.get(&stage) {
            Some(tracker) => {
                tracker.spawn(task);
            }
            None => warn!(stage = %stage, "no tracker for worker stage"),
        }
    }

    /// Spawn `task` on `stage`, started only once the bootstrap gate opens.
    /// Dropped without running if shutdown comes first.
    pub fn spawn_after_bootstrap<F>(self: &Arc<Self>, stage: WorkerStage, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let ctx = Arc::clone(self);
        self.spawn(stage, async move {
            if ctx.wait_bootstrapped_or_cancelled().await {
                task.await;
            }
        });
    }

    /// Tasks still running in `stage`
    #[must_use]
    pub fn running(&self, stage: WorkerStage) -> usize {
        self.workers.get(&stage).map_or(0, TaskTracker::len)
    }

    /// Signal every worker to stop, then wait for all stages up to `timeout`.
    /// Work still in flight at the deadline is abandoned.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownOutcome {
        info!(timeout_secs = timeout.as_secs(), "shutting down worker groups");
        self.cancel.cancel();
        for tracker in self.workers.values() {
            tracker.close();
        }

        let all_done = futures::future::join_all(self.workers.values().map(TaskTracker::wait));
        match tokio::time::timeout(timeout, all_done).await {
            Ok(_) => {
                info!("all worker groups stopped");
                ShutdownOutcome::Completed
            }
            Err(_) => {
                for stage in WorkerStage::ALL {
                    let running = self.running(stage);
                    if running > 0 {
                        warn!(stage = %stage, running, "abandoning in-flight work");
                    }
                }
                ShutdownOutcome::TimedOut
            }
        }
    }
}

/// Administrative tenant reference on the load-balancer controller
#[must_use]
pub fn admin_tenant_ref(controller_ip: &str) -> String {
    format!(
        "https://{controller_ip}/api/tenant/{}",
        crate::constants::ADMIN_TENANT
    )
}
