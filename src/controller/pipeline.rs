//! # Pipeline
//!
//! Wires the queues to their worker groups:
//!
//! ```text
//! watchers ─▶ ingestion queue ─▶ ingestion workers ─▶ stores
//!                                        │
//!                                        ▼
//!                                   graph queue ─▶ graph workers ─▶ pusher
//!
//! failures ─▶ fast retry (short delay) ─▶ … budget exceeded ─▶ slow retry (poll cycle)
//! ```
//!
//! Every worker waits on the bootstrap gate before taking work and stops
//! taking work once the coordination context is cancelled. An item being
//! processed when shutdown starts is finished, not interrupted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn, Instrument};

use crate::constants::{DEFAULT_RESYNC_POLL_INTERVAL_SECS, DEFAULT_WORKERS};
use crate::controller::coordination::{CoordinationContext, ShutdownOutcome, WorkerStage};
use crate::controller::ingestion::Ingestor;
use crate::controller::key::MultiClusterKey;
use crate::controller::publish::GraphPublisher;
use crate::controller::push::StatusPublisher;
use crate::controller::retry::{
    RetryDecision, RetryEntry, RetryPolicy, RetryTracker, SlowRetryQueue, WorkQueue,
};
use crate::observability::metrics;

/// Something that can fail and be retried
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WorkItem {
    /// A raw multi-cluster key
    Ingest(String),
    /// A global service name
    Publish(String),
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItem::Ingest(key) => f.write_str(key),
            WorkItem::Publish(name) => write!(f, "GS/{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Workers per stage
    pub workers: usize,
    pub retry: RetryPolicy,
    pub resync_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            retry: RetryPolicy::default(),
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_POLL_INTERVAL_SECS),
        }
    }
}

pub struct Pipeline {
    coordination: Arc<CoordinationContext>,
    ingestor: Ingestor,
    publisher: GraphPublisher,
    ingestion: Arc<WorkQueue<String>>,
    graph: Arc<WorkQueue<String>>,
    fast_retry: Arc<WorkQueue<WorkItem>>,
    slow_retry: SlowRetryQueue<WorkItem>,
    retries: RetryTracker,
    settings: PipelineSettings,
    status: Option<Arc<dyn StatusPublisher>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("ingestion", &self.ingestion)
            .field("graph", &self.graph)
            .field("fast_retry", &self.fast_retry)
            .field("slow_retry", &self.slow_retry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new(
        coordination: Arc<CoordinationContext>,
        ingestor: Ingestor,
        publisher: GraphPublisher,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            coordination,
            ingestor,
            publisher,
            ingestion: Arc::new(WorkQueue::new("ingestion")),
            graph: Arc::new(WorkQueue::new("graph")),
            fast_retry: Arc::new(WorkQueue::new("fastretry")),
            slow_retry: SlowRetryQueue::new("slowretry"),
            retries: RetryTracker::new(settings.retry),
            settings,
            status: None,
        }
    }

    #[must_use]
    pub fn with_status_publisher(mut self, status: Arc<dyn StatusPublisher>) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn coordination(&self) -> &Arc<CoordinationContext> {
        &self.coordination
    }

    #[must_use]
    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    #[must_use]
    pub fn publisher(&self) -> &GraphPublisher {
        &self.publisher
    }

    #[must_use]
    pub fn retry_entry(&self, item: &WorkItem) -> Option<RetryEntry> {
        self.retries.get(&item.to_string())
    }

    #[must_use]
    pub fn slow_retry(&self) -> &SlowRetryQueue<WorkItem> {
        &self.slow_retry
    }

    #[must_use]
    pub fn fast_retry(&self) -> &Arc<WorkQueue<WorkItem>> {
        &self.fast_retry
    }

    // Producers

    pub fn enqueue_key(&self, key: &MultiClusterKey) -> bool {
        self.ingestion.add(key.encode())
    }

    pub fn enqueue_raw(&self, raw: &str) -> bool {
        self.ingestion.add(raw.to_string())
    }

    pub fn enqueue_service(&self, name: &str) -> bool {
        self.graph.add(name.to_string())
    }

    // Processing

    /// Ingest one raw key and schedule rebuilds of the affected services
    pub async fn process_ingestion(&self, raw: &str) {
        let span = tracing::info_span!("gslb.ingestion.process", key = raw);
        async {
            match self.ingestor.process_key(raw) {
                Ok(outcome) => {
                    self.retries.record_success(raw);
                    for name in outcome.affected() {
                        self.enqueue_service(&name);
                    }
                }
                Err(e) if e.is_retryable() => {
                    self.on_failure(WorkItem::Ingest(raw.to_string()), &e.to_string())
                        .await;
                }
                Err(e) => debug!(error = %e, "dropped"),
            }
        }
        .instrument(span)
        .await;
    }

    /// Publish one global service
    pub async fn process_publish(&self, name: &str) {
        let item = WorkItem::Publish(name.to_string());
        match self.publisher.publish(name).await {
            Ok(_) => {
                self.retries.record_success(&item.to_string());
            }
            Err(e) if e.is_permanent() => {
                self.retries.record_success(&item.to_string());
                error!(gs = name, error = %e, "giving up on global service");
                self.report_failure(&format!("failed to publish {name}: {e}"))
                    .await;
            }
            Err(e) => self.on_failure(item, &e.to_string()).await,
        }
    }

    pub async fn process_item(&self, item: WorkItem) {
        match item {
            WorkItem::Ingest(raw) => self.process_ingestion(&raw).await,
            WorkItem::Publish(name) => self.process_publish(&name).await,
        }
    }

    async fn on_failure(&self, item: WorkItem, reason: &str) {
        let decision = self.retries.record_failure(&item.to_string());
        metrics::increment_retries(decision.class().as_str());
        match decision {
            RetryDecision::Fast { attempt, delay } => {
                debug!(item = %item, attempt, reason, "fast retry");
                self.fast_retry.add_after(item, delay);
            }
            RetryDecision::PromotedToSlow { attempt } => {
                metrics::increment_slow_retry_promotions();
                let state = format!("{item} failed {attempt} times, last error: {reason}");
                self.slow_retry.park(item);
                self.report_failure(&state).await;
            }
            RetryDecision::Slow { attempt } => {
                debug!(item = %item, attempt, reason, "slow retry");
                self.slow_retry.park(item);
            }
        }
    }

    /// Surface a persistent failure on the GSLBConfig status
    async fn report_failure(&self, state: &str) {
        self.coordination.update_status(state);
        let Some(status) = self.status.as_ref() else {
            return;
        };
        let Some((name, namespace)) = self.coordination.config_name_and_namespace() else {
            return;
        };
        if let Err(e) = status.publish_gslb_state(&name, &namespace, state).await {
            warn!(error = %e, "failed to publish gslb config status");
        }
    }

    /// Run a resync pass if one was requested. Returns the number of services
    /// scheduled for a rebuild.
    pub fn run_resync(&self) -> usize {
        if !self.coordination.take_resync() {
            return 0;
        }
        let mut names = self.publisher.service_names();
        names.extend(self.ingestor.reevaluate_all());
        names.sort();
        names.dedup();
        let scheduled = names.iter().filter(|n| self.enqueue_service(n)).count();
        info!(services = names.len(), scheduled, "resync pass");
        scheduled
    }

    fn record_queue_depths(&self) {
        metrics::set_queue_depth(self.ingestion.name(), self.ingestion.len());
        metrics::set_queue_depth(self.graph.name(), self.graph.len());
        metrics::set_queue_depth(self.fast_retry.name(), self.fast_retry.len());
        metrics::set_queue_depth(
            self.slow_retry.queue().name(),
            self.slow_retry.queue().len() + self.slow_retry.parked_len(),
        );
    }

    // Worker groups

    /// Spawn every worker group on its coordination tracker
    pub fn start(self: &Arc<Self>) {
        let workers = self.settings.workers.max(1);
        for _ in 0..workers {
            let p = Arc::clone(self);
            self.coordination
                .spawn(WorkerStage::Ingestion, async move { p.ingestion_worker().await });
            let p = Arc::clone(self);
            self.coordination
                .spawn(WorkerStage::Graph, async move { p.graph_worker().await });
            let p = Arc::clone(self);
            self.coordination
                .spawn(WorkerStage::FastRetry, async move { p.fast_retry_worker().await });
            let p = Arc::clone(self);
            self.coordination
                .spawn(WorkerStage::SlowRetry, async move { p.slow_retry_worker().await });
        }
        let p = Arc::clone(self);
        self.coordination
            .spawn(WorkerStage::SlowRetry, async move { p.slow_retry_poller().await });
        let p = Arc::clone(self);
        self.coordination
            .spawn(WorkerStage::Graph, async move { p.resync_loop().await });
        info!(workers, "pipeline started");
    }

    async fn ingestion_worker(self: Arc<Self>) {
        let cancel = self.coordination.cancellation().clone();
        if !self.coordination.wait_bootstrapped_or_cancelled().await {
            return;
        }
        while let Some(raw) = self.ingestion.next(&cancel).await {
            self.process_ingestion(&raw).await;
        }
    }

    async fn graph_worker(self: Arc<Self>) {
        let cancel = self.coordination.cancellation().clone();
        if !self.coordination.wait_bootstrapped_or_cancelled().await {
            return;
        }
        while let Some(name) = self.graph.next(&cancel).await {
            self.process_publish(&name).await;
        }
    }

    async fn fast_retry_worker(self: Arc<Self>) {
        let cancel = self.coordination.cancellation().clone();
        if !self.coordination.wait_bootstrapped_or_cancelled().await {
            return;
        }
        while let Some(item) = self.fast_retry.next(&cancel).await {
            self.process_item(item).await;
        }
    }

    async fn slow_retry_worker(self: Arc<Self>) {
        let cancel = self.coordination.cancellation().clone();
        if !self.coordination.wait_bootstrapped_or_cancelled().await {
            return;
        }
        let queue = Arc::clone(self.slow_retry.queue());
        while let Some(item) = queue.next(&cancel).await {
            self.process_item(item).await;
        }
    }

    /// Release parked slow-retry items once per poll cycle
    async fn slow_retry_poller(self: Arc<Self>) {
        let cancel = self.coordination.cancellation().clone();
        let mut ticker = tokio::time::interval(self.settings.retry.slow_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    let released = self.slow_retry.release();
                    if released > 0 {
                        info!(released, "slow retry poll");
                    }
                    self.record_queue_depths();
                }
            }
        }
    }

    async fn resync_loop(self: Arc<Self>) {
        let cancel = self.coordination.cancellation().clone();
        if !self.coordination.wait_bootstrapped_or_cancelled().await {
            return;
        }
        let mut ticker = tokio::time::interval(self.settings.resync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    self.run_resync();
                    self.record_queue_depths();
                }
            }
        }
    }

    /// Stop the queues and wait for all worker groups up to `timeout`
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownOutcome {
        self.ingestion.shut_down();
        self.graph.shut_down();
        self.fast_retry.shut_down();
        self.slow_retry.queue().shut_down();
        self.coordination.shutdown(timeout).await
    }
}
