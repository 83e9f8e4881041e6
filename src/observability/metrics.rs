//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `gslb_keys_ingested_total` - Keys processed by the ingestion workers, by operation and object type
//! - `gslb_key_format_errors_total` - Keys dropped because they could not be decoded
//! - `gslb_admissions_total` - Objects placed in the accepted or rejected store
//! - `gslb_pushes_total` - Global services pushed to the load-balancer controller
//! - `gslb_pushes_skipped_total` - Publications skipped because the checksum did not change
//! - `gslb_push_errors_total` - Failed pushes and deletes
//! - `gslb_push_duration_seconds` - Duration of push operations
//! - `gslb_retries_total` - Retry scheduling decisions, by queue class
//! - `gslb_slow_retry_promotions_total` - Items moved from the fast to the slow retry queue
//! - `gslb_queue_depth` - Items waiting per queue

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGaugeVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static KEYS_INGESTED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gslb_keys_ingested_total",
            "Total number of keys processed by the ingestion workers",
        ),
        &["operation", "object_type"],
    )
    .expect("Failed to create KEYS_INGESTED_TOTAL metric - this should never happen")
});

static KEY_FORMAT_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gslb_key_format_errors_total",
        "Total number of malformed multi-cluster keys",
    )
    .expect("Failed to create KEY_FORMAT_ERRORS_TOTAL metric - this should never happen")
});

static ADMISSIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gslb_admissions_total",
            "Total number of admission decisions by store",
        ),
        &["store"],
    )
    .expect("Failed to create ADMISSIONS_TOTAL metric - this should never happen")
});

static PUSHES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gslb_pushes_total",
        "Total number of global services pushed",
    )
    .expect("Failed to create PUSHES_TOTAL metric - this should never happen")
});

static PUSHES_SKIPPED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gslb_pushes_skipped_total",
        "Total number of publications skipped with an unchanged checksum",
    )
    .expect("Failed to create PUSHES_SKIPPED_TOTAL metric - this should never happen")
});

static PUSH_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gslb_push_errors_total",
        "Total number of failed pushes and deletes",
    )
    .expect("Failed to create PUSH_ERRORS_TOTAL metric - this should never happen")
});

static PUSH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "gslb_push_duration_seconds",
            "Duration of push operations in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
    )
    .expect("Failed to create PUSH_DURATION metric - this should never happen")
});

static RETRIES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gslb_retries_total",
            "Total number of retries scheduled by queue class",
        ),
        &["class"],
    )
    .expect("Failed to create RETRIES_TOTAL metric - this should never happen")
});

static SLOW_RETRY_PROMOTIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gslb_slow_retry_promotions_total",
        "Total number of items promoted to the slow retry queue",
    )
    .expect("Failed to create SLOW_RETRY_PROMOTIONS_TOTAL metric - this should never happen")
});

static QUEUE_DEPTH: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new("gslb_queue_depth", "Items waiting per queue"),
        &["queue"],
    )
    .expect("Failed to create QUEUE_DEPTH metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(KEYS_INGESTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(KEY_FORMAT_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ADMISSIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PUSHES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PUSHES_SKIPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PUSH_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PUSH_DURATION.clone()))?;
    REGISTRY.register(Box::new(RETRIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SLOW_RETRY_PROMOTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;

    Ok(())
}

pub fn increment_ingested(operation: &str, object_type: &str) {
    KEYS_INGESTED_TOTAL
        .with_label_values(&[operation, object_type])
        .inc();
}

pub fn increment_format_errors() {
    KEY_FORMAT_ERRORS_TOTAL.inc();
}

pub fn increment_admissions(store: &str) {
    ADMISSIONS_TOTAL.with_label_values(&[store]).inc();
}

pub fn increment_pushes() {
    PUSHES_TOTAL.inc();
}

pub fn increment_pushes_skipped() {
    PUSHES_SKIPPED_TOTAL.inc();
}

pub fn increment_push_errors() {
    PUSH_ERRORS_TOTAL.inc();
}

pub fn observe_push_duration(duration: f64) {
    PUSH_DURATION.observe(duration);
}

pub fn increment_retries(class: &str) {
    RETRIES_TOTAL.with_label_values(&[class]).inc();
}

pub fn increment_slow_retry_promotions() {
    SLOW_RETRY_PROMOTIONS_TOTAL.inc();
}

pub fn set_queue_depth(queue: &str, depth: usize) {
    let depth = i64::try_from(depth).unwrap_or(i64::MAX);
    QUEUE_DEPTH.with_label_values(&[queue]).set(depth);
}
