//! # Retry Tracker
//!
//! Per-key failure accounting. A key is retried on the fast queue until its
//! retry count exceeds the budget, then it moves to the slow queue for good.
//! The count is kept after promotion for observability.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::{
    DEFAULT_FAST_RETRY_DELAY_SECS, DEFAULT_RETRY_BUDGET, DEFAULT_SLOW_RETRY_INTERVAL_SECS,
};

/// Retry tier of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueClass {
    FastRetry,
    SlowRetry,
}

impl QueueClass {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueClass::FastRetry => "FastRetry",
            QueueClass::SlowRetry => "SlowRetry",
        }
    }
}

impl fmt::Display for QueueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Budget and delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub budget: u32,
    pub fast_delay: Duration,
    pub slow_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            budget: DEFAULT_RETRY_BUDGET,
            fast_delay: Duration::from_secs(DEFAULT_FAST_RETRY_DELAY_SECS),
            slow_interval: Duration::from_secs(DEFAULT_SLOW_RETRY_INTERVAL_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEntry {
    pub key: String,
    pub retry_count: u32,
    pub class: QueueClass,
}

/// What to do with a key after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue on the fast queue after `delay`
    Fast { attempt: u32, delay: Duration },
    /// Budget exceeded by this failure; park on the slow queue
    PromotedToSlow { attempt: u32 },
    /// Already on the slow queue; park again
    Slow { attempt: u32 },
}

impl RetryDecision {
    #[must_use]
    pub fn class(&self) -> QueueClass {
        match self {
            RetryDecision::Fast { .. } => QueueClass::FastRetry,
            RetryDecision::PromotedToSlow { .. } | RetryDecision::Slow { .. } => {
                QueueClass::SlowRetry
            }
        }
    }
}

#[derive(Debug)]
pub struct RetryTracker {
    policy: RetryPolicy,
    entries: Mutex<HashMap<String, RetryEntry>>,
}

impl RetryTracker {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Count one more failure for `key` and decide where it goes next
    pub fn record_failure(&self, key: &str) -> RetryDecision {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(key.to_string()).or_insert_with(|| RetryEntry {
            key: key.to_string(),
            retry_count: 0,
            class: QueueClass::FastRetry,
        });
        entry.retry_count += 1;
        let attempt = entry.retry_count;

        match entry.class {
            QueueClass::SlowRetry => RetryDecision::Slow { attempt },
            QueueClass::FastRetry if attempt > self.policy.budget => {
                entry.class = QueueClass::SlowRetry;
                warn!(
                    key,
                    attempt,
                    budget = self.policy.budget,
                    "retry budget exceeded, moving key to slow retry"
                );
                RetryDecision::PromotedToSlow { attempt }
            }
            QueueClass::FastRetry => {
                debug!(key, attempt, "scheduling fast retry");
                RetryDecision::Fast {
                    attempt,
                    delay: self.policy.fast_delay,
                }
            }
        }
    }

    /// Forget `key` after it was processed successfully
    pub fn record_success(&self, key: &str) -> Option<RetryEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<RetryEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    #[must_use]
    pub fn count_in(&self, class: QueueClass) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| e.class == class)
            .count()
    }
}
