//! # Retry & Work Queues
//!
//! - `queue`: deduplicating work queues and the slow-retry parking queue
//! - `tracker`: per-key failure counting and fast → slow promotion

pub mod queue;
pub mod tracker;

pub use queue::{SlowRetryQueue, WorkQueue};
pub use tracker::{QueueClass, RetryDecision, RetryEntry, RetryPolicy, RetryTracker};
