//! # Push Interfaces
//!
//! Narrow seams to the outside world: the load-balancer controller that
//! receives global services, and the API server that receives status.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;
use tracing::info;

use crate::controller::graph::GlobalService;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    /// Retried through the fast/slow retry queues
    #[error("transient push failure: {0}")]
    Transient(String),
    /// Not retried; surfaced on the GSLBConfig status
    #[error("permanent push failure: {0}")]
    Permanent(String),
}

impl PushError {
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, PushError::Permanent(_))
    }
}

/// Writes global services to the load-balancer controller
#[async_trait]
pub trait GslbServicePusher: Send + Sync + Debug {
    /// Create or update `service`
    async fn push(&self, service: &GlobalService) -> Result<(), PushError>;

    /// Remove a previously pushed service
    async fn delete(&self, name: &str) -> Result<(), PushError>;
}

/// Pusher that only logs what it would send; used when no REST client is wired in
#[derive(Debug, Default)]
pub struct LogOnlyPusher;

#[async_trait]
impl GslbServicePusher for LogOnlyPusher {
    async fn push(&self, service: &GlobalService) -> Result<(), PushError> {
        let body = serde_json::to_string(service)
            .map_err(|e| PushError::Permanent(format!("failed to encode {}: {e}", service.name)))?;
        info!(gs = %service.name, checksum = service.checksum, body = %body, "push global service");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), PushError> {
        info!(gs = name, "delete global service");
        Ok(())
    }
}

/// Publishes the GSLBConfig `status.state` message
#[async_trait]
pub trait StatusPublisher: Send + Sync + Debug {
    async fn publish_gslb_state(&self, name: &str, namespace: &str, state: &str) -> Result<()>;
}
