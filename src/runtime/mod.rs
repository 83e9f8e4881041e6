//! # Runtime
//!
//! Process wiring around the controller core.
//!
//! - `initialization`: rustls, tracing, metrics, probe server and pipeline setup
//! - `config_watch`: GSLBConfig, GlobalDeploymentPolicy and GSLBHostRule watches
//! - `member_watch`: Ingress, Service, Route and Namespace watches per member cluster
//! - `status`: status write-back through the API server
//! - `watch`: restartable kube watch streams bound to the coordination context

pub mod config_watch;
pub mod initialization;
pub mod member_watch;
pub mod status;
pub mod watch;

use kube::Client;
use std::sync::Arc;

use crate::config::SharedControllerConfig;
use crate::controller::coordination::CoordinationContext;
use crate::controller::ingestion::InMemoryObjectSource;
use crate::controller::pipeline::Pipeline;
use crate::controller::policy::{HostRuleTable, PolicyStore};

/// Everything the watches need to feed the pipeline
pub struct RuntimeContext {
    pub client: Client,
    pub config: SharedControllerConfig,
    pub coordination: Arc<CoordinationContext>,
    pub pipeline: Arc<Pipeline>,
    pub source: Arc<InMemoryObjectSource>,
    pub policy: Arc<PolicyStore>,
    pub host_rules: Arc<HostRuleTable>,
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("coordination", &self.coordination)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
