//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, Kubernetes client setup and pipeline assembly.

use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{create_shared_config, ControllerConfig};
use crate::controller::coordination::CoordinationContext;
use crate::controller::ingestion::{InMemoryObjectSource, Ingestor, ObjectSource};
use crate::controller::pipeline::Pipeline;
use crate::controller::policy::{HostRuleTable, PolicyStore};
use crate::controller::publish::GraphPublisher;
use crate::controller::push::{GslbServicePusher, LogOnlyPusher};
use crate::controller::store::ObjectStores;
use crate::crd::is_log_level_valid;
use crate::observability;
use crate::runtime::status::KubeStatusPublisher;
use crate::runtime::RuntimeContext;
use crate::server::{start_server, ServerState};

/// Initialization result containing all necessary components for the controller
#[derive(Debug)]
pub struct InitializationResult {
    pub context: Arc<RuntimeContext>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

fn default_filter(log_level: &str) -> String {
    let level = if is_log_level_valid(log_level) {
        log_level.to_lowercase()
    } else {
        "info".to_string()
    };
    format!("gslb_controller={level}")
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Stores, policy, publisher and pipeline assembly
pub async fn initialize(config: ControllerConfig) -> Result<InitializationResult> {
    // Configure rustls crypto provider FIRST, before any other operations
    // We use ring as the crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install rustls crypto provider: {e:?}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(&config.log_level).into()),
        )
        .init();

    if !is_log_level_valid(&config.log_level) {
        warn!(log_level = %config.log_level, "unknown log level, using INFO");
    }

    info!("Starting GSLB Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    if let Some(tenant) = config.admin_tenant_ref() {
        info!(tenant = %tenant, "load-balancer controller admin tenant");
    }

    // Initialize metrics
    observability::metrics::register_metrics()?;

    let coordination = Arc::new(CoordinationContext::new());
    coordination.set_leader(config.is_leader);

    // Start HTTP server for metrics and probes
    let server_state = Arc::new(ServerState {
        coordination: Arc::clone(&coordination),
    });
    let server_port = config.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!(error = %e, "HTTP server error");
        }
    });

    // Create Kubernetes client
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let stores = Arc::new(ObjectStores::new());
    let source = Arc::new(InMemoryObjectSource::new());
    let policy = Arc::new(PolicyStore::new());
    let host_rules = Arc::new(HostRuleTable::new());
    let pusher: Arc<dyn GslbServicePusher> = Arc::new(LogOnlyPusher);

    let ingestor = Ingestor::new(
        Arc::clone(&stores),
        Arc::clone(&source) as Arc<dyn ObjectSource>,
        Arc::clone(&policy),
    );
    let publisher = GraphPublisher::new(
        stores,
        Arc::clone(&policy),
        Arc::clone(&host_rules),
        pusher,
        Arc::clone(&coordination),
    );
    let mut pipeline = Pipeline::new(
        Arc::clone(&coordination),
        ingestor,
        publisher,
        config.pipeline_settings(),
    );
    if config.publish_gslb_status {
        pipeline = pipeline.with_status_publisher(Arc::new(KubeStatusPublisher::new(client.clone())));
    }

    let context = Arc::new(RuntimeContext {
        client,
        config: create_shared_config(config),
        coordination,
        pipeline: Arc::new(pipeline),
        source,
        policy,
        host_rules,
    });

    info!("Controller initialized, waiting for GSLB configuration...");

    Ok(InitializationResult {
        context,
        server_state,
    })
}
