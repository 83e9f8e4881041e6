//! # GSLB Controller
//!
//! A multi-cluster Kubernetes controller that turns Ingresses, Routes and
//! `LoadBalancer` Services from member clusters into global load-balancing
//! services on a load-balancer controller.
//!
//! ## Overview
//!
//! 1. **Bootstrap** - waits for a valid `GSLBConfig` in the GSLB namespace
//! 2. **Member watches** - watches every member cluster listed in the configuration
//! 3. **Ingestion** - admits objects into the accepted or rejected store per policy
//! 4. **Graph build** - synthesises one global service per hostname and pushes it when it changed
//! 5. **Retry** - failed work goes through a fast retry queue, then a slow one

use anyhow::Result;
use clap::Parser;
use gslb_controller::config::ControllerConfig;
use gslb_controller::controller::coordination::ShutdownOutcome;
use gslb_controller::runtime::config_watch::start_config_watches;
use gslb_controller::runtime::initialization::initialize;
use gslb_controller::runtime::member_watch::start_member_watches;
use tracing::{info, warn};

/// Multi-cluster GSLB controller
#[derive(Debug, Parser)]
#[command(name = "gslb-controller", version, about, long_about = None)]
struct Args {
    /// Namespace holding the GSLB custom resources
    #[arg(long, env = "GSLB_NAMESPACE")]
    gslb_namespace: Option<String>,

    /// Kubeconfig with one context per member cluster
    #[arg(long, env = "GSLB_KUBECONFIG")]
    kubeconfig: Option<String>,

    /// Port for /metrics, /healthz and /readyz
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Run as follower: ingest and build, but never push
    #[arg(long)]
    follower: bool,
}

impl Args {
    fn apply(self, mut config: ControllerConfig) -> ControllerConfig {
        if let Some(namespace) = self.gslb_namespace {
            config.gslb_namespace = namespace;
        }
        if self.kubeconfig.is_some() {
            config.kubeconfig = self.kubeconfig;
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if self.follower {
            config.is_leader = false;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().apply(ControllerConfig::from_env());
    let shutdown_timeout = config.shutdown_timeout();

    let init = initialize(config).await?;
    let ctx = init.context;

    ctx.pipeline.start();
    start_config_watches(&ctx).await;
    start_member_watches(&ctx);

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, stopping workers...");

    match ctx.pipeline.shutdown(shutdown_timeout).await {
        ShutdownOutcome::Completed => info!("Controller stopped"),
        ShutdownOutcome::TimedOut => warn!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Controller stopped with work still in flight"
        ),
    }
    Ok(())
}
