//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

use crate::controller::coordination::admin_tenant_ref;
use crate::controller::pipeline::PipelineSettings;
use crate::controller::retry::RetryPolicy;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Worker routines per processing stage
    pub workers: usize,
    /// Failures tolerated on the fast retry queue before a key moves to slow retry
    pub retry_budget: u32,
    /// Delay before a fast retry (seconds)
    pub fast_retry_delay_secs: u64,
    /// Poll cycle of the slow retry queue (seconds)
    pub slow_retry_interval_secs: u64,
    /// Bounded wait for worker groups on shutdown (seconds)
    pub shutdown_timeout_secs: u64,
    /// How often the resync flag is polled (seconds)
    pub resync_poll_interval_secs: u64,
    /// Watch stream restart delay after errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Namespace holding GSLBConfig, GlobalDeploymentPolicy and GSLBHostRule objects
    pub gslb_namespace: String,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Port of the metrics and probe server
    pub metrics_port: u16,
    /// Write the GSLBConfig status back to the API server
    pub publish_gslb_status: bool,
    /// Write the GlobalDeploymentPolicy status back to the API server
    pub publish_gdp_status: bool,
    /// IP of the load-balancer controller
    pub controller_ip: Option<String>,
    /// Kubeconfig holding one context per member cluster
    pub kubeconfig: Option<String>,
    /// Whether this replica may push to the load-balancer controller
    pub is_leader: bool,
    /// Watch OpenShift routes in member clusters
    pub enable_route_watch: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            workers: DEFAULT_WORKERS,
            retry_budget: DEFAULT_RETRY_BUDGET,
            fast_retry_delay_secs: DEFAULT_FAST_RETRY_DELAY_SECS,
            slow_retry_interval_secs: DEFAULT_SLOW_RETRY_INTERVAL_SECS,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            resync_poll_interval_secs: DEFAULT_RESYNC_POLL_INTERVAL_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            gslb_namespace: DEFAULT_GSLB_NAMESPACE.to_string(),
            log_level: "INFO".to_string(),
            metrics_port: DEFAULT_METRICS_PORT,
            publish_gslb_status: true,
            publish_gdp_status: true,
            controller_ip: None,
            kubeconfig: None,
            is_leader: true,
            enable_route_watch: false,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            workers: env_var_or_default("INGESTION_WORKERS", DEFAULT_WORKERS),
            retry_budget: env_var_or_default("RETRY_BUDGET", DEFAULT_RETRY_BUDGET),
            fast_retry_delay_secs: env_var_or_default(
                "FAST_RETRY_DELAY_SECS",
                DEFAULT_FAST_RETRY_DELAY_SECS,
            ),
            slow_retry_interval_secs: env_var_or_default(
                "SLOW_RETRY_INTERVAL_SECS",
                DEFAULT_SLOW_RETRY_INTERVAL_SECS,
            ),
            shutdown_timeout_secs: env_var_or_default(
                "SHUTDOWN_TIMEOUT_SECS",
                DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            ),
            resync_poll_interval_secs: env_var_or_default(
                "RESYNC_POLL_INTERVAL_SECS",
                DEFAULT_RESYNC_POLL_INTERVAL_SECS,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            gslb_namespace: env_var_or_default_str("GSLB_NAMESPACE", DEFAULT_GSLB_NAMESPACE),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            publish_gslb_status: env_var_or_default_bool("PUBLISH_GSLB_STATUS", true),
            publish_gdp_status: env_var_or_default_bool("PUBLISH_GDP_STATUS", true),
            controller_ip: env_var_opt(CONTROLLER_IP_ENV),
            kubeconfig: env_var_opt("GSLB_KUBECONFIG"),
            is_leader: env_var_or_default_bool("GSLB_LEADER", true),
            enable_route_watch: env_var_or_default_bool("ENABLE_ROUTE_WATCH", false),
        }
    }

    /// Get fast retry delay duration
    #[must_use]
    pub fn fast_retry_delay(&self) -> Duration {
        Duration::from_secs(self.fast_retry_delay_secs)
    }

    /// Get slow retry poll interval duration
    #[must_use]
    pub fn slow_retry_interval(&self) -> Duration {
        Duration::from_secs(self.slow_retry_interval_secs)
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    #[must_use]
    pub fn resync_poll_interval(&self) -> Duration {
        Duration::from_secs(self.resync_poll_interval_secs)
    }

    /// Get watch restart delay duration
    #[must_use]
    pub fn watch_restart_delay(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            budget: self.retry_budget,
            fast_delay: self.fast_retry_delay(),
            slow_interval: self.slow_retry_interval(),
        }
    }

    #[must_use]
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            workers: self.workers.max(1),
            retry: self.retry_policy(),
            resync_interval: self.resync_poll_interval(),
        }
    }

    /// Admin tenant reference on the load-balancer controller, when its IP is known
    #[must_use]
    pub fn admin_tenant_ref(&self) -> Option<String> {
        self.controller_ip.as_deref().map(admin_tenant_ref)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
