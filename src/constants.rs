//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Maximum number of member clusters a GSLB configuration may list
pub const MAX_CLUSTERS: usize = 10;

/// Namespace where the GSLB configuration and policies live
pub const DEFAULT_GSLB_NAMESPACE: &str = "avi-system";

/// Admin tenant name on the load-balancer controller
pub const ADMIN_TENANT: &str = "admin";

/// Environment variable holding the load-balancer controller IP
pub const CONTROLLER_IP_ENV: &str = "GSLB_CTRL_IPADDRESS";

/// Number of segments in a multi-cluster key for ingress hosts
pub const INGRESS_MULTI_CLUSTER_KEY_LEN: usize = 6;

/// Number of segments in a multi-cluster key for routes and services
pub const MULTI_CLUSTER_KEY_LEN: usize = 5;

/// Failures tolerated on the fast retry queue before a key drops to slow retry
pub const DEFAULT_RETRY_BUDGET: u32 = 5;

/// Delay before a fast retry (seconds)
pub const DEFAULT_FAST_RETRY_DELAY_SECS: u64 = 2;

/// Poll cycle of the slow retry queue (seconds)
pub const DEFAULT_SLOW_RETRY_INTERVAL_SECS: u64 = 120;

/// Worker routines per processing stage
pub const DEFAULT_WORKERS: usize = 8;

/// Bounded wait for worker groups during shutdown (seconds)
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// How often the resync flag is polled (seconds)
pub const DEFAULT_RESYNC_POLL_INTERVAL_SECS: u64 = 30;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default delay before restarting a watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Traffic-split weight bounds accepted by policies and host rules
pub const MIN_TRAFFIC_WEIGHT: u32 = 1;
pub const MAX_TRAFFIC_WEIGHT: u32 = 20;

/// Route status entries are only trusted when written by these routers
pub const AKO_ROUTER_PREFIX: &str = "ako-";

/// Route termination type that needs a TCP monitor
pub const PASSTHROUGH_ROUTE: &str = "passthrough";

/// Log levels accepted in the GSLB configuration
pub const LOG_LEVELS: [&str; 5] = ["ERROR", "WARN", "INFO", "DEBUG", "TRACE"];
