//! # Custom Resource Definitions
//!
//! Operator input for the GSLB controller, group `amko.vmware.com/v1alpha1`.
//!
//! ## Module Structure
//!
//! - `gslb_config.rs` - GSLBConfig: leader and member clusters
//! - `gdp.rs` - GlobalDeploymentPolicy: admission selectors and traffic split
//! - `host_rule.rs` - GSLBHostRule: per-FQDN overrides
//! - `validation.rs` - input validation

mod gdp;
mod gslb_config;
mod host_rule;
mod validation;

pub use gdp::{
    GlobalDeploymentPolicy, GlobalDeploymentPolicySpec, GlobalDeploymentPolicyStatus,
    LabelSelector, MatchRules, TrafficSplit,
};
pub use gslb_config::{
    default_log_level, GslbConfig, GslbConfigSpec, GslbConfigStatus, GslbLeader, MemberCluster,
};
pub use host_rule::{GslbHostRule, GslbHostRuleSpec, GslbHostRuleStatus, SitePersistence};
pub use validation::{
    is_log_level_valid, validate_gdp, validate_gslb_config, validate_host_rule,
    ConfigValidationError,
};
