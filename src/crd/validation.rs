//! # Validation
//!
//! Checks operator input before it is allowed to influence the engine. An
//! invalid GSLBConfig is never installed, so the bootstrap gate stays closed.

use std::collections::HashSet;
use thiserror::Error;

use crate::constants::{LOG_LEVELS, MAX_CLUSTERS, MAX_TRAFFIC_WEIGHT, MIN_TRAFFIC_WEIGHT};
use crate::crd::{GlobalDeploymentPolicySpec, GslbConfigSpec, GslbHostRuleSpec, TrafficSplit};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error("no member clusters specified")]
    NoMemberClusters,
    #[error("{found} member clusters specified, at most {max} are supported")]
    TooManyClusters { found: usize, max: usize },
    #[error("empty cluster context")]
    EmptyClusterContext,
    #[error("duplicate cluster context '{0}'")]
    DuplicateClusterContext(String),
    #[error("invalid log level '{0}', expected one of ERROR, WARN, INFO, DEBUG, TRACE")]
    InvalidLogLevel(String),
    #[error("traffic split weight {weight} for cluster '{cluster}' is outside 1..=20")]
    WeightOutOfRange { cluster: String, weight: u32 },
    #[error("negative ttl {0}")]
    NegativeTtl(i64),
    #[error("empty fqdn")]
    EmptyFqdn,
}

#[must_use]
pub fn is_log_level_valid(level: &str) -> bool {
    LOG_LEVELS.contains(&level)
}

pub fn validate_gslb_config(spec: &GslbConfigSpec) -> Result<(), ConfigValidationError> {
    if spec.member_clusters.is_empty() {
        return Err(ConfigValidationError::NoMemberClusters);
    }
    if spec.member_clusters.len() > MAX_CLUSTERS {
        return Err(ConfigValidationError::TooManyClusters {
            found: spec.member_clusters.len(),
            max: MAX_CLUSTERS,
        });
    }

    let mut seen = HashSet::new();
    for member in &spec.member_clusters {
        let ctx = member.cluster_context.trim();
        if ctx.is_empty() {
            return Err(ConfigValidationError::EmptyClusterContext);
        }
        if !seen.insert(ctx) {
            return Err(ConfigValidationError::DuplicateClusterContext(ctx.to_string()));
        }
    }

    if !is_log_level_valid(&spec.log_level) {
        return Err(ConfigValidationError::InvalidLogLevel(spec.log_level.clone()));
    }
    Ok(())
}

fn validate_traffic_split(split: &[TrafficSplit]) -> Result<(), ConfigValidationError> {
    for ts in split {
        if !(MIN_TRAFFIC_WEIGHT..=MAX_TRAFFIC_WEIGHT).contains(&ts.weight) {
            return Err(ConfigValidationError::WeightOutOfRange {
                cluster: ts.cluster.clone(),
                weight: ts.weight,
            });
        }
    }
    Ok(())
}

pub fn validate_gdp(spec: &GlobalDeploymentPolicySpec) -> Result<(), ConfigValidationError> {
    if spec.match_clusters.iter().any(|c| c.trim().is_empty()) {
        return Err(ConfigValidationError::EmptyClusterContext);
    }
    validate_traffic_split(&spec.traffic_split)
}

pub fn validate_host_rule(spec: &GslbHostRuleSpec) -> Result<(), ConfigValidationError> {
    if spec.fqdn.trim().is_empty() {
        return Err(ConfigValidationError::EmptyFqdn);
    }
    if let Some(ttl) = spec.ttl.filter(|t| *t < 0) {
        return Err(ConfigValidationError::NegativeTtl(ttl));
    }
    validate_traffic_split(&spec.traffic_split)
}
