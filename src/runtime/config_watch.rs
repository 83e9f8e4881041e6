//! # Configuration Watch
//!
//! Watches GSLBConfig, GlobalDeploymentPolicy and GSLBHostRule objects in the
//! GSLB namespace.
//!
//! - The first valid GSLBConfig opens the bootstrap gate; invalid ones are
//!   reported and never installed.
//! - Policy and host-rule watches start only after the gate has opened.
//! - A valid policy replaces the current one and requests a resync. Deleting
//!   it leaves no policy, so nothing is accepted until a new one arrives.
//! - Host rules update the host-rule table and schedule a rebuild of the
//!   global service they name.

use kube::{Api, ResourceExt};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::controller::coordination::{ConfigInstall, CoordinationContext, WorkerStage};
use crate::controller::pipeline::Pipeline;
use crate::controller::policy::{GdpPolicy, HostRuleTable, PolicyStore};
use crate::controller::push::StatusPublisher;
use crate::crd::{
    validate_gdp, validate_host_rule, ConfigValidationError, GlobalDeploymentPolicy, GslbConfig,
    GslbHostRule,
};
use crate::runtime::status::KubeStatusPublisher;
use crate::runtime::watch::{spawn_watch, WatchEvent};
use crate::runtime::RuntimeContext;

/// Install or update the GSLB configuration
pub fn apply_gslb_config(
    coordination: &CoordinationContext,
    config: GslbConfig,
) -> Result<ConfigInstall, ConfigValidationError> {
    let name = config.name_any();
    let install = coordination.install_config(config)?;
    match install {
        ConfigInstall::Initial => info!(gslb_config = %name, "installed gslb configuration"),
        ConfigInstall::Updated => info!(gslb_config = %name, "updated gslb configuration"),
    }
    Ok(install)
}

/// Replace the admission policy and request a re-evaluation of every object
pub fn apply_gdp(
    policy: &PolicyStore,
    coordination: &CoordinationContext,
    gdp: &GlobalDeploymentPolicy,
) -> Result<(), ConfigValidationError> {
    validate_gdp(&gdp.spec)?;
    policy.replace(Some(Arc::new(GdpPolicy::from_spec(&gdp.spec))));
    coordination.request_resync();
    info!(gdp = %gdp.name_any(), "global deployment policy applied");
    Ok(())
}

pub fn delete_gdp(policy: &PolicyStore, coordination: &CoordinationContext, gdp: &GlobalDeploymentPolicy) {
    policy.replace(None);
    coordination.request_resync();
    warn!(gdp = %gdp.name_any(), "global deployment policy deleted");
}

/// Returns the FQDNs whose global services need a rebuild
pub fn apply_host_rule(
    host_rules: &HostRuleTable,
    rule: &GslbHostRule,
) -> Result<Vec<String>, ConfigValidationError> {
    validate_host_rule(&rule.spec)?;
    let fqdn = rule.spec.fqdn.clone();
    host_rules.upsert(rule.spec.clone());
    info!(host_rule = %rule.name_any(), fqdn = %fqdn, "host rule applied");
    Ok(vec![fqdn])
}

pub fn delete_host_rule(host_rules: &HostRuleTable, rule: &GslbHostRule) -> Vec<String> {
    host_rules
        .remove(&rule.spec.fqdn)
        .map(|removed| vec![removed.fqdn])
        .unwrap_or_default()
}

fn enqueue_all(pipeline: &Pipeline, names: &[String]) {
    for name in names {
        pipeline.enqueue_service(name);
    }
}

/// Start the three configuration watches on the coordination trackers
pub async fn start_config_watches(ctx: &Arc<RuntimeContext>) {
    let (namespace, publish_gslb_status, publish_gdp_status) = {
        let config = ctx.config.read().await;
        (
            config.gslb_namespace.clone(),
            config.publish_gslb_status,
            config.publish_gdp_status,
        )
    };
    let status = KubeStatusPublisher::new(ctx.client.clone());

    let configs: Api<GslbConfig> = Api::namespaced(ctx.client.clone(), &namespace);
    let c = Arc::clone(ctx);
    let s = status.clone();
    spawn_watch(ctx, "GSLBConfig".to_string(), configs, move |event| {
        let c = Arc::clone(&c);
        let s = s.clone();
        async move {
            if let WatchEvent::Applied(config) = event {
                let (name, ns) = (config.name_any(), config.namespace().unwrap_or_default());
                if let Err(e) = apply_gslb_config(&c.coordination, config) {
                    error!(gslb_config = %name, error = %e, "invalid gslb configuration");
                    if publish_gslb_status {
                        if let Err(e) = s.publish_gslb_state(&name, &ns, &e.to_string()).await {
                            warn!(error = %e, "failed to publish gslb config status");
                        }
                    }
                }
            }
        }
    });

    // Policy and host rules only matter once a configuration is installed
    let c = Arc::clone(ctx);
    let ns = namespace.clone();
    ctx.coordination
        .spawn_after_bootstrap(WorkerStage::Ingestion, async move {
            start_policy_watches(&c, &ns, status, publish_gdp_status);
        });

    info!(namespace = %namespace, "configuration watches started");
}

fn start_policy_watches(
    ctx: &Arc<RuntimeContext>,
    namespace: &str,
    status: KubeStatusPublisher,
    publish_gdp_status: bool,
) {
    let gdps: Api<GlobalDeploymentPolicy> = Api::namespaced(ctx.client.clone(), namespace);
    let c = Arc::clone(ctx);
    spawn_watch(ctx, "GlobalDeploymentPolicy".to_string(), gdps, move |event| {
        let c = Arc::clone(&c);
        let s = status.clone();
        async move {
            match event {
                WatchEvent::Applied(gdp) => {
                    if let Err(e) = apply_gdp(&c.policy, &c.coordination, &gdp) {
                        error!(gdp = %gdp.name_any(), error = %e, "invalid global deployment policy");
                        if publish_gdp_status {
                            let ns = gdp.namespace().unwrap_or_default();
                            if let Err(e) = s.publish_gdp_error(&gdp.name_any(), &ns, &e.to_string()).await {
                                warn!(error = %e, "failed to publish gdp status");
                            }
                        }
                    }
                }
                WatchEvent::Deleted(gdp) => delete_gdp(&c.policy, &c.coordination, &gdp),
                WatchEvent::RelistStarted | WatchEvent::RelistDone => {}
            }
        }
    });

    let rules: Api<GslbHostRule> = Api::namespaced(ctx.client.clone(), namespace);
    let c = Arc::clone(ctx);
    spawn_watch(ctx, "GSLBHostRule".to_string(), rules, move |event| {
        let c = Arc::clone(&c);
        async move {
            match event {
                WatchEvent::Applied(rule) => match apply_host_rule(&c.host_rules, &rule) {
                    Ok(names) => enqueue_all(&c.pipeline, &names),
                    Err(e) => error!(host_rule = %rule.name_any(), error = %e, "invalid host rule"),
                },
                WatchEvent::Deleted(rule) => {
                    enqueue_all(&c.pipeline, &delete_host_rule(&c.host_rules, &rule));
                }
                WatchEvent::RelistStarted | WatchEvent::RelistDone => {}
            }
        }
    });

    info!(namespace = %namespace, "policy watches started");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        GlobalDeploymentPolicySpec, GslbConfigSpec, GslbHostRuleSpec, GslbLeader, MatchRules,
        MemberCluster, TrafficSplit,
    };

    fn gslb_config(clusters: &[&str]) -> GslbConfig {
        GslbConfig::new(
            "gc-1",
            GslbConfigSpec {
                gslb_leader: GslbLeader::default(),
                member_clusters: clusters
                    .iter()
                    .map(|c| MemberCluster {
                        cluster_context: (*c).to_string(),
                    })
                    .collect(),
                refresh_interval: None,
                log_level: "INFO".to_string(),
            },
        )
    }

    #[test]
    fn test_invalid_config_keeps_gate_closed() {
        let coordination = CoordinationContext::new();
        assert!(apply_gslb_config(&coordination, gslb_config(&[])).is_err());
        assert!(!coordination.is_bootstrapped());

        assert_eq!(
            apply_gslb_config(&coordination, gslb_config(&["c1"])).unwrap(),
            ConfigInstall::Initial
        );
        assert!(coordination.is_bootstrapped());
        assert_eq!(
            apply_gslb_config(&coordination, gslb_config(&["c1", "c2"])).unwrap(),
            ConfigInstall::Updated
        );
    }

    #[test]
    fn test_gdp_apply_and_delete_request_resync() {
        let coordination = CoordinationContext::new();
        let policy = PolicyStore::new();
        let gdp = GlobalDeploymentPolicy::new(
            "gdp-1",
            GlobalDeploymentPolicySpec {
                match_rules: MatchRules::default(),
                match_clusters: vec!["c1".to_string()],
                traffic_split: vec![TrafficSplit {
                    cluster: "c1".to_string(),
                    weight: 5,
                }],
            },
        );
        apply_gdp(&policy, &coordination, &gdp).unwrap();
        assert!(policy.current().is_some());
        assert!(coordination.take_resync());

        delete_gdp(&policy, &coordination, &gdp);
        assert!(policy.current().is_none());
        assert!(coordination.take_resync());
    }

    #[test]
    fn test_invalid_gdp_is_not_installed() {
        let coordination = CoordinationContext::new();
        let policy = PolicyStore::new();
        let gdp = GlobalDeploymentPolicy::new(
            "gdp-1",
            GlobalDeploymentPolicySpec {
                traffic_split: vec![TrafficSplit {
                    cluster: "c1".to_string(),
                    weight: 50,
                }],
                ..Default::default()
            },
        );
        assert!(apply_gdp(&policy, &coordination, &gdp).is_err());
        assert!(policy.current().is_none());
        assert!(!coordination.is_resync_required());
    }

    #[test]
    fn test_host_rule_apply_and_delete() {
        let table = HostRuleTable::new();
        let rule = GslbHostRule::new(
            "ghr-1",
            GslbHostRuleSpec {
                fqdn: "foo.com".to_string(),
                ttl: Some(30),
                ..Default::default()
            },
        );
        assert_eq!(apply_host_rule(&table, &rule).unwrap(), vec!["foo.com".to_string()]);
        assert_eq!(table.get("foo.com").and_then(|r| r.ttl), Some(30));
        assert_eq!(delete_host_rule(&table, &rule), vec!["foo.com".to_string()]);
        assert!(delete_host_rule(&table, &rule).is_empty());

        let empty = GslbHostRule::new("ghr-2", GslbHostRuleSpec::default());
        assert!(apply_host_rule(&table, &empty).is_err());
    }
}
