//! # Status Write-Back
//!
//! Patches the status subresource of GSLBConfig and GlobalDeploymentPolicy
//! objects with a merge patch.

use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use tracing::debug;

use crate::controller::push::StatusPublisher;
use crate::crd::{GlobalDeploymentPolicy, GslbConfig};

const FIELD_MANAGER: &str = "gslb-controller";

#[derive(Clone)]
pub struct KubeStatusPublisher {
    client: Client,
}

impl std::fmt::Debug for KubeStatusPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStatusPublisher").finish_non_exhaustive()
    }
}

impl KubeStatusPublisher {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Record a validation error on a GlobalDeploymentPolicy
    pub async fn publish_gdp_error(&self, name: &str, namespace: &str, error: &str) -> Result<()> {
        let api: Api<GlobalDeploymentPolicy> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "status": { "errorStatus": error } });
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .with_context(|| format!("Failed to patch status of GlobalDeploymentPolicy {namespace}/{name}"))?;
        debug!(gdp = name, namespace, "patched status");
        Ok(())
    }
}

#[async_trait]
impl StatusPublisher for KubeStatusPublisher {
    async fn publish_gslb_state(&self, name: &str, namespace: &str, state: &str) -> Result<()> {
        let api: Api<GslbConfig> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "status": { "state": state } });
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .with_context(|| format!("Failed to patch status of GSLBConfig {namespace}/{name}"))?;
        debug!(gslb_config = name, namespace, "patched status");
        Ok(())
    }
}
