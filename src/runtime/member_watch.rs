//! # Member Cluster Watches
//!
//! Once the GSLB configuration is installed, every member cluster context it
//! lists gets its own client from the member kubeconfig and watches for
//! Ingresses, Services, Namespaces and (optionally) OpenShift Routes.
//! Changes land in the object source first and are then enqueued as
//! multi-cluster keys. When a watch re-lists, cached objects the new listing
//! no longer contains are deleted.
//!
//! A cluster whose client cannot be built is marked unavailable, so lookups
//! against it fail and are retried instead of being treated as deletions.

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{Namespace, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::controller::coordination::WorkerStage;
use crate::controller::events::{
    ingress_applied, ingress_deleted, namespace_applied, route_applied, route_deleted,
    service_applied, service_deleted, RelistTracker,
};
use crate::controller::key::{MultiClusterKey, ObjectType};
use crate::controller::pipeline::Pipeline;
use crate::controller::translate::Route;
use crate::runtime::watch::{spawn_watch, WatchEvent};
use crate::runtime::RuntimeContext;

fn load_kubeconfig(path: Option<&str>) -> Result<Kubeconfig> {
    match path {
        Some(path) => {
            Kubeconfig::read_from(path).with_context(|| format!("Failed to read kubeconfig {path}"))
        }
        None => Kubeconfig::read().context("Failed to read default kubeconfig"),
    }
}

/// Client bound to one context of the member kubeconfig
pub async fn member_client(kubeconfig: &Kubeconfig, context: &str) -> Result<Client> {
    let options = KubeConfigOptions {
        context: Some(context.to_string()),
        ..Default::default()
    };
    let config = kube::Config::from_custom_kubeconfig(kubeconfig.clone(), &options)
        .await
        .with_context(|| format!("Failed to load kubeconfig context {context}"))?;
    Client::try_from(config).with_context(|| format!("Failed to create client for {context}"))
}

fn enqueue_keys<'a>(pipeline: &Pipeline, keys: impl IntoIterator<Item = &'a MultiClusterKey>) {
    for key in keys {
        pipeline.enqueue_key(key);
    }
}

/// Start member watches after bootstrap
pub fn start_member_watches(ctx: &Arc<RuntimeContext>) {
    let c = Arc::clone(ctx);
    ctx.coordination
        .spawn_after_bootstrap(WorkerStage::Ingestion, async move {
            if let Err(e) = watch_members(&c).await {
                error!(error = %e, "failed to start member cluster watches");
            }
        });
}

async fn watch_members(ctx: &Arc<RuntimeContext>) -> Result<()> {
    let Some(gslb_config) = ctx.coordination.config() else {
        return Ok(());
    };
    let (kubeconfig_path, watch_routes) = {
        let config = ctx.config.read().await;
        (config.kubeconfig.clone(), config.enable_route_watch)
    };
    let kubeconfig = load_kubeconfig(kubeconfig_path.as_deref())?;

    for cluster in gslb_config.spec.cluster_contexts() {
        if !ctx.coordination.add_cluster(&cluster)? {
            continue;
        }
        match member_client(&kubeconfig, &cluster).await {
            Ok(client) => {
                ctx.source.set_cluster_available(&cluster, true);
                start_cluster_watches(ctx, &cluster, &client, watch_routes);
                info!(cluster = %cluster, "member cluster watches started");
            }
            Err(e) => {
                ctx.source.set_cluster_available(&cluster, false);
                error!(cluster = %cluster, error = %e, "member cluster unavailable");
            }
        }
    }
    Ok(())
}

fn start_cluster_watches(ctx: &Arc<RuntimeContext>, cluster: &str, client: &Client, watch_routes: bool) {
    let ingresses: Api<Ingress> = Api::all(client.clone());
    let (c, name) = (Arc::clone(ctx), cluster.to_string());
    let relist = Arc::new(RelistTracker::new(cluster, ObjectType::Ingress));
    spawn_watch(ctx, format!("{cluster}/Ingress"), ingresses, move |event| {
        let (c, name, relist) = (Arc::clone(&c), name.clone(), Arc::clone(&relist));
        async move {
            let keys = match event {
                WatchEvent::Applied(ingress) => {
                    let keys = ingress_applied(&c.source, &name, &ingress);
                    relist.record(&keys);
                    keys
                }
                WatchEvent::Deleted(ingress) => ingress_deleted(&c.source, &name, &ingress),
                WatchEvent::RelistStarted => {
                    relist.begin();
                    Vec::new()
                }
                WatchEvent::RelistDone => relist.finish(&c.source),
            };
            enqueue_keys(&c.pipeline, &keys);
        }
    });

    let services: Api<Service> = Api::all(client.clone());
    let (c, name) = (Arc::clone(ctx), cluster.to_string());
    let relist = Arc::new(RelistTracker::new(cluster, ObjectType::Service));
    spawn_watch(ctx, format!("{cluster}/Service"), services, move |event| {
        let (c, name, relist) = (Arc::clone(&c), name.clone(), Arc::clone(&relist));
        async move {
            let keys: Vec<MultiClusterKey> = match event {
                WatchEvent::Applied(service) => {
                    let keys: Vec<_> = service_applied(&c.source, &name, &service).into_iter().collect();
                    relist.record(&keys);
                    keys
                }
                WatchEvent::Deleted(service) => {
                    service_deleted(&c.source, &name, &service).into_iter().collect()
                }
                WatchEvent::RelistStarted => {
                    relist.begin();
                    Vec::new()
                }
                WatchEvent::RelistDone => relist.finish(&c.source),
            };
            enqueue_keys(&c.pipeline, &keys);
        }
    });

    let namespaces: Api<Namespace> = Api::all(client.clone());
    let (c, name) = (Arc::clone(ctx), cluster.to_string());
    spawn_watch(ctx, format!("{cluster}/Namespace"), namespaces, move |event| {
        let (c, name) = (Arc::clone(&c), name.clone());
        async move {
            if let WatchEvent::Applied(namespace) = event {
                if namespace_applied(&c.source, &name, &namespace) {
                    c.coordination.request_resync();
                }
            }
        }
    });

    if watch_routes {
        let resource =
            ApiResource::from_gvk(&GroupVersionKind::gvk("route.openshift.io", "v1", "Route"));
        let routes: Api<DynamicObject> = Api::all_with(client.clone(), &resource);
        let (c, name) = (Arc::clone(ctx), cluster.to_string());
        let relist = Arc::new(RelistTracker::new(cluster, ObjectType::Route));
        spawn_watch(ctx, format!("{cluster}/Route"), routes, move |event| {
            let (c, name, relist) = (Arc::clone(&c), name.clone(), Arc::clone(&relist));
            async move {
                let (applied, object) = match event {
                    WatchEvent::Applied(object) => (true, object),
                    WatchEvent::Deleted(object) => (false, object),
                    WatchEvent::RelistStarted => {
                        relist.begin();
                        return;
                    }
                    WatchEvent::RelistDone => {
                        enqueue_keys(&c.pipeline, &relist.finish(&c.source));
                        return;
                    }
                };
                let route: Route = match serde_json::to_value(&object).and_then(serde_json::from_value) {
                    Ok(route) => route,
                    Err(e) => {
                        warn!(cluster = %name, error = %e, "failed to decode route");
                        return;
                    }
                };
                if applied {
                    let key = route_applied(&c.source, &name, &route);
                    relist.record([&key]);
                    c.pipeline.enqueue_key(&key);
                } else {
                    enqueue_keys(&c.pipeline, &route_deleted(&c.source, &name, &route));
                }
            }
        });
    }
}
