//! # Watch Streams
//!
//! Kube watcher streams reduced to applied/deleted events plus the bounds of
//! each (re)listing, run on the coordination trackers so shutdown stops them.

use futures::{pin_mut, Stream, StreamExt};
use kube::Api;
use kube_runtime::{watcher, WatchStreamExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use crate::controller::coordination::WorkerStage;
use crate::runtime::RuntimeContext;

/// Watch event reduced to what the handlers need
#[derive(Debug)]
pub enum WatchEvent<K> {
    Applied(K),
    Deleted(K),
    /// A full listing starts; its objects follow as `Applied`
    RelistStarted,
    /// The listing is complete
    RelistDone,
}

/// Listed objects and live changes both surface as `Applied`
pub fn watch_events<K>(api: Api<K>) -> impl Stream<Item = Result<WatchEvent<K>, watcher::Error>> + Send
where
    K: kube::Resource + Clone + DeserializeOwned + Debug + Send + 'static,
{
    watcher(api, watcher::Config::default())
        .default_backoff()
        .filter_map(|event| async move {
            match event {
                Ok(watcher::Event::Apply(obj) | watcher::Event::InitApply(obj)) => {
                    Some(Ok(WatchEvent::Applied(obj)))
                }
                Ok(watcher::Event::Delete(obj)) => Some(Ok(WatchEvent::Deleted(obj))),
                Ok(watcher::Event::Init) => Some(Ok(WatchEvent::RelistStarted)),
                Ok(watcher::Event::InitDone) => Some(Ok(WatchEvent::RelistDone)),
                Err(e) => Some(Err(e)),
            }
        })
}

/// Run a watch until cancellation. Errors are logged; a stream that ends is
/// restarted after the configured delay.
pub fn spawn_watch<K, F, Fut>(ctx: &Arc<RuntimeContext>, watch: String, api: Api<K>, handler: F)
where
    K: kube::Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    F: Fn(WatchEvent<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    let ctx_for_task = Arc::clone(ctx);
    ctx.coordination.spawn(WorkerStage::Ingestion, async move {
        let cancel = ctx_for_task.coordination.cancellation().clone();
        loop {
            let stream = watch_events(api.clone());
            let cancelled = async {
                pin_mut!(stream);
                info!("watch started");
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => return true,
                        next = stream.next() => match next {
                            Some(Ok(event)) => handler(event).await,
                            Some(Err(e)) => warn!(error = %e, "watch error"),
                            None => return false,
                        }
                    }
                }
            }
            .instrument(tracing::info_span!("controller.watch", watch = %watch))
            .await;
            if cancelled {
                return;
            }

            let delay = ctx_for_task.config.read().await.watch_restart_delay();
            warn!(watch = %watch, delay_secs = delay.as_secs(), "watch stream ended, restarting");
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    });
}
