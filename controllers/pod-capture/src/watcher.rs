//! Kubernetes pod watcher.
//!
//! Watches the pods scheduled on this node and hands every relevant change to
//! the dispatcher. Watch errors never end the controller: the stream is
//! polled again after a Fibonacci backoff.

use crate::backoff::FibonacciBackoff;
use crate::cache::PodCache;
use crate::dispatcher::Dispatcher;
use crate::error::ControllerError;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use kube_runtime::watcher;
use std::sync::Arc;
use tracing::{info, warn};

/// Watches pods on one node.
#[derive(Debug)]
pub struct PodWatcher {
    api: Api<Pod>,
    node_name: String,
    dispatcher: Arc<Dispatcher>,
}

impl PodWatcher {
    pub fn new(client: Client, node_name: String, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            api: Api::all(client),
            node_name,
            dispatcher,
        }
    }

    /// Watches pods until the stream ends, which only happens on shutdown of
    /// the underlying client.
    pub async fn watch_pods(&self) -> Result<(), ControllerError> {
        info!("Starting Pod watcher for node {}", self.node_name);

        let config = watcher::Config::default().fields(&node_selector(&self.node_name));
        let mut stream = Box::pin(watcher(self.api.clone(), config));
        let mut cache = PodCache::new();
        let mut backoff = FibonacciBackoff::default();

        while let Some(result) = stream.next().await {
            match result {
                Ok(event) => {
                    backoff.reset();
                    if forward_event(&mut cache, &self.dispatcher, event) {
                        info!("Pod cache synced ({} pods), watching for changes", cache.len());
                    }
                }
                Err(e) => {
                    let delay = backoff.next_backoff();
                    warn!("Pod watch error: {} (retrying in {:?})", e, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(ControllerError::Watch("Pod watch stream ended".to_string()))
    }
}

/// Field selector restricting the watch to pods scheduled on `node_name`.
pub fn node_selector(node_name: &str) -> String {
    format!("spec.nodeName={node_name}")
}

/// Applies one event to the cache and dispatches the resulting
/// notifications. Returns `true` when this event completed the initial list.
pub fn forward_event(
    cache: &mut PodCache,
    dispatcher: &Dispatcher,
    event: watcher::Event<Pod>,
) -> bool {
    let was_synced = cache.is_synced();
    for notification in cache.apply_event(event) {
        dispatcher.dispatch(notification);
    }
    !was_synced && cache.is_synced()
}
