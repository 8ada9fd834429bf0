//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the pod watcher,
//! the per-pod dispatcher and the capture reconciler together.

use crate::config::ControllerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::registry::CaptureRegistry;
use crate::watcher::PodWatcher;
use kube::Client;
use pcap_capture::TcpdumpLauncher;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How long shutdown waits for queued notifications before stopping captures
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Main controller for pod captures.
#[derive(Debug)]
pub struct Controller {
    reconciler: Arc<Reconciler>,
    dispatcher: Arc<Dispatcher>,
    pod_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts watching pods.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Pod Capture Controller");

        // In-cluster service account first, then ~/.kube/config
        let kube_client = Client::try_default().await?;

        let launcher = TcpdumpLauncher::new(config.tcpdump);
        let reconciler = Arc::new(Reconciler::new(
            Box::new(launcher),
            Arc::new(CaptureRegistry::new()),
            Some(config.node_name.clone()),
        ));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&reconciler)));

        let watcher_instance = PodWatcher::new(kube_client, config.node_name, Arc::clone(&dispatcher));
        let pod_watcher = tokio::spawn(async move { watcher_instance.watch_pods().await });

        Ok(Self {
            reconciler,
            dispatcher,
            pod_watcher,
        })
    }

    /// Runs the controller until the watcher fails or a shutdown signal
    /// arrives, then stops every running capture.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Pod Capture Controller running");

        let result = tokio::select! {
            result = &mut self.pod_watcher => {
                result
                    .map_err(|e| ControllerError::Watch(format!("Pod watcher panicked: {}", e)))
                    .and_then(|r| r)
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received");
                Ok(())
            }
        };

        self.pod_watcher.abort();
        self.stop_all().await;
        result
    }

    async fn stop_all(&self) {
        if tokio::time::timeout(DRAIN_TIMEOUT, self.dispatcher.wait_idle())
            .await
            .is_err()
        {
            warn!("Pending pod notifications not drained after {:?}", DRAIN_TIMEOUT);
        }
        let stopped = self.reconciler.shutdown().await;
        info!("Stopped {} captures", stopped);
    }
}

/// Resolves on Ctrl-C, or on SIGTERM where supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
