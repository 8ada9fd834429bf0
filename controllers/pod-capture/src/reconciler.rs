//! Reconciliation logic for pod captures.
//!
//! This module turns add/update/delete notifications into capture start,
//! stop and restart decisions. Every decision for a pod is taken while
//! holding that pod's registry slot, and the side effect (spawn, or kill
//! plus cleanup) runs before the slot is released.
//!
//! | prior request      | new request         | action                   |
//! |--------------------|---------------------|--------------------------|
//! | absent / unknown   | `Active(n)`         | start `n`                |
//! | `Active(n)`        | absent              | stop                     |
//! | `Active(a)`        | `Active(b)`, a != b | stop, then start `b`     |
//! | `Active(n)`        | `Active(n)`         | nothing                  |
//! | any                | invalid             | log, keep current state  |
//! | pod deleted        |                     | stop                     |

use crate::annotation::CaptureRequest;
use crate::event::{Notification, PodSnapshot};
use crate::registry::{CaptureRegistry, SlotGuard};
use pcap_capture::{CaptureInfo, CaptureLauncherTrait, PodKey, StopReport};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a notification did to a pod's capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A capture with this rotation count was started
    Started(u32),
    /// A start was requested but a capture with this count is already tracked
    AlreadyRunning(u32),
    /// The capture process could not be spawned; the pod has no capture
    StartFailed,
    Stopped,
    /// A stop was requested but no capture is tracked
    NotRunning,
    Restarted { from: u32, to: u32 },
    /// The old capture was stopped but its replacement failed to spawn
    RestartFailed { from: u32 },
    Unchanged,
    /// The new annotation value is invalid; nothing was touched
    Rejected,
    /// The pod is not scheduled on this node
    Skipped,
}

/// Reconciles pod captures.
pub struct Reconciler {
    launcher: Box<dyn CaptureLauncherTrait>,
    registry: Arc<CaptureRegistry>,
    node_name: Option<String>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("registry", &self.registry)
            .field("node_name", &self.node_name)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler.
    ///
    /// With a `node_name`, notifications for pods scheduled on another node
    /// are skipped.
    pub fn new(
        launcher: Box<dyn CaptureLauncherTrait>,
        registry: Arc<CaptureRegistry>,
        node_name: Option<String>,
    ) -> Self {
        Self {
            launcher,
            registry,
            node_name,
        }
    }

    pub fn registry(&self) -> &CaptureRegistry {
        &self.registry
    }

    /// Currently tracked capture for `key`.
    pub async fn capture(&self, key: &PodKey) -> Option<CaptureInfo> {
        self.registry.get(key).await
    }

    /// Applies one notification.
    pub async fn handle(&self, notification: &Notification) -> Transition {
        if !self.is_local(notification.current()) {
            debug!(
                "Ignoring {} scheduled on {:?}",
                notification.key(),
                notification.current().node_name
            );
            return Transition::Skipped;
        }

        match notification {
            Notification::Add { pod } => self.on_add(pod).await,
            Notification::Update { old, new } => self.on_update(old, new).await,
            Notification::Delete { pod } => self.on_delete(pod).await,
        }
    }

    /// A pod appeared. The prior request is absent, so an active annotation
    /// starts a capture unless one is already tracked (duplicate add during
    /// a relist).
    pub async fn on_add(&self, pod: &PodSnapshot) -> Transition {
        match CaptureRequest::from(pod) {
            CaptureRequest::Absent => Transition::Unchanged,
            CaptureRequest::Invalid(e) => {
                warn!("{}: {}", pod.key, e);
                Transition::Rejected
            }
            CaptureRequest::Active(n) => {
                info!("Capture requested for {} N={}", pod.key, n);
                self.start_capture(&pod.key, n).await
            }
        }
    }

    /// A pod changed. Old and new requests are derived independently; an
    /// invalid new value never clears a running capture.
    pub async fn on_update(&self, old: &PodSnapshot, new: &PodSnapshot) -> Transition {
        let key = &new.key;
        let desired = CaptureRequest::from(new);

        if let CaptureRequest::Invalid(e) = &desired {
            match self.capture(key).await {
                Some(current) => warn!("{}: {} (keeping capture N={})", key, e, current.count),
                None => warn!("{}: {}", key, e),
            }
            return Transition::Rejected;
        }

        match (CaptureRequest::from(old), desired) {
            (CaptureRequest::Absent, CaptureRequest::Active(n)) => {
                info!("Capture start for {} N={}", key, n);
                self.start_capture(key, n).await
            }
            // Prior state unknown: converge on the tracked entry instead of
            // assuming nothing runs.
            (CaptureRequest::Invalid(_), CaptureRequest::Active(n)) => {
                info!("Capture start for {} N={}", key, n);
                self.converge_capture(key, n).await
            }
            (CaptureRequest::Active(_) | CaptureRequest::Invalid(_), CaptureRequest::Absent) => {
                info!("Capture stop for {}", key);
                self.stop_capture(key).await
            }
            (CaptureRequest::Active(from), CaptureRequest::Active(to)) if from != to => {
                info!("Capture update for {} N={} -> N={}", key, from, to);
                self.converge_capture(key, to).await
            }
            _ => Transition::Unchanged,
        }
    }

    /// A pod was deleted: stop whatever is tracked for it.
    pub async fn on_delete(&self, pod: &PodSnapshot) -> Transition {
        info!("Pod deleted: {}", pod.key);
        self.stop_capture(&pod.key).await
    }

    /// Stops every tracked capture. Used on controller shutdown.
    pub async fn shutdown(&self) -> usize {
        let keys = self.registry.keys().await;
        info!("Stopping {} running captures", keys.len());
        let mut stopped = 0;
        for key in keys {
            if self.stop_capture(&key).await == Transition::Stopped {
                stopped += 1;
            }
        }
        stopped
    }

    async fn start_capture(&self, key: &PodKey, count: u32) -> Transition {
        let mut slot = self.registry.lock(key).await;

        if let Some(current) = slot.get() {
            info!("Capture already running for {} (N={})", key, current.count);
            return Transition::AlreadyRunning(current.count);
        }

        if self.spawn_into(&mut slot, count).await {
            Transition::Started(count)
        } else {
            Transition::StartFailed
        }
    }

    async fn stop_capture(&self, key: &PodKey) -> Transition {
        let mut slot = self.registry.lock(key).await;
        match self.kill_and_clean(&mut slot).await {
            Some(_) => Transition::Stopped,
            None => {
                info!("No running capture for {}", key);
                Transition::NotRunning
            }
        }
    }

    /// Drives the tracked capture to `count` files: start if none runs,
    /// nothing if it already matches, stop and start otherwise.
    async fn converge_capture(&self, key: &PodKey, count: u32) -> Transition {
        let mut slot = self.registry.lock(key).await;

        let from = match slot.get() {
            None => {
                return if self.spawn_into(&mut slot, count).await {
                    Transition::Started(count)
                } else {
                    Transition::StartFailed
                };
            }
            Some(current) if current.count == count => {
                debug!("Capture for {} already at N={}", key, count);
                return Transition::AlreadyRunning(count);
            }
            Some(current) => current.count,
        };

        self.kill_and_clean(&mut slot).await;
        if self.spawn_into(&mut slot, count).await {
            Transition::Restarted { from, to: count }
        } else {
            Transition::RestartFailed { from }
        }
    }

    /// Spawns a capture into a vacant slot. Spawn failures are logged and
    /// leave the slot vacant.
    async fn spawn_into(&self, slot: &mut SlotGuard<'_>, count: u32) -> bool {
        let key = slot.key().clone();
        match self.launcher.start(&key, count).await {
            Ok(entry) => {
                if let Err(rejected) = slot.try_insert(entry) {
                    // callers check the slot first
                    error!("Capture for {} was tracked concurrently, stopping the new one", key);
                    self.launcher.stop(rejected).await;
                    return false;
                }
                true
            }
            Err(e) => {
                error!("Failed to start capture for {}: {}", key, e);
                false
            }
        }
    }

    async fn kill_and_clean(&self, slot: &mut SlotGuard<'_>) -> Option<StopReport> {
        let entry = slot.remove()?;
        let report = self.launcher.stop(entry).await;
        if let Err(e) = &report.kill {
            error!("Capture process for {} did not stop cleanly: {}", report.key, e);
        }
        Some(report)
    }

    fn is_local(&self, pod: &PodSnapshot) -> bool {
        match (&self.node_name, &pod.node_name) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => true,
        }
    }
}

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod reconciler_test;
