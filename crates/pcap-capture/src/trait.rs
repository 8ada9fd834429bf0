//! Launcher and handle traits for mocking
//!
//! Controllers depend on `CaptureLauncherTrait` rather than on
//! `TcpdumpLauncher` directly, so reconciliation logic can be tested with
//! `MockCaptureLauncher` without spawning real processes.

use crate::error::CaptureError;
use crate::models::{CaptureEntry, FileOutcome, PodKey, StopReport};
use tracing::{error, info};

/// Handle to a running capture process, sufficient to terminate it.
#[async_trait::async_trait]
pub trait CaptureHandle: Send + Sync + std::fmt::Debug {
    /// OS process id, if the process is still known to the handle
    fn pid(&self) -> Option<u32>;

    /// Terminates the process and reaps it.
    async fn kill(&mut self) -> Result<(), CaptureError>;
}

/// Process lifecycle operations for packet captures.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait CaptureLauncherTrait: Send + Sync {
    /// Starts a capture for `key` rotating over `count` files.
    ///
    /// Never stops a previous capture for the same pod; callers stop first.
    async fn start(&self, key: &PodKey, count: u32) -> Result<CaptureEntry, CaptureError>;

    /// Kills the capture and removes the files it may have produced.
    ///
    /// A kill failure is recorded in the report and cleanup still runs.
    async fn stop(&self, entry: CaptureEntry) -> StopReport {
        stop_entry(entry).await
    }
}

/// Default stop sequence shared by every launcher.
pub async fn stop_entry(mut entry: CaptureEntry) -> StopReport {
    let kill = entry.handle.kill().await;
    if let Err(e) = &kill {
        error!("{}", e);
    }

    let files = entry.files.remove_all(entry.count).await;
    let found = u32::try_from(files.len()).unwrap_or(u32::MAX);
    let never_written = entry.count.saturating_sub(found);

    info!(
        "Capture stopped for {} ({} files removed, {} never written)",
        entry.key,
        files
            .iter()
            .filter(|f| f.outcome == FileOutcome::Removed)
            .count(),
        never_written
    );

    StopReport {
        key: entry.key,
        kill,
        files,
        never_written,
    }
}
