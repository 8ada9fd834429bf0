//! Capture data models

use crate::error::CaptureError;
use crate::files::CaptureFiles;
use crate::launcher_trait::CaptureHandle;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

/// Stable identity of a pod: `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PodKey {
    pub namespace: String,
    pub name: String,
}

impl PodKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A running capture, owned by whoever tracks it.
///
/// Only a successful [`CaptureLauncherTrait::start`](crate::CaptureLauncherTrait::start)
/// creates one, and [`CaptureLauncherTrait::stop`](crate::CaptureLauncherTrait::stop)
/// consumes it.
#[derive(Debug)]
pub struct CaptureEntry {
    pub key: PodKey,
    /// Rotation file count the process was started with
    pub count: u32,
    pub files: CaptureFiles,
    pub handle: Box<dyn CaptureHandle>,
    pub started_at: DateTime<Utc>,
}

impl CaptureEntry {
    /// Read-only view of this entry.
    pub fn info(&self) -> CaptureInfo {
        CaptureInfo {
            key: self.key.clone(),
            count: self.count,
            pid: self.handle.pid(),
            output: self.files.base_path(),
            started_at: self.started_at,
        }
    }
}

/// Cloneable snapshot of a [`CaptureEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureInfo {
    pub key: PodKey,
    pub count: u32,
    pub pid: Option<u32>,
    pub output: PathBuf,
    pub started_at: DateTime<Utc>,
}

/// Result of removing one rotated capture file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Removed,
    /// The file was never written (rotation never reached it) or is already gone
    Missing,
    Failed(String),
}

/// Cleanup attempt for one rotated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCleanup {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// What happened while stopping a capture.
///
/// The kill outcome and the per-file outcomes are kept apart; none of them
/// prevents the capture from being considered stopped.
#[derive(Debug)]
pub struct StopReport {
    pub key: PodKey,
    pub kill: Result<(), CaptureError>,
    /// Rotated files that existed when cleanup ran
    pub files: Vec<FileCleanup>,
    /// Rotated file names rotation never reached
    pub never_written: u32,
}

impl StopReport {
    pub fn killed(&self) -> bool {
        self.kill.is_ok()
    }

    /// Number of files that were actually deleted.
    pub fn removed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.outcome == FileOutcome::Removed)
            .count()
    }

    /// Every existing path cleanup was attempted on, in rotation order.
    pub fn attempted(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}
