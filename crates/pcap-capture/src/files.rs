//! Rotated capture file naming and cleanup.
//!
//! `tcpdump -W <n> -w <base>` writes `base`, `base1`, ... `base<n-1>` in
//! round-robin order, creating each file only once rotation reaches it.
//!
//! Cleanup lists the capture directory once and removes the rotated files
//! that exist, so its cost does not depend on the rotation count.

use crate::error::CaptureError;
use crate::models::{FileCleanup, FileOutcome};
use std::ffi::OsStr;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Output location of one pod's capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFiles {
    directory: PathBuf,
    stem: String,
}

impl CaptureFiles {
    pub fn for_pod(directory: impl Into<PathBuf>, pod_name: &str) -> Self {
        Self {
            directory: directory.into(),
            stem: format!("capture-{pod_name}.pcap"),
        }
    }

    /// Path passed to `tcpdump -w`, also the first rotated file.
    pub fn base_path(&self) -> PathBuf {
        self.directory.join(&self.stem)
    }

    /// Path of the rotated file with the given index.
    pub fn path(&self, index: u32) -> PathBuf {
        if index == 0 {
            self.base_path()
        } else {
            self.directory.join(format!("{}{}", self.stem, index))
        }
    }

    /// The `count` paths a capture with that rotation count can produce.
    pub fn paths(&self, count: u32) -> impl Iterator<Item = PathBuf> + '_ {
        (0..count).map(|i| self.path(i))
    }

    /// Rotation index of `file_name` if it is one of this capture's files.
    pub fn rotation_index(&self, file_name: &OsStr) -> Option<u32> {
        let suffix = file_name.to_str()?.strip_prefix(self.stem.as_str())?;
        if suffix.is_empty() {
            return Some(0);
        }
        // tcpdump never zero-pads the suffix
        if suffix.starts_with('0') || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        suffix.parse().ok()
    }

    /// Removes every rotated file with an index below `count` that exists.
    ///
    /// Returns one entry per file found; files rotation never reached are
    /// not listed. Nothing here fails the caller.
    pub async fn remove_all(&self, count: u32) -> Vec<FileCleanup> {
        let found = match self.rotated_files(count).await {
            Ok(found) => found,
            Err(e) => {
                warn!("{}", e);
                return vec![FileCleanup {
                    path: self.directory.clone(),
                    outcome: FileOutcome::Failed(e.to_string()),
                }];
            }
        };

        let mut results = Vec::with_capacity(found.len());
        for path in found {
            let outcome = match remove_file(&path).await {
                Ok(()) => {
                    info!("Deleted capture file {}", path.display());
                    FileOutcome::Removed
                }
                Err(CaptureError::FileCleanup { source, .. })
                    if source.kind() == ErrorKind::NotFound =>
                {
                    debug!("Capture file {} vanished before removal", path.display());
                    FileOutcome::Missing
                }
                Err(e) => {
                    warn!("{}", e);
                    FileOutcome::Failed(e.to_string())
                }
            };
            results.push(FileCleanup { path, outcome });
        }
        results
    }

    /// Existing rotated files with an index below `count`, in rotation order.
    async fn rotated_files(&self, count: u32) -> Result<Vec<PathBuf>, CaptureError> {
        let listing_error = |source: io::Error| CaptureError::FileCleanup {
            path: self.directory.clone(),
            source,
        };

        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Capture directory {} does not exist", self.directory.display());
                return Ok(Vec::new());
            }
            Err(source) => return Err(listing_error(source)),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(listing_error)? {
            if let Some(index) = self
                .rotation_index(&entry.file_name())
                .filter(|index| *index < count)
            {
                found.push((index, entry.path()));
            }
        }
        found.sort_unstable_by_key(|(index, _)| *index);
        Ok(found.into_iter().map(|(_, path)| path).collect())
    }
}

async fn remove_file(path: &Path) -> Result<(), CaptureError> {
    tokio::fs::remove_file(path)
        .await
        .map_err(|source| CaptureError::FileCleanup {
            path: path.to_path_buf(),
            source,
        })
}
