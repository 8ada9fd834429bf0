//! Capture process errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while managing a capture process
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The capture process could not be created (binary missing, permission denied, ...)
    #[error("failed to spawn {} for {pod}: {source}", binary.display())]
    Spawn {
        pod: String,
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The capture process could not be terminated
    #[error("failed to kill capture process for {pod}: {source}")]
    Kill {
        pod: String,
        #[source]
        source: std::io::Error,
    },

    /// A rotated capture file could not be removed
    #[error("failed to remove {}: {source}", path.display())]
    FileCleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid launcher configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
