//! Controller-specific error types.
//!
//! This module defines error types specific to the Pod Capture Controller
//! that are not covered by upstream library errors.

use kube::Error as KubeError;
use pcap_capture::CaptureError;
use thiserror::Error;

/// Errors that can occur in the Pod Capture Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Capture process error
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
