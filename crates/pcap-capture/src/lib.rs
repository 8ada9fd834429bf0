//! Packet Capture Process Management
//!
//! Starts, stops and cleans up the `tcpdump` processes that capture traffic
//! for individual pods.
//!
//! # Example
//!
//! ```no_run
//! use pcap_capture::{CaptureLauncherTrait, PodKey, TcpdumpConfig, TcpdumpLauncher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let launcher = TcpdumpLauncher::new(TcpdumpConfig::default());
//!
//! // Writes /captures/capture-web-0.pcap, .pcap1 and .pcap2 in rotation
//! let entry = launcher.start(&PodKey::new("default", "web-0"), 3).await?;
//!
//! // Kills tcpdump and removes whichever of the three files exist
//! let report = launcher.stop(entry).await;
//! println!("removed {} files", report.removed_count());
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Deterministic naming**: rotated files are always `capture-<pod>.pcap`,
//!   `capture-<pod>.pcap1`, ... `capture-<pod>.pcap<n-1>`
//! - **Best-effort cleanup**: a stop always attempts every rotated file and
//!   never fails because a file was never written
//! - **Mockable**: `CaptureLauncherTrait` lets controllers run against
//!   `MockCaptureLauncher` (feature `test-util`)

pub mod error;
pub mod files;
pub mod launcher;
pub mod models;
#[path = "trait.rs"]
pub mod launcher_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use error::CaptureError;
pub use files::CaptureFiles;
pub use launcher::{TcpdumpConfig, TcpdumpLauncher};
pub use launcher_trait::{CaptureHandle, CaptureLauncherTrait};
pub use models::*;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockCaptureLauncher;
