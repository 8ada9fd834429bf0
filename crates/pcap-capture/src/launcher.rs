//! tcpdump launcher.
//!
//! Spawns one detached `tcpdump` per pod, rotating its output over a fixed
//! number of files of a fixed size.

use crate::error::CaptureError;
use crate::files::CaptureFiles;
use crate::launcher_trait::{CaptureHandle, CaptureLauncherTrait};
use crate::models::{CaptureEntry, PodKey};
use chrono::Utc;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Default directory capture files are written to.
pub const DEFAULT_CAPTURE_DIR: &str = "/captures";

/// Default capture binary, resolved through `PATH`.
pub const DEFAULT_TCPDUMP_BIN: &str = "tcpdump";

/// Default `tcpdump -C` rotation threshold.
pub const DEFAULT_ROTATE_SIZE: &str = "1M";

/// How captures are invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpdumpConfig {
    pub binary: PathBuf,
    pub output_dir: PathBuf,
    /// Value for `tcpdump -C`
    pub rotate_size: String,
}

impl Default for TcpdumpConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_TCPDUMP_BIN),
            output_dir: PathBuf::from(DEFAULT_CAPTURE_DIR),
            rotate_size: DEFAULT_ROTATE_SIZE.to_string(),
        }
    }
}

impl TcpdumpConfig {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.binary.as_os_str().is_empty() {
            return Err(CaptureError::InvalidConfig(
                "capture binary must not be empty".to_string(),
            ));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(CaptureError::InvalidConfig(
                "capture directory must not be empty".to_string(),
            ));
        }
        if self.rotate_size.trim().is_empty() {
            return Err(CaptureError::InvalidConfig(
                "rotation size must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Arguments for a capture rotating over `count` files.
    ///
    /// The output path is passed through as-is, so non-UTF-8 capture
    /// directories reach tcpdump unchanged.
    pub fn args(&self, files: &CaptureFiles, count: u32) -> Vec<OsString> {
        vec![
            "-C".into(),
            self.rotate_size.clone().into(),
            "-W".into(),
            count.to_string().into(),
            "-w".into(),
            files.base_path().into_os_string(),
        ]
    }
}

/// Launches real `tcpdump` processes.
#[derive(Debug, Clone)]
pub struct TcpdumpLauncher {
    config: TcpdumpConfig,
}

impl TcpdumpLauncher {
    pub fn new(config: TcpdumpConfig) -> Self {
        Self { config }
    }

    pub fn files_for(&self, key: &PodKey) -> CaptureFiles {
        CaptureFiles::for_pod(&self.config.output_dir, &key.name)
    }
}

#[async_trait::async_trait]
impl CaptureLauncherTrait for TcpdumpLauncher {
    async fn start(&self, key: &PodKey, count: u32) -> Result<CaptureEntry, CaptureError> {
        if count == 0 {
            return Err(CaptureError::InvalidConfig(format!(
                "rotation count for {key} must be positive"
            )));
        }

        let files = self.files_for(key);
        let args = self.config.args(&files, count);
        debug!("Spawning {} {:?}", self.config.binary.display(), args);

        // stdout/stderr stay attached to ours so tcpdump diagnostics reach the pod log
        let child = Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| CaptureError::Spawn {
                pod: key.to_string(),
                binary: self.config.binary.clone(),
                source,
            })?;

        info!(
            "Capture running for {} -> {} (pid {:?}, {} files)",
            key,
            files.base_path().display(),
            child.id(),
            count
        );

        Ok(CaptureEntry {
            key: key.clone(),
            count,
            files,
            handle: Box::new(TcpdumpHandle::new(key.clone(), child)),
            started_at: Utc::now(),
        })
    }
}

/// Handle to a spawned `tcpdump`.
#[derive(Debug)]
pub struct TcpdumpHandle {
    key: PodKey,
    child: Child,
}

impl TcpdumpHandle {
    fn new(key: PodKey, child: Child) -> Self {
        Self { key, child }
    }
}

#[async_trait::async_trait]
impl CaptureHandle for TcpdumpHandle {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn kill(&mut self) -> Result<(), CaptureError> {
        self.child.kill().await.map_err(|source| CaptureError::Kill {
            pod: self.key.to_string(),
            source,
        })
    }
}
