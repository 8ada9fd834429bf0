//! Controller configuration, read from environment variables.

use crate::error::ControllerError;
use pcap_capture::TcpdumpConfig;
use std::path::PathBuf;
use tracing::info;

pub const NODE_NAME_VAR: &str = "NODE_NAME";
pub const CAPTURE_DIR_VAR: &str = "CAPTURE_DIR";
pub const TCPDUMP_BIN_VAR: &str = "TCPDUMP_BIN";
pub const ROTATE_SIZE_VAR: &str = "CAPTURE_ROTATE_SIZE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Node whose pods are captured
    pub node_name: String,
    pub tcpdump: TcpdumpConfig,
}

impl ControllerConfig {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through `lookup`, treating empty values as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let node_name = var(NODE_NAME_VAR).ok_or_else(|| {
            ControllerError::InvalidConfig(format!(
                "{NODE_NAME_VAR} environment variable is required"
            ))
        })?;

        let mut tcpdump = TcpdumpConfig::default();
        if let Some(dir) = var(CAPTURE_DIR_VAR) {
            tcpdump.output_dir = PathBuf::from(dir);
        }
        if let Some(binary) = var(TCPDUMP_BIN_VAR) {
            tcpdump.binary = PathBuf::from(binary);
        }
        if let Some(size) = var(ROTATE_SIZE_VAR) {
            tcpdump.rotate_size = size;
        }
        tcpdump.validate()?;

        Ok(Self { node_name, tcpdump })
    }

    /// Logs the effective configuration.
    pub fn log(&self) {
        info!("Configuration:");
        info!("  Node: {}", self.node_name);
        info!("  Capture directory: {}", self.tcpdump.output_dir.display());
        info!("  tcpdump binary: {}", self.tcpdump.binary.display());
        info!("  Rotate size: {}", self.tcpdump.rotate_size);
    }
}
