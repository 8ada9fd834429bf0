//! Mock launcher for unit testing
//!
//! Records every start, stop and kill instead of spawning processes. File
//! cleanup is real and runs against the configured output directory, so
//! tests can point it at a temp directory and check which files went away.

use crate::error::CaptureError;
use crate::files::CaptureFiles;
use crate::launcher_trait::{stop_entry, CaptureHandle, CaptureLauncherTrait};
use crate::models::{CaptureEntry, PodKey, StopReport};
use chrono::Utc;
use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct MockState {
    starts: Vec<(PodKey, u32)>,
    stops: Vec<PodKey>,
    kills: usize,
    live: HashSet<u32>,
    next_pid: u32,
    fail_spawns: bool,
    fail_kills: bool,
}

/// Mock launcher for testing
#[derive(Debug, Clone)]
pub struct MockCaptureLauncher {
    output_dir: PathBuf,
    spawn_delay: Option<Duration>,
    state: Arc<Mutex<MockState>>,
}

impl MockCaptureLauncher {
    /// Create a new mock writing (virtual) captures under `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            spawn_delay: None,
            state: Arc::new(Mutex::new(MockState {
                next_pid: 1000,
                ..MockState::default()
            })),
        }
    }

    /// Sleep before every spawn, widening race windows in concurrency tests
    #[must_use]
    pub fn with_spawn_delay(mut self, delay: Duration) -> Self {
        self.spawn_delay = Some(delay);
        self
    }

    /// Make subsequent starts fail with `CaptureError::Spawn`
    pub fn fail_spawns(&self, fail: bool) {
        self.state().fail_spawns = fail;
    }

    /// Make subsequent kills fail with `CaptureError::Kill`, leaving the
    /// process alive
    pub fn fail_kills(&self, fail: bool) {
        self.state().fail_kills = fail;
    }

    /// Every successful start, in order
    pub fn starts(&self) -> Vec<(PodKey, u32)> {
        self.state().starts.clone()
    }

    pub fn start_count(&self) -> usize {
        self.state().starts.len()
    }

    /// Every stop, in order
    pub fn stops(&self) -> Vec<PodKey> {
        self.state().stops.clone()
    }

    pub fn stop_count(&self) -> usize {
        self.state().stops.len()
    }

    pub fn kill_count(&self) -> usize {
        self.state().kills
    }

    /// Processes spawned and not yet killed
    pub fn live_count(&self) -> usize {
        self.state().live.len()
    }

    pub fn files_for(&self, key: &PodKey) -> CaptureFiles {
        CaptureFiles::for_pod(&self.output_dir, &key.name)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl CaptureLauncherTrait for MockCaptureLauncher {
    async fn start(&self, key: &PodKey, count: u32) -> Result<CaptureEntry, CaptureError> {
        if let Some(delay) = self.spawn_delay {
            tokio::time::sleep(delay).await;
        }

        let pid = {
            let mut state = self.state();
            if state.fail_spawns {
                return Err(CaptureError::Spawn {
                    pod: key.to_string(),
                    binary: PathBuf::from("mock-tcpdump"),
                    source: io::Error::new(io::ErrorKind::NotFound, "mock spawn failure"),
                });
            }
            let pid = state.next_pid;
            state.next_pid += 1;
            state.live.insert(pid);
            state.starts.push((key.clone(), count));
            pid
        };

        Ok(CaptureEntry {
            key: key.clone(),
            count,
            files: self.files_for(key),
            handle: Box::new(MockHandle {
                pid,
                state: Arc::clone(&self.state),
            }),
            started_at: Utc::now(),
        })
    }

    async fn stop(&self, entry: CaptureEntry) -> StopReport {
        self.state().stops.push(entry.key.clone());
        stop_entry(entry).await
    }
}

/// Handle to a pretend process.
#[derive(Debug)]
struct MockHandle {
    pid: u32,
    state: Arc<Mutex<MockState>>,
}

#[async_trait::async_trait]
impl CaptureHandle for MockHandle {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    async fn kill(&mut self) -> Result<(), CaptureError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.kills += 1;
        if state.fail_kills {
            return Err(CaptureError::Kill {
                pod: format!("pid {}", self.pid),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "mock kill failure"),
            });
        }
        if state.live.remove(&self.pid) {
            Ok(())
        } else {
            Err(CaptureError::Kill {
                pod: format!("pid {}", self.pid),
                source: io::Error::new(io::ErrorKind::InvalidInput, "process already exited"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileOutcome;

    #[tokio::test]
    async fn test_failed_kill_is_reported_and_files_still_removed() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = MockCaptureLauncher::new(dir.path());
        let key = PodKey::new("default", "web-0");
        let entry = launcher.start(&key, 3).await.unwrap();
        for path in launcher.files_for(&key).paths(3) {
            std::fs::write(path, b"x").unwrap();
        }
        launcher.fail_kills(true);

        let report = launcher.stop(entry).await;

        assert!(!report.killed());
        assert!(matches!(report.kill, Err(CaptureError::Kill { .. })));
        assert_eq!(report.attempted(), launcher.files_for(&key).paths(3).collect::<Vec<_>>());
        assert!(report.files.iter().all(|f| f.outcome == FileOutcome::Removed));
        assert_eq!(report.never_written, 0);
        assert_eq!(launcher.kill_count(), 1);
        assert_eq!(launcher.live_count(), 1);
    }

    #[tokio::test]
    async fn test_killing_twice_fails_the_second_time() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = MockCaptureLauncher::new(dir.path());
        let mut entry = launcher.start(&PodKey::new("default", "web-0"), 1).await.unwrap();

        assert!(entry.handle.kill().await.is_ok());
        assert!(entry.handle.kill().await.is_err());
        assert_eq!(launcher.live_count(), 0);
    }

    #[tokio::test]
    async fn test_fail_spawns() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = MockCaptureLauncher::new(dir.path());
        launcher.fail_spawns(true);

        let result = launcher.start(&PodKey::new("default", "web-0"), 1).await;

        assert!(matches!(result, Err(CaptureError::Spawn { .. })));
        assert_eq!(launcher.start_count(), 0);
    }
}
