//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test pods and a reconciler
//! backed by `MockCaptureLauncher`.

use crate::annotation::CAPTURE_ANNOTATION;
use crate::event::PodSnapshot;
use crate::reconciler::Reconciler;
use crate::registry::CaptureRegistry;
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use pcap_capture::MockCaptureLauncher;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Node every test pod is scheduled on unless stated otherwise
pub const TEST_NODE: &str = "node-a";

/// Helper to create a test Pod, optionally carrying the capture annotation
pub fn create_test_pod(name: &str, namespace: &str, node: &str, capture: Option<&str>) -> Pod {
    let mut annotations = BTreeMap::new();
    annotations.insert("kubectl.kubernetes.io/restartedAt".to_string(), "never".to_string());
    if let Some(value) = capture {
        annotations.insert(CAPTURE_ANNOTATION.to_string(), value.to_string());
    }

    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: Some(node.to_string()),
            ..Default::default()
        }),
        status: None,
    }
}

/// Helper to create a snapshot of a pod in `default` on [`TEST_NODE`]
pub fn create_test_snapshot(name: &str, capture: Option<&str>) -> PodSnapshot {
    PodSnapshot::from_pod(&create_test_pod(name, "default", TEST_NODE, capture))
        .unwrap_or_else(|| panic!("test pod {name} has a name"))
}

/// Helper to create a reconciler whose captures "write" into `capture_dir`
pub fn create_test_reconciler(capture_dir: &Path) -> (Reconciler, MockCaptureLauncher) {
    let launcher = MockCaptureLauncher::new(capture_dir);
    let reconciler = Reconciler::new(
        Box::new(launcher.clone()),
        Arc::new(CaptureRegistry::new()),
        Some(TEST_NODE.to_string()),
    );
    (reconciler, launcher)
}

/// Writes the first `count` rotated files a capture of `pod_name` would produce
pub fn write_capture_files(capture_dir: &Path, pod_name: &str, count: u32) {
    for path in pcap_capture::CaptureFiles::for_pod(capture_dir, pod_name).paths(count) {
        std::fs::write(&path, b"pcap")
            .unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
    }
}
