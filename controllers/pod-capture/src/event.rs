//! Pod snapshots and the notifications the reconciler consumes.

use k8s_openapi::api::core::v1::Pod;
use pcap_capture::PodKey;
use std::collections::BTreeMap;

/// The parts of a pod the controller cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSnapshot {
    pub key: PodKey,
    pub node_name: Option<String>,
    pub annotations: BTreeMap<String, String>,
}

impl PodSnapshot {
    /// Builds a snapshot, or `None` for a pod without a name.
    pub fn from_pod(pod: &Pod) -> Option<Self> {
        let name = pod.metadata.name.clone()?;
        let namespace = pod
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());

        Some(Self {
            key: PodKey::new(namespace, name),
            node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
            annotations: pod.metadata.annotations.clone().unwrap_or_default(),
        })
    }
}

/// An add, update or delete of one pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Add { pod: PodSnapshot },
    Update { old: PodSnapshot, new: PodSnapshot },
    Delete { pod: PodSnapshot },
}

impl Notification {
    pub fn key(&self) -> &PodKey {
        match self {
            Self::Add { pod } | Self::Delete { pod } => &pod.key,
            Self::Update { new, .. } => &new.key,
        }
    }

    /// Snapshot carrying the pod's most recent state.
    pub fn current(&self) -> &PodSnapshot {
        match self {
            Self::Add { pod } | Self::Delete { pod } => pod,
            Self::Update { new, .. } => new,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_pod;

    #[test]
    fn test_snapshot_from_pod() {
        let pod = create_test_pod("web-0", "shop", "node-a", Some("3"));

        let snapshot = PodSnapshot::from_pod(&pod).unwrap();

        assert_eq!(snapshot.key, PodKey::new("shop", "web-0"));
        assert_eq!(snapshot.node_name.as_deref(), Some("node-a"));
        assert_eq!(
            snapshot.annotations.get("tcpdump.antrea.io").map(String::as_str),
            Some("3")
        );
    }

    #[test]
    fn test_snapshot_requires_name() {
        let mut pod = create_test_pod("web-0", "shop", "node-a", None);
        pod.metadata.name = None;

        assert!(PodSnapshot::from_pod(&pod).is_none());
    }

    #[test]
    fn test_update_key_is_new_snapshot_key() {
        let old = PodSnapshot::from_pod(&create_test_pod("a", "ns", "n", None)).unwrap();
        let new = PodSnapshot::from_pod(&create_test_pod("a", "ns", "n", Some("2"))).unwrap();

        let update = Notification::Update { old, new: new.clone() };

        assert_eq!(update.key(), &new.key);
        assert_eq!(update.current(), &new);
        assert!(!update.is_delete());
    }
}
