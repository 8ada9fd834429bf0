//! Last-known pod state, turning raw watch events into notifications.
//!
//! `kube_runtime::watcher` only reports the current object. The cache keeps
//! the previous snapshot of every pod so updates can be reported with both
//! the old and the new state, and so a relist can tell which pods vanished
//! while the watch was down.

use crate::event::{Notification, PodSnapshot};
use k8s_openapi::api::core::v1::Pod;
use kube_runtime::watcher;
use pcap_capture::PodKey;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct PodCache {
    pods: HashMap<PodKey, PodSnapshot>,
    /// Objects of an in-progress relist, `None` outside of one
    relist: Option<Vec<PodSnapshot>>,
    synced: bool,
}

impl PodCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the initial list has been fully received.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    pub fn get(&self, key: &PodKey) -> Option<&PodSnapshot> {
        self.pods.get(key)
    }

    /// Applies one watch event, returning the notifications it produces.
    pub fn apply_event(&mut self, event: watcher::Event<Pod>) -> Vec<Notification> {
        match event {
            watcher::Event::Apply(pod) => snapshot(&pod)
                .and_then(|pod| self.apply(pod))
                .into_iter()
                .collect(),
            watcher::Event::Delete(pod) => snapshot(&pod)
                .and_then(|pod| self.delete(&pod))
                .into_iter()
                .collect(),
            watcher::Event::Init => {
                debug!("Pod relist started");
                self.relist = Some(Vec::new());
                Vec::new()
            }
            watcher::Event::InitApply(pod) => {
                if let Some(pod) = snapshot(&pod) {
                    self.relist.get_or_insert_with(Vec::new).push(pod);
                }
                Vec::new()
            }
            watcher::Event::InitDone => {
                let listed = self.relist.take().unwrap_or_default();
                self.synced = true;
                self.finish_relist(listed)
            }
        }
    }

    fn apply(&mut self, pod: PodSnapshot) -> Option<Notification> {
        match self.pods.insert(pod.key.clone(), pod.clone()) {
            None => Some(Notification::Add { pod }),
            Some(old) if old.annotations == pod.annotations && old.node_name == pod.node_name => {
                None
            }
            Some(old) => Some(Notification::Update { old, new: pod }),
        }
    }

    fn delete(&mut self, pod: &PodSnapshot) -> Option<Notification> {
        // the cached snapshot is the last state we acted on
        let last = self.pods.remove(&pod.key).unwrap_or_else(|| pod.clone());
        Some(Notification::Delete { pod: last })
    }

    /// Diffs a complete listing against the cache.
    fn finish_relist(&mut self, listed: Vec<PodSnapshot>) -> Vec<Notification> {
        let mut vanished: HashMap<PodKey, PodSnapshot> = std::mem::take(&mut self.pods);
        let mut notifications = Vec::with_capacity(listed.len());

        for pod in listed {
            let key = pod.key.clone();
            match vanished.remove(&key) {
                Some(old) => {
                    if old.annotations != pod.annotations || old.node_name != pod.node_name {
                        notifications.push(Notification::Update { old, new: pod.clone() });
                    }
                }
                None => notifications.push(Notification::Add { pod: pod.clone() }),
            }
            self.pods.insert(key, pod);
        }

        let mut vanished: Vec<PodSnapshot> = vanished.into_values().collect();
        vanished.sort_by(|a, b| a.key.cmp(&b.key));
        notifications.extend(vanished.into_iter().map(|pod| Notification::Delete { pod }));
        notifications
    }
}

fn snapshot(pod: &Pod) -> Option<PodSnapshot> {
    let snapshot = PodSnapshot::from_pod(pod);
    if snapshot.is_none() {
        warn!("Ignoring pod event without a name");
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_NODE, create_test_pod};

    fn pod(name: &str, capture: Option<&str>) -> Pod {
        create_test_pod(name, "default", TEST_NODE, capture)
    }

    fn kinds(notifications: &[Notification]) -> Vec<(&'static str, String)> {
        notifications
            .iter()
            .map(|n| {
                let kind = match n {
                    Notification::Add { .. } => "add",
                    Notification::Update { .. } => "update",
                    Notification::Delete { .. } => "delete",
                };
                (kind, n.key().name.clone())
            })
            .collect()
    }

    #[test]
    fn test_apply_reports_add_then_update() {
        let mut cache = PodCache::new();

        let added = cache.apply_event(watcher::Event::Apply(pod("web-0", None)));
        let updated = cache.apply_event(watcher::Event::Apply(pod("web-0", Some("3"))));

        assert_eq!(kinds(&added), vec![("add", "web-0".to_string())]);
        match updated.as_slice() {
            [Notification::Update { old, new }] => {
                assert!(!old.annotations.contains_key("tcpdump.antrea.io"));
                assert_eq!(new.annotations["tcpdump.antrea.io"], "3");
            }
            other => panic!("expected one update, got {other:?}"),
        }
    }

    #[test]
    fn test_apply_without_relevant_change_is_silent() {
        let mut cache = PodCache::new();
        cache.apply_event(watcher::Event::Apply(pod("web-0", Some("3"))));

        let mut status_only = pod("web-0", Some("3"));
        status_only.metadata.resource_version = Some("42".to_string());

        assert!(cache.apply_event(watcher::Event::Apply(status_only)).is_empty());
    }

    #[test]
    fn test_delete_carries_last_known_state() {
        let mut cache = PodCache::new();
        cache.apply_event(watcher::Event::Apply(pod("web-0", Some("3"))));

        // final object lost its annotations on the way out
        let deleted = cache.apply_event(watcher::Event::Delete(pod("web-0", None)));

        match deleted.as_slice() {
            [Notification::Delete { pod }] => {
                assert_eq!(pod.annotations["tcpdump.antrea.io"], "3");
            }
            other => panic!("expected one delete, got {other:?}"),
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_initial_list_is_buffered_until_done() {
        let mut cache = PodCache::new();

        assert!(cache.apply_event(watcher::Event::Init).is_empty());
        assert!(cache.apply_event(watcher::Event::InitApply(pod("b", Some("1")))).is_empty());
        assert!(cache.apply_event(watcher::Event::InitApply(pod("a", None))).is_empty());
        assert!(!cache.is_synced());

        let notifications = cache.apply_event(watcher::Event::InitDone);

        assert!(cache.is_synced());
        assert_eq!(
            kinds(&notifications),
            vec![("add", "b".to_string()), ("add", "a".to_string())]
        );
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_relist_diffs_against_cache() {
        let mut cache = PodCache::new();
        cache.apply_event(watcher::Event::Apply(pod("kept", Some("2"))));
        cache.apply_event(watcher::Event::Apply(pod("changed", Some("2"))));
        cache.apply_event(watcher::Event::Apply(pod("gone", Some("2"))));

        cache.apply_event(watcher::Event::Init);
        cache.apply_event(watcher::Event::InitApply(pod("kept", Some("2"))));
        cache.apply_event(watcher::Event::InitApply(pod("changed", Some("4"))));
        cache.apply_event(watcher::Event::InitApply(pod("new", None)));
        let notifications = cache.apply_event(watcher::Event::InitDone);

        assert_eq!(
            kinds(&notifications),
            vec![
                ("update", "changed".to_string()),
                ("add", "new".to_string()),
                ("delete", "gone".to_string()),
            ]
        );
        assert!(cache.get(&PodKey::new("default", "gone")).is_none());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_nameless_pods_are_ignored() {
        let mut cache = PodCache::new();
        let mut nameless = pod("web-0", Some("3"));
        nameless.metadata.name = None;

        assert!(cache.apply_event(watcher::Event::Apply(nameless)).is_empty());
        assert!(cache.is_empty());
    }
}
