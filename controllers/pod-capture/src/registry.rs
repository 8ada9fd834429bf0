//! Capture registry.
//!
//! The single source of truth for which pods have a running capture. Each
//! pod gets its own async lock ("slot"), created on first use and pruned once
//! it is vacant and nobody waits on it, so operations on different pods never
//! contend and operations on the same pod never interleave.
//!
//! The slot lock is held across process spawn and kill, so check, spawn and
//! insert for one pod form a single step.

use pcap_capture::{CaptureEntry, CaptureInfo, PodKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<Option<CaptureEntry>>>;

/// Map of pod identity to its running capture.
#[derive(Debug, Default)]
pub struct CaptureRegistry {
    slots: Mutex<HashMap<PodKey, Slot>>,
}

impl CaptureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to one pod's slot.
    pub async fn lock(&self, key: &PodKey) -> SlotGuard<'_> {
        let slot = {
            let mut slots = self.slots();
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        SlotGuard {
            registry: self,
            key: key.clone(),
            guard: slot.lock_owned().await,
        }
    }

    /// Inserts `entry` unless its pod already has one; the entry is handed
    /// back on conflict so the caller can stop the process it owns.
    pub async fn try_insert(&self, entry: CaptureEntry) -> Result<(), CaptureEntry> {
        let key = entry.key.clone();
        self.lock(&key).await.try_insert(entry)
    }

    pub async fn remove(&self, key: &PodKey) -> Option<CaptureEntry> {
        self.lock(key).await.remove()
    }

    pub async fn get(&self, key: &PodKey) -> Option<CaptureInfo> {
        self.lock(key).await.get()
    }

    /// Pods that currently have a capture, in key order.
    pub async fn keys(&self) -> Vec<PodKey> {
        let mut candidates: Vec<PodKey> = self.slots().keys().cloned().collect();
        candidates.sort();

        let mut keys = Vec::with_capacity(candidates.len());
        for key in candidates {
            if self.lock(&key).await.is_occupied() {
                keys.push(key);
            }
        }
        keys
    }

    pub async fn len(&self) -> usize {
        self.keys().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of slots currently allocated, occupied or not.
    pub fn slot_count(&self) -> usize {
        self.slots().len()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<PodKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to one pod's registry slot.
///
/// Dropping the guard releases the slot; a vacant slot nobody else is
/// waiting on is removed from the map at that point.
#[derive(Debug)]
pub struct SlotGuard<'a> {
    registry: &'a CaptureRegistry,
    key: PodKey,
    guard: OwnedMutexGuard<Option<CaptureEntry>>,
}

impl SlotGuard<'_> {
    pub fn key(&self) -> &PodKey {
        &self.key
    }

    pub fn is_occupied(&self) -> bool {
        self.guard.is_some()
    }

    pub fn get(&self) -> Option<CaptureInfo> {
        self.guard.as_ref().map(CaptureEntry::info)
    }

    pub fn try_insert(&mut self, entry: CaptureEntry) -> Result<(), CaptureEntry> {
        if self.guard.is_some() {
            return Err(entry);
        }
        *self.guard = Some(entry);
        Ok(())
    }

    pub fn remove(&mut self) -> Option<CaptureEntry> {
        self.guard.take()
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.guard.is_some() {
            return;
        }
        let mut slots = self.registry.slots();
        let ours = OwnedMutexGuard::mutex(&self.guard);
        // Two references: the map's and this guard's. Anyone else holding one
        // is queued on the slot and must find it in the map.
        let prunable = slots
            .get(&self.key)
            .is_some_and(|slot| Arc::ptr_eq(slot, ours) && Arc::strong_count(slot) == 2);
        if prunable {
            slots.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcap_capture::{CaptureLauncherTrait, MockCaptureLauncher};

    async fn entry(launcher: &MockCaptureLauncher, key: &PodKey, count: u32) -> CaptureEntry {
        launcher.start(key, count).await.unwrap()
    }

    #[tokio::test]
    async fn test_try_insert_only_once() {
        let launcher = MockCaptureLauncher::new("/nonexistent");
        let registry = CaptureRegistry::new();
        let key = PodKey::new("default", "web-0");

        assert!(registry.try_insert(entry(&launcher, &key, 3).await).await.is_ok());
        let rejected = registry.try_insert(entry(&launcher, &key, 5).await).await;

        let rejected = rejected.unwrap_err();
        assert_eq!(rejected.count, 5);
        assert_eq!(registry.get(&key).await.unwrap().count, 3);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let launcher = MockCaptureLauncher::new("/nonexistent");
        let registry = CaptureRegistry::new();
        let key = PodKey::new("default", "web-0");
        registry.try_insert(entry(&launcher, &key, 2).await).await.unwrap();

        assert_eq!(registry.remove(&key).await.map(|e| e.count), Some(2));
        assert!(registry.remove(&key).await.is_none());
        assert!(registry.get(&key).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_vacant_slots_are_pruned() {
        let launcher = MockCaptureLauncher::new("/nonexistent");
        let registry = CaptureRegistry::new();
        let key = PodKey::new("default", "web-0");

        assert!(registry.get(&key).await.is_none());
        assert_eq!(registry.slot_count(), 0);

        registry.try_insert(entry(&launcher, &key, 1).await).await.unwrap();
        assert_eq!(registry.slot_count(), 1);

        registry.remove(&key).await;
        assert_eq!(registry.slot_count(), 0);
    }

    #[tokio::test]
    async fn test_slot_kept_while_another_task_waits() {
        let registry = Arc::new(CaptureRegistry::new());
        let key = PodKey::new("default", "web-0");

        let guard = registry.lock(&key).await;
        let waiter = {
            let registry = Arc::clone(&registry);
            let key = key.clone();
            tokio::spawn(async move {
                let launcher = MockCaptureLauncher::new("/nonexistent");
                let mut slot = registry.lock(&key).await;
                slot.try_insert(launcher.start(&key, 4).await.unwrap()).is_ok()
            })
        };
        // let the waiter clone the slot before we release ours
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(guard);

        assert!(waiter.await.unwrap());
        assert_eq!(registry.get(&key).await.unwrap().count, 4);
    }

    #[tokio::test]
    async fn test_keys_lists_only_occupied_slots() {
        let launcher = MockCaptureLauncher::new("/nonexistent");
        let registry = CaptureRegistry::new();
        let b = PodKey::new("ns", "b");
        let a = PodKey::new("ns", "a");
        registry.try_insert(entry(&launcher, &b, 1).await).await.unwrap();
        registry.try_insert(entry(&launcher, &a, 1).await).await.unwrap();
        let c = PodKey::new("ns", "c");
        registry.try_insert(entry(&launcher, &c, 1).await).await.unwrap();
        registry.remove(&c).await;

        assert_eq!(registry.keys().await, vec![a, b]);
    }
}
