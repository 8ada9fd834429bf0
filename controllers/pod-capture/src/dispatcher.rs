//! Per-pod notification ordering.
//!
//! Every pod gets its own queue and worker task. Notifications for one pod
//! are reconciled strictly in the order they were dispatched; different pods
//! are reconciled concurrently.

use crate::event::Notification;
use crate::reconciler::Reconciler;
use pcap_capture::PodKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

type Workers = Arc<Mutex<HashMap<PodKey, UnboundedSender<Notification>>>>;

/// Routes notifications to per-pod workers.
#[derive(Debug)]
pub struct Dispatcher {
    reconciler: Arc<Reconciler>,
    workers: Workers,
    pending: Arc<Pending>,
}

#[derive(Debug, Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl Dispatcher {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self {
            reconciler,
            workers: Arc::default(),
            pending: Arc::default(),
        }
    }

    /// Queues a notification behind earlier ones for the same pod.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, notification: Notification) {
        self.pending.count.fetch_add(1, Ordering::SeqCst);
        let key = notification.key().clone();

        let mut workers = lock(&self.workers);
        let notification = match workers.get(&key) {
            Some(tx) => match tx.send(notification) {
                Ok(()) => return,
                // worker exited without retiring; replace it
                Err(mpsc::error::SendError(notification)) => notification,
            },
            None => notification,
        };

        debug!("Starting worker for {}", key);
        let (tx, rx) = mpsc::unbounded_channel();
        workers.insert(key.clone(), tx);
        drop(workers);

        tokio::spawn(run_worker(
            key,
            notification,
            rx,
            Arc::clone(&self.reconciler),
            Arc::clone(&self.workers),
            Arc::clone(&self.pending),
        ));
    }

    /// Waits until every dispatched notification has been reconciled.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.pending.idle.notified();
            if self.pending.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Number of live per-pod workers.
    pub fn worker_count(&self) -> usize {
        lock(&self.workers).len()
    }
}

async fn run_worker(
    key: PodKey,
    first: Notification,
    mut rx: UnboundedReceiver<Notification>,
    reconciler: Arc<Reconciler>,
    workers: Workers,
    pending: Arc<Pending>,
) {
    let mut next = Some(first);
    while let Some(notification) = next.take() {
        let transition = reconciler.handle(&notification).await;
        debug!("{}: {:?}", key, transition);

        // A deleted pod's worker retires once drained, so a pod re-created
        // under the same name starts from a fresh queue.
        if notification.is_delete() {
            let mut map = lock(&workers);
            if rx.is_empty() {
                map.remove(&key);
                drop(map);
                pending.finish();
                debug!("Worker for {} retired", key);
                return;
            }
        }
        pending.finish();

        next = rx.recv().await;
    }
}

fn lock(workers: &Workers) -> MutexGuard<'_, HashMap<PodKey, UnboundedSender<Notification>>> {
    workers.lock().unwrap_or_else(PoisonError::into_inner)
}
