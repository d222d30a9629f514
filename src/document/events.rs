//! Change-event buffering and throttled batch emission.
//!
//! Mutations and external-change observations enqueue events; a single
//! trailing-edge timer flushes them as one batch per coalescing window,
//! so a burst of edits announces only its final state.

use crate::types::{ChangeEvent, ChangeKind, TreeAddress};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Default coalescing window between batches.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

const CHANNEL_CAPACITY: usize = 64;

/// Coalesces per-document change events into trailing-edge batches.
pub struct ChangeBatcher {
    inner: Arc<BatcherInner>,
    handle: tokio::runtime::Handle,
}

struct BatcherInner {
    pending: Mutex<Vec<ChangeEvent>>,
    timer_armed: AtomicBool,
    interval: Duration,
    synthetic: TreeAddress,
    tx: broadcast::Sender<Vec<ChangeEvent>>,
}

impl ChangeBatcher {
    pub fn new(
        synthetic_entry: &str,
        interval: Duration,
        handle: tokio::runtime::Handle,
    ) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        ChangeBatcher {
            inner: Arc::new(BatcherInner {
                pending: Mutex::new(Vec::new()),
                timer_armed: AtomicBool::new(false),
                interval,
                synthetic: TreeAddress::from_segments([synthetic_entry]),
                tx,
            }),
            handle,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<ChangeEvent>> {
        self.inner.tx.subscribe()
    }

    /// Queue events and arm the flush timer. Arming while a timer is
    /// pending is suppressed, so rapid mutations fold into one batch.
    /// Safe to call from non-runtime threads (the watch callback).
    pub fn enqueue(&self, events: impl IntoIterator<Item = ChangeEvent>) {
        self.inner.pending.lock().extend(events);
        if self.inner.timer_armed.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        self.handle.spawn(async move {
            tokio::time::sleep(inner.interval).await;
            inner.timer_armed.store(false, Ordering::Release);
            let mut batch = std::mem::take(&mut *inner.pending.lock());
            // a consumer may watch only the root or only the raw entry
            for blanket in [
                ChangeEvent::new(TreeAddress::root(), ChangeKind::Changed),
                ChangeEvent::new(inner.synthetic.clone(), ChangeKind::Changed),
            ] {
                if !batch.contains(&blanket) {
                    batch.push(blanket);
                }
            }
            let _ = inner.tx.send(batch);
        });
    }
}
