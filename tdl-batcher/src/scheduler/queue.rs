//! Pending request buffer and the signal that wakes an idle collector.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::DownloadRequest;
use crate::notify::NotificationHandle;
use crate::{Error, Result};

/// Single-slot wake-up event.
///
/// `set` while nobody waits leaves one stored permit, so a wake that races
/// ahead of `wait` is not lost. Waiters must re-check the queue after every
/// wake since a stored permit can be stale.
#[derive(Debug, Default)]
pub struct WakeSignal {
    notify: Notify,
}

impl WakeSignal {
    pub fn set(&self) {
        self.notify.notify_one();
    }

    /// Wait for the signal, at most `limit`. Returns `false` on timeout.
    pub async fn wait(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.notify.notified())
            .await
            .is_ok()
    }
}

/// Oldest-first summary of one pending request.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry {
    pub destination_key: String,
    pub arrived_at: Instant,
}

/// FIFO buffer of pending requests. Unbounded; enqueue never blocks.
#[derive(Debug, Default)]
pub struct RequestQueue {
    items: Mutex<VecDeque<DownloadRequest>>,
    len: AtomicUsize,
    wake: WakeSignal,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail and set the wake signal. Returns the new length.
    pub fn enqueue(&self, request: DownloadRequest) -> usize {
        let len = {
            let mut items = self.items.lock();
            items.push_back(request);
            // Stored under the lock so it cannot overwrite a later dequeue.
            self.len.store(items.len(), Ordering::SeqCst);
            items.len()
        };
        self.wake.set();
        len
    }

    /// Pop the head of the queue.
    pub fn dequeue_front(&self) -> Result<DownloadRequest> {
        let mut items = self.items.lock();
        let request = items.pop_front().ok_or(Error::EmptyQueue)?;
        self.len.store(items.len(), Ordering::SeqCst);
        Ok(request)
    }

    /// Current length; readable without taking the lock.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any pending request reports to `handle`.
    pub fn has_pending_for(&self, handle: &NotificationHandle) -> bool {
        self.items
            .lock()
            .iter()
            .any(|r| r.handle() == Some(handle))
    }

    /// The `limit` oldest pending requests.
    pub fn preview(&self, limit: usize) -> Vec<PendingEntry> {
        self.items
            .lock()
            .iter()
            .take(limit)
            .map(|r| PendingEntry {
                destination_key: r.destination_key().to_string(),
                arrived_at: r.arrived_at(),
            })
            .collect()
    }

    /// Wait until a request arrives or `limit` passes. Returns `false` on timeout.
    pub async fn wait_for_arrival(&self, limit: Duration) -> bool {
        self.wake.wait(limit).await
    }
}
