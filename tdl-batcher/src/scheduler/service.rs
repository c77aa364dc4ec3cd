//! The batching scheduler.
//!
//! One [`BatchScheduler`] is built at startup and cloned into every caller.
//! Submitting is cheap: append, wake, and start the background loop if it is
//! not already running. At most one loop exists at a time.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::collector::{BatchPolicy, collect_batch};
use super::executor::{DispatchStats, GroupExecutor};
use super::messages;
use super::{DownloadRequest, RequestQueue};
use crate::config::SchedulerConfig;
use crate::notify::{NotificationAdapter, NotificationHandle};
use crate::transfer::TransferService;

/// One pending request in a status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPreview {
    pub destination_key: String,
    pub age_secs: f64,
}

/// Read-only view of the scheduler for status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub queue_len: usize,
    pub is_processing: bool,
    pub max_batch_size: usize,
    pub batch_window_ms: u64,
    pub preview: Vec<PendingPreview>,
    pub batches_dispatched: u64,
    pub groups_completed: u64,
    pub groups_failed: u64,
}

struct Inner {
    config: SchedulerConfig,
    policy: BatchPolicy,
    queue: RequestQueue,
    processing: AtomicBool,
    executor: GroupExecutor,
    notifier: Arc<dyn NotificationAdapter>,
    idle: Notify,
    cancel: CancellationToken,
}

/// Handle to the shared scheduler. Cheap to clone.
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Arc<Inner>,
}

impl BatchScheduler {
    pub fn new(
        config: SchedulerConfig,
        output_root: PathBuf,
        transfer: Arc<dyn TransferService>,
        notifier: Arc<dyn NotificationAdapter>,
    ) -> Self {
        let executor = GroupExecutor::new(
            transfer,
            notifier.clone(),
            output_root,
            config.transfer_timeout(),
        );
        Self {
            inner: Arc::new(Inner {
                policy: BatchPolicy::from(&config),
                config,
                queue: RequestQueue::new(),
                processing: AtomicBool::new(false),
                executor,
                notifier,
                idle: Notify::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Queue a download and tell the requester it is waiting.
    ///
    /// The "queued" update is sent only for the first pending request that
    /// reports to a given handle. It goes out before the request becomes
    /// visible to the collector, so it always precedes later updates.
    pub async fn submit(
        &self,
        source: impl Into<String>,
        destination_key: impl Into<String>,
        handle: Option<NotificationHandle>,
    ) {
        let request = DownloadRequest::new(source, destination_key, handle);

        if let Some(handle) = request.handle()
            && !self.inner.queue.has_pending_for(handle)
        {
            let status = messages::queued(self.inner.queue.len() + 1);
            if let Err(e) = self
                .inner
                .notifier
                .update_status(handle, &status.text, status.formatted)
                .await
            {
                debug!(handle = %handle, error = %e, "Failed to send queued status");
            }
        }

        self.enqueue(request);
    }

    /// Append a request and make sure the processing loop is running.
    pub fn enqueue(&self, request: DownloadRequest) {
        let source = request.source().to_string();
        let queue_size = self.inner.queue.enqueue(request);
        info!(url = %source, queue_size, "Added download task to queue");
        self.ensure_running();
    }

    /// Start the loop unless one is already running.
    fn ensure_running(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        if self
            .inner
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let this = self.clone();
            tokio::spawn(async move { this.run().await });
        }
    }

    async fn run(&self) {
        debug!("Batch processing loop started");
        loop {
            tokio::select! {
                _ = self.inner.cancel.cancelled() => {
                    info!(queue_size = self.inner.queue.len(), "Scheduler shut down, abandoning in-flight batch");
                    self.inner.processing.store(false, Ordering::SeqCst);
                    break;
                }
                _ = self.drain() => {}
            }

            if !self.release_or_reclaim() {
                break;
            }
        }
        debug!("Batch processing loop idle");
        self.inner.idle.notify_waiters();
    }

    /// Clear the running flag, then take it back if a request arrived after
    /// the last emptiness check. Returns whether the caller still owns the loop.
    ///
    /// An enqueue in that gap saw the flag set and did not start a loop, so
    /// without the re-check its request would be stranded.
    fn release_or_reclaim(&self) -> bool {
        self.inner.processing.store(false, Ordering::SeqCst);
        !self.inner.queue.is_empty()
            && self
                .inner
                .processing
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }

    /// Collect and dispatch batches until the queue is empty.
    async fn drain(&self) {
        while !self.inner.queue.is_empty() {
            let Some(batch) = collect_batch(&self.inner.queue, &self.inner.policy).await else {
                break;
            };
            let summary = self.inner.executor.dispatch(batch).await;
            debug!(
                requests = summary.requests,
                failed_groups = summary.failed_groups(),
                "Batch dispatched"
            );
            tokio::time::sleep(self.inner.config.yield_delay()).await;
        }
    }

    /// Whether the background loop is active.
    pub fn is_processing(&self) -> bool {
        self.inner.processing.load(Ordering::SeqCst)
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        !self.is_processing() && self.inner.queue.is_empty()
    }

    /// Resolve once the loop has stopped and nothing is pending.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.is_idle() || self.inner.cancel.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Stop the loop. Groups of the in-flight batch that have not started are
    /// dropped, a group already transferring runs to completion on its own
    /// task, and pending requests are not processed.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.idle.notify_waiters();
    }

    pub fn stats(&self) -> &DispatchStats {
        self.inner.executor.stats()
    }

    /// Snapshot for a status command.
    pub fn status(&self) -> StatusSnapshot {
        let now = Instant::now();
        let preview = self
            .inner
            .queue
            .preview(self.inner.config.status_preview)
            .into_iter()
            .map(|entry| PendingPreview {
                destination_key: entry.destination_key,
                age_secs: now.saturating_duration_since(entry.arrived_at).as_secs_f64(),
            })
            .collect();
        let stats = self.stats();

        StatusSnapshot {
            queue_len: self.inner.queue.len(),
            is_processing: self.is_processing(),
            max_batch_size: self.inner.config.max_batch_size,
            batch_window_ms: self.inner.config.batch_window_ms,
            preview,
            batches_dispatched: stats.batches_dispatched.load(Ordering::Relaxed),
            groups_completed: stats.groups_completed.load(Ordering::Relaxed),
            groups_failed: stats.groups_failed.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("queue_len", &self.queue_len())
            .field("is_processing", &self.is_processing())
            .field("executor", &self.inner.executor)
            .finish()
    }
}
