//! Runs the groups of a batch against the transfer service.
//!
//! Groups run strictly one after another. Within a group the last-arrived
//! request is the primary: it receives progress and the detailed outcome,
//! every other request is told it was merged and gets a short outcome.
//!
//! Failure containment:
//! - a failed status update is logged and dropped;
//! - a failed or timed out transfer fails its own group only;
//! - a panic inside a group is reported like a transfer failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::grouper::{Group, group_by_destination};
use super::messages::{self, StatusText};
use super::Batch;
use crate::notify::{NotificationAdapter, NotificationHandle};
use crate::transfer::{TransferReport, TransferService};
use crate::{Error, Result};

/// Running totals across dispatches.
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub batches_dispatched: AtomicU64,
    pub groups_completed: AtomicU64,
    pub groups_failed: AtomicU64,
}

/// Result of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    Completed,
    Failed(String),
}

/// What one dispatch pass did.
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    pub requests: usize,
    pub outcomes: Vec<(String, GroupOutcome)>,
}

impl DispatchSummary {
    pub fn failed_groups(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, GroupOutcome::Failed(_)))
            .count()
    }
}

/// Map a destination key to a directory below `root`.
///
/// Path separators and parent references in the key are neutralised so a
/// key can never escape the root.
pub fn destination_dir(root: &Path, destination_key: &str) -> PathBuf {
    let sanitized: String = destination_key
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    let sanitized = match sanitized.trim() {
        "" | "." | ".." => "_".to_string(),
        s => s.to_string(),
    };
    root.join(sanitized)
}

/// Executes grouped batches. Cheap to clone.
#[derive(Clone)]
pub struct GroupExecutor {
    transfer: Arc<dyn TransferService>,
    notifier: Arc<dyn NotificationAdapter>,
    output_root: PathBuf,
    transfer_timeout: Duration,
    stats: Arc<DispatchStats>,
}

impl GroupExecutor {
    pub fn new(
        transfer: Arc<dyn TransferService>,
        notifier: Arc<dyn NotificationAdapter>,
        output_root: PathBuf,
        transfer_timeout: Duration,
    ) -> Self {
        Self {
            transfer,
            notifier,
            output_root,
            transfer_timeout,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    /// Group a batch and run every group in order.
    pub async fn dispatch(&self, batch: Batch) -> DispatchSummary {
        let requests = batch.len();
        let groups = group_by_destination(batch.requests);
        let total = groups.len();
        self.stats.batches_dispatched.fetch_add(1, Ordering::Relaxed);

        info!(
            batch_size = requests,
            groups = total,
            reason = ?batch.cut_reason,
            "Processing batch"
        );

        let mut summary = DispatchSummary {
            requests,
            outcomes: Vec::with_capacity(total),
        };
        let mut last_primary: Option<NotificationHandle> = None;

        for (index, group) in groups.into_iter().enumerate() {
            let remaining = total - index - 1;
            let outcome = self.execute_group(&group, remaining).await;
            last_primary = group.primary().handle().copied();
            summary
                .outcomes
                .push((group.destination_key().to_string(), outcome));
        }

        if total > 1
            && let Some(handle) = last_primary
        {
            self.notify(Some(&handle), &messages::all_batches_complete())
                .await;
        }

        summary
    }

    /// Run one group in its own task so a panic stays inside the group.
    ///
    /// The task reports its own outcome, so a group keeps its requesters
    /// informed even when the awaiting dispatch is dropped.
    async fn execute_group(&self, group: &Group, remaining: usize) -> GroupOutcome {
        let task = {
            let this = self.clone();
            let group = group.clone();
            tokio::spawn(async move {
                let result = this.run_group(&group, remaining).await;
                this.settle(&group, result).await
            })
        };

        match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                error!(destination = %group.destination_key(), error = %join_error, "Group task aborted");
                let error = Error::Other(format!("unexpected failure: {}", join_error));
                self.settle(group, Err(error)).await
            }
        }
    }

    /// Count the outcome and tell the requesters about a failure.
    async fn settle(&self, group: &Group, result: Result<TransferReport>) -> GroupOutcome {
        match result {
            Ok(report) => {
                self.stats.groups_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    destination = %group.destination_key(),
                    elapsed_secs = report.elapsed.as_secs_f64(),
                    "Group completed"
                );
                GroupOutcome::Completed
            }
            Err(e) => {
                self.stats.groups_failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    destination = %group.destination_key(),
                    sources = ?group.sources(),
                    error = %e,
                    "Batch download failed"
                );
                self.report_failure(group, &e).await;
                GroupOutcome::Failed(e.to_string())
            }
        }
    }

    async fn run_group(&self, group: &Group, remaining: usize) -> Result<TransferReport> {
        let sources = group.sources();
        let destination = destination_dir(&self.output_root, group.destination_key());

        for request in group.merged() {
            self.notify(request.handle(), &messages::merged()).await;
        }
        self.notify(
            group.primary().handle(),
            &messages::processing(sources.len(), remaining),
        )
        .await;

        info!(
            destination = %destination.display(),
            files = sources.len(),
            service = self.transfer.name(),
            "Starting batch download"
        );
        let report = tokio::time::timeout(
            self.transfer_timeout,
            self.transfer.transfer(&destination, &sources),
        )
        .await
        .map_err(|_| Error::TransferTimeout(self.transfer_timeout))??;

        self.notify(
            group.primary().handle(),
            &messages::completed(&sources, &destination, remaining),
        )
        .await;
        for request in group.merged() {
            self.notify(request.handle(), &messages::merged_completed(request.source()))
                .await;
        }

        info!(batch_size = sources.len(), "Batch download completed successfully");
        Ok(report)
    }

    async fn report_failure(&self, group: &Group, error: &Error) {
        let detail = match error {
            Error::Transfer(detail) => detail.clone(),
            other => other.to_string(),
        };
        self.notify(group.primary().handle(), &messages::failed(&detail))
            .await;
        for request in group.merged() {
            self.notify(request.handle(), &messages::failed_generic())
                .await;
        }
    }

    /// Best-effort status update; failures are logged and swallowed.
    async fn notify(&self, handle: Option<&NotificationHandle>, status: &StatusText) {
        let Some(handle) = handle else {
            return;
        };
        if let Err(e) = self
            .notifier
            .update_status(handle, &status.text, status.formatted)
            .await
        {
            warn!(
                handle = %handle,
                notifier = self.notifier.name(),
                error = %e,
                "Failed to update status message"
            );
        }
    }
}

impl std::fmt::Debug for GroupExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupExecutor")
            .field("transfer", &self.transfer.name())
            .field("notifier", &self.notifier.name())
            .field("output_root", &self.output_root)
            .field("transfer_timeout", &self.transfer_timeout)
            .finish()
    }
}
