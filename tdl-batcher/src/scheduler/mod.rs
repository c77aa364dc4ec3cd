//! Batching scheduler: queue, collector, grouper, and group executor.

mod collector;
mod executor;
mod grouper;
pub mod messages;
mod queue;
mod request;
mod service;

pub use collector::{Batch, BatchPolicy, CutReason, collect_batch};
pub use executor::{
    DispatchStats, DispatchSummary, GroupExecutor, GroupOutcome, destination_dir,
};
pub use grouper::{Group, group_by_destination};
pub use queue::{PendingEntry, RequestQueue, WakeSignal};
pub use request::DownloadRequest;
pub use service::{BatchScheduler, PendingPreview, StatusSnapshot};
