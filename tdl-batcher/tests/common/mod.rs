//! Recording fakes for the scheduler's external collaborators.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use tdl_batcher::config::SchedulerConfig;
use tdl_batcher::notify::{NotificationAdapter, NotificationHandle};
use tdl_batcher::scheduler::BatchScheduler;
use tdl_batcher::transfer::{TransferReport, TransferService};
use tdl_batcher::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub handle: NotificationHandle,
    pub text: String,
    pub formatted: bool,
}

/// Notifier that records every update in call order.
#[derive(Default)]
pub struct RecordingNotifier {
    updates: Mutex<Vec<Update>>,
    failing: Mutex<HashSet<NotificationHandle>>,
}

impl RecordingNotifier {
    /// Make every update for `handle` fail.
    pub fn fail_for(&self, handle: NotificationHandle) {
        self.failing.lock().insert(handle);
    }

    pub fn updates(&self) -> Vec<Update> {
        self.updates.lock().clone()
    }

    pub fn texts_for(&self, handle: NotificationHandle) -> Vec<String> {
        self.updates
            .lock()
            .iter()
            .filter(|u| u.handle == handle)
            .map(|u| u.text.clone())
            .collect()
    }

    pub fn latest(&self, handle: NotificationHandle) -> Option<String> {
        self.texts_for(handle).pop()
    }
}

#[async_trait]
impl NotificationAdapter for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn update_status(
        &self,
        handle: &NotificationHandle,
        text: &str,
        formatted: bool,
    ) -> Result<()> {
        if self.failing.lock().contains(handle) {
            return Err(Error::notification("message to edit not found"));
        }
        self.updates.lock().push(Update {
            handle: *handle,
            text: text.to_string(),
            formatted,
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCall {
    pub destination: PathBuf,
    pub sources: Vec<String>,
}

/// Transfer fake with scriptable failures, delays, and panics keyed by
/// destination directory name.
#[derive(Default)]
pub struct FakeTransfer {
    calls: Mutex<Vec<TransferCall>>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTransfer {
    pub fn fail_for(&self, destination_key: &str) {
        self.failing.lock().insert(destination_key.to_string());
    }

    pub fn panic_for(&self, destination_key: &str) {
        self.panicking.lock().insert(destination_key.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> Vec<TransferCall> {
        self.calls.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn key_of(destination: &Path) -> String {
    destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl TransferService for FakeTransfer {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn transfer(&self, destination: &Path, sources: &[String]) -> Result<TransferReport> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().push(TransferCall {
            destination: destination.to_path_buf(),
            sources: sources.to_vec(),
        });

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let key = key_of(destination);
        if self.panicking.lock().contains(&key) {
            panic!("transfer backend crashed for {key}");
        }
        if self.failing.lock().contains(&key) {
            return Err(Error::transfer("FLOOD_WAIT: retry later"));
        }
        Ok(TransferReport {
            detail: format!("{} files", sources.len()),
            elapsed: delay,
        })
    }
}

pub struct Harness {
    pub scheduler: BatchScheduler,
    pub notifier: Arc<RecordingNotifier>,
    pub transfer: Arc<FakeTransfer>,
}

pub fn harness() -> Harness {
    harness_with(SchedulerConfig::default())
}

pub fn harness_with(config: SchedulerConfig) -> Harness {
    let notifier = Arc::new(RecordingNotifier::default());
    let transfer = Arc::new(FakeTransfer::default());
    let scheduler = BatchScheduler::new(
        config,
        PathBuf::from("/downloads"),
        transfer.clone(),
        notifier.clone(),
    );
    Harness {
        scheduler,
        notifier,
        transfer,
    }
}

pub fn handle(n: i64) -> NotificationHandle {
    NotificationHandle::new(100, n)
}
