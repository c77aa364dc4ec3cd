use chrono::{DateTime, Utc};
use tokio::time::Instant;
use uuid::Uuid;

use crate::notify::NotificationHandle;

/// One unit of requested work.
///
/// Immutable once created. Two requests with the same source locator are
/// still distinct work items; identity is the generated `id`.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    id: Uuid,
    source: String,
    destination_key: String,
    handle: Option<NotificationHandle>,
    arrived_at: Instant,
    submitted_at: DateTime<Utc>,
}

impl DownloadRequest {
    pub fn new(
        source: impl Into<String>,
        destination_key: impl Into<String>,
        handle: Option<NotificationHandle>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            destination_key: destination_key.into(),
            handle,
            arrived_at: Instant::now(),
            submitted_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Locator of what to fetch.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Key selecting the output location; equal keys are transferred together.
    pub fn destination_key(&self) -> &str {
        &self.destination_key
    }

    pub fn handle(&self) -> Option<&NotificationHandle> {
        self.handle.as_ref()
    }

    pub fn arrived_at(&self) -> Instant {
        self.arrived_at
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}
