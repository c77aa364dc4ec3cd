//! Bulk transfer of source locators into a destination directory.

mod tdl;

pub use tdl::{TdlConfig, TdlTransfer};

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Outcome of a successful transfer.
#[derive(Debug, Clone, Default)]
pub struct TransferReport {
    /// Free-form detail from the transfer backend.
    pub detail: String,
    pub elapsed: Duration,
}

/// Performs one bulk transfer.
///
/// Called one invocation at a time by the scheduler. A returned error marks
/// every request of the group as failed.
#[async_trait]
pub trait TransferService: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transfer(&self, destination: &Path, sources: &[String]) -> Result<TransferReport>;
}
