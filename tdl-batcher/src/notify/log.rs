use async_trait::async_trait;
use tracing::info;

use super::{NotificationAdapter, NotificationHandle};
use crate::Result;

/// Notifier that only writes status updates to the log.
///
/// Used when no bot token is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationAdapter for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn update_status(
        &self,
        handle: &NotificationHandle,
        text: &str,
        formatted: bool,
    ) -> Result<()> {
        info!(handle = %handle, formatted, "{}", text);
        Ok(())
    }
}
