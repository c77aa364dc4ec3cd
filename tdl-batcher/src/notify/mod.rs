//! Status delivery to requesters.
//!
//! A [`NotificationHandle`] points at a status message that was already sent
//! and is revised in place on every update, so repeated updates with the
//! same text leave the visible state unchanged.

mod log;
mod telegram;

pub use log::LogNotifier;
pub use telegram::{TelegramConfig, TelegramNotifier};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Reference to a previously delivered status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationHandle {
    pub chat_id: i64,
    pub message_id: i64,
}

impl NotificationHandle {
    pub fn new(chat_id: i64, message_id: i64) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

impl std::fmt::Display for NotificationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.chat_id, self.message_id)
    }
}

/// Renders and delivers status text for a handle.
///
/// Implementations overwrite the message behind the handle; they never append.
#[async_trait]
pub trait NotificationAdapter: Send + Sync {
    /// Short adapter name for logs.
    fn name(&self) -> &'static str;

    /// Replace the status text shown for `handle`.
    ///
    /// `formatted` marks text that carries markup for the adapter's parse mode.
    async fn update_status(
        &self,
        handle: &NotificationHandle,
        text: &str,
        formatted: bool,
    ) -> Result<()>;
}
