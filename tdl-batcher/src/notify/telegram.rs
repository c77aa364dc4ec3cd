//! Telegram Bot API notifier.
//!
//! Status messages are revised with `editMessageText`. Rate limits (HTTP 429)
//! are retried after the `parameters.retry_after` delay from the response.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{NotificationAdapter, NotificationHandle};
use crate::{Error, Result};

/// Maximum number of attempts for a rate-limited request.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Telegram message text limit (characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

fn default_parse_mode() -> String {
    "MarkdownV2".to_string()
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token. Notifications go to the log when unset.
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Parse mode used for formatted updates.
    #[serde(default = "default_parse_mode")]
    pub parse_mode: String,
    /// Bot API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            parse_mode: default_parse_mode(),
            api_base: default_api_base(),
        }
    }
}

fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// How a failed Bot API call should be treated.
#[derive(Debug, Clone, PartialEq)]
enum ApiFailure {
    /// Same text as before; the visible state already matches.
    NotModified,
    RateLimited(Option<Duration>),
    Rejected(String),
}

fn classify_failure(status: u16, body: &Value) -> ApiFailure {
    let description = body
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if status == 429 {
        let retry_after = body
            .get("parameters")
            .and_then(|p| p.get("retry_after"))
            .and_then(Value::as_u64)
            .map(Duration::from_secs);
        return ApiFailure::RateLimited(retry_after);
    }

    if description.contains("message is not modified") {
        return ApiFailure::NotModified;
    }

    ApiFailure::Rejected(format!("{} - {}", status, description))
}

/// Notifier backed by the Telegram Bot API.
pub struct TelegramNotifier {
    config: TelegramConfig,
    token: String,
    client: Client,
}

impl TelegramNotifier {
    /// Returns `None` when no bot token is configured.
    pub fn from_config(config: &TelegramConfig) -> Option<Self> {
        let token = config.bot_token.clone().filter(|t| !t.trim().is_empty())?;
        install_rustls_provider();
        Some(Self {
            config: config.clone(),
            token,
            client: Client::new(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.token,
            method
        )
    }

    fn edit_payload(&self, handle: &NotificationHandle, text: &str, formatted: bool) -> Value {
        let mut payload = json!({
            "chat_id": handle.chat_id,
            "message_id": handle.message_id,
            "text": truncate_message(text, TELEGRAM_MESSAGE_LIMIT, formatted),
        });
        if formatted {
            payload["parse_mode"] = Value::String(self.config.parse_mode.clone());
        }
        payload
    }

    /// Send a new plain status message and return a handle to it.
    pub async fn send_placeholder(&self, chat_id: i64, text: &str) -> Result<NotificationHandle> {
        let payload = json!({
            "chat_id": chat_id,
            "text": truncate_message(text, TELEGRAM_MESSAGE_LIMIT, false),
        });
        let body = self.call("sendMessage", &payload).await?;
        let message_id = body
            .get("result")
            .and_then(|r| r.get("message_id"))
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::notification("sendMessage response without message_id"))?;
        Ok(NotificationHandle::new(chat_id, message_id))
    }

    /// Call a Bot API method, retrying on rate limits.
    async fn call(&self, method: &str, payload: &Value) -> Result<Value> {
        let url = self.method_url(method);
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(&url)
                .json(payload)
                .send()
                .await
                .map_err(|e| Error::notification(format!("Telegram request failed: {}", e)))?;

            let status = response.status();
            let body: Value = response.json().await.unwrap_or_default();

            if status.is_success() {
                return Ok(body);
            }

            match classify_failure(status.as_u16(), &body) {
                ApiFailure::NotModified => {
                    debug!(method, "Telegram message already up to date");
                    return Ok(body);
                }
                ApiFailure::RateLimited(retry_after) => {
                    if attempts >= MAX_RATE_LIMIT_RETRIES {
                        warn!(
                            method,
                            ?retry_after,
                            "Telegram rate limit: max retries ({}) exceeded",
                            MAX_RATE_LIMIT_RETRIES
                        );
                        return Err(Error::notification(format!(
                            "Telegram rate limit exceeded after {} retries",
                            MAX_RATE_LIMIT_RETRIES
                        )));
                    }
                    let wait = retry_after.unwrap_or(Duration::from_secs(1));
                    debug!(
                        method,
                        "Telegram rate limited, waiting {:?} (attempt {}/{})",
                        wait,
                        attempts,
                        MAX_RATE_LIMIT_RETRIES
                    );
                    tokio::time::sleep(wait).await;
                }
                ApiFailure::Rejected(detail) => {
                    return Err(Error::notification(format!(
                        "Telegram {} failed: {}",
                        method, detail
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl NotificationAdapter for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn update_status(
        &self,
        handle: &NotificationHandle,
        text: &str,
        formatted: bool,
    ) -> Result<()> {
        let payload = self.edit_payload(handle, text, formatted);
        match self.call("editMessageText", &payload).await {
            Ok(_) => Ok(()),
            Err(e) if formatted => {
                // Markup the server refuses to parse still deserves a plain update.
                warn!(handle = %handle, error = %e, "Formatted update rejected, retrying as plain text");
                let plain = self.edit_payload(handle, text, false);
                self.call("editMessageText", &plain).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }
}

/// Truncate a message to fit within the Telegram character limit.
///
/// Formatted text gets a MarkdownV2-escaped suffix, and a cut never leaves a
/// dangling `\\` escape.
fn truncate_message(text: &str, limit: usize, formatted: bool) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = if formatted {
        "\n\n\\[truncated\\]"
    } else {
        "\n\n[truncated]"
    };
    let budget = limit - suffix.chars().count();
    let mut truncated: String = text.chars().take(budget).collect();
    if formatted {
        let trailing = truncated.chars().rev().take_while(|&c| c == '\\').count();
        if trailing % 2 == 1 {
            truncated.pop();
        }
    }
    format!("{truncated}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> TelegramNotifier {
        TelegramNotifier::from_config(&TelegramConfig {
            bot_token: Some("123:ABC".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_missing_token_disables_notifier() {
        assert!(TelegramNotifier::from_config(&TelegramConfig::default()).is_none());

        let blank = TelegramConfig {
            bot_token: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(TelegramNotifier::from_config(&blank).is_none());
    }

    #[test]
    fn test_method_url() {
        let notifier = TelegramNotifier::from_config(&TelegramConfig {
            bot_token: Some("tok".to_string()),
            api_base: "http://localhost:8081/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            notifier.method_url("editMessageText"),
            "http://localhost:8081/bottok/editMessageText"
        );
    }

    #[test]
    fn test_edit_payload_parse_mode_only_when_formatted() {
        let notifier = notifier();
        let handle = NotificationHandle::new(42, 7);

        let formatted = notifier.edit_payload(&handle, "*done*", true);
        assert_eq!(formatted["parse_mode"], "MarkdownV2");
        assert_eq!(formatted["message_id"], 7);

        let plain = notifier.edit_payload(&handle, "done", false);
        assert!(plain.get("parse_mode").is_none());
        assert_eq!(plain["chat_id"], 42);
    }

    #[test]
    fn test_classify_rate_limit() {
        let body = json!({"ok": false, "parameters": {"retry_after": 5}});
        assert_eq!(
            classify_failure(429, &body),
            ApiFailure::RateLimited(Some(Duration::from_secs(5)))
        );
    }

    #[test]
    fn test_classify_not_modified_is_benign() {
        let body = json!({
            "ok": false,
            "description": "Bad Request: message is not modified: specified new message content and reply markup are exactly the same"
        });
        assert_eq!(classify_failure(400, &body), ApiFailure::NotModified);
    }

    #[test]
    fn test_classify_rejected() {
        let body = json!({"ok": false, "description": "Bad Request: can't parse entities"});
        match classify_failure(400, &body) {
            ApiFailure::Rejected(detail) => assert!(detail.contains("can't parse entities")),
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_truncate_message() {
        assert_eq!(truncate_message("hello", 100, false), "hello");

        let long: String = "a".repeat(5000);
        let truncated = truncate_message(&long, TELEGRAM_MESSAGE_LIMIT, false);
        assert!(truncated.chars().count() <= TELEGRAM_MESSAGE_LIMIT);
        assert!(truncated.ends_with("\n\n[truncated]"));
    }

    #[test]
    fn test_truncate_formatted_escapes_suffix() {
        let long: String = "a".repeat(5000);
        let truncated = truncate_message(&long, TELEGRAM_MESSAGE_LIMIT, true);
        assert!(truncated.chars().count() <= TELEGRAM_MESSAGE_LIMIT);
        assert!(truncated.ends_with("\n\n\\[truncated\\]"));
    }

    #[test]
    fn test_truncate_formatted_keeps_escape_pairs() {
        // The cut would land between the backslash and the escaped dot.
        let text = "ab\\.cdefghijklmnopqrstu";
        let truncated = truncate_message(text, 18, true);
        assert_eq!(truncated, "ab\n\n\\[truncated\\]");

        // An escaped backslash is a complete pair and stays.
        let pair = truncate_message("ab\\\\cdefghijklmnopqrstu", 19, true);
        assert_eq!(pair, "ab\\\\\n\n\\[truncated\\]");

        let kept = truncate_message("abc\\.defghijklmnopqrstuvwxyz", 20, true);
        assert_eq!(kept, "abc\\.\n\n\\[truncated\\]");
    }

    #[test]
    fn test_edit_payload_truncates_long_formatted_text() {
        let notifier = notifier();
        let handle = NotificationHandle::new(1, 2);
        let long = format!("✅ *Done\\!*\n{}", "x".repeat(5000));

        let payload = notifier.edit_payload(&handle, &long, true);
        let text = payload["text"].as_str().unwrap();
        assert!(text.chars().count() <= TELEGRAM_MESSAGE_LIMIT);
        assert!(text.ends_with("\\[truncated\\]"));
    }
}
