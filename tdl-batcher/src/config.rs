//! Application configuration.
//!
//! Settings come from an optional TOML file and are then overridden by the
//! environment (a `.env` file is honoured through `dotenvy`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::notify::TelegramConfig;
use crate::transfer::TdlConfig;
use crate::{Error, Result};

/// Environment variable holding the Telegram bot token.
pub const ENV_TELEGRAM_TOKEN: &str = "TELEGRAM_TOKEN";
/// Environment variable overriding the `tdl` binary location.
pub const ENV_TDL_PATH: &str = "TDL_PATH";
/// Environment variable overriding the download root directory.
pub const ENV_OUTPUT_ROOT: &str = "TDL_OUTPUT_ROOT";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub tdl: TdlConfig,
    pub telegram: TelegramConfig,
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Load configuration from `path` (if any), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file without applying overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
            .map_err(|e| Error::config(format!("invalid config file {}: {}", path.display(), e)))
    }

    pub fn from_toml(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(ENV_TELEGRAM_TOKEN).filter(|v| !v.trim().is_empty()) {
            debug!("Telegram bot token taken from environment");
            self.telegram.bot_token = Some(token);
        }
        if let Some(path) = lookup(ENV_TDL_PATH).filter(|v| !v.trim().is_empty()) {
            self.tdl.tdl_path = Some(path);
        }
        if let Some(root) = lookup(ENV_OUTPUT_ROOT).filter(|v| !v.trim().is_empty()) {
            self.tdl.output_root = PathBuf::from(root);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()
    }
}

fn default_max_batch_size() -> usize {
    20
}

fn default_batch_window_ms() -> u64 {
    3000
}

fn default_idle_wait_ms() -> u64 {
    1000
}

fn default_yield_delay_ms() -> u64 {
    100
}

fn default_transfer_timeout_secs() -> u64 {
    3600
}

fn default_status_preview() -> usize {
    3
}

/// Batching policy for the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of requests in one batch.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Collection window measured from the first request of a batch.
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,
    /// How long an empty queue is waited on before the batch is cut.
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,
    /// Pause between consecutive batches.
    #[serde(default = "default_yield_delay_ms")]
    pub yield_delay_ms: u64,
    /// Upper bound for a single transfer.
    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,
    /// Number of pending requests shown in a status snapshot.
    #[serde(default = "default_status_preview")]
    pub status_preview: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            batch_window_ms: default_batch_window_ms(),
            idle_wait_ms: default_idle_wait_ms(),
            yield_delay_ms: default_yield_delay_ms(),
            transfer_timeout_secs: default_transfer_timeout_secs(),
            status_preview: default_status_preview(),
        }
    }
}

impl SchedulerConfig {
    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn yield_delay(&self) -> Duration {
        Duration::from_millis(self.yield_delay_ms)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(Error::config("scheduler.max_batch_size must be at least 1"));
        }
        if self.batch_window_ms == 0 {
            return Err(Error::config("scheduler.batch_window_ms must be positive"));
        }
        if self.idle_wait_ms == 0 {
            return Err(Error::config("scheduler.idle_wait_ms must be positive"));
        }
        if self.transfer_timeout_secs == 0 {
            return Err(Error::config(
                "scheduler.transfer_timeout_secs must be positive",
            ));
        }
        Ok(())
    }
}

fn default_log_filter() -> String {
    crate::logging::DEFAULT_LOG_FILTER.to_string()
}

/// Logging output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Directory for daily-rotated log files. Console only when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            log_dir: None,
        }
    }
}
