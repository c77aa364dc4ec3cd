//! Tracing subscriber setup.
//!
//! Console output always; a daily-rotated log file when a directory is
//! configured. Timestamps use the local timezone.

use std::path::Path;

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::LoggingSettings;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "tdl_batcher=info,process_utils=info";

/// Prefix of rotated log files.
const LOG_FILE_PREFIX: &str = "tdl-batcher.log";

/// Formats timestamps in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Verbosity override requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    #[default]
    Configured,
    Verbose,
    Quiet,
}

/// Pick the filter: CLI override, then `RUST_LOG`, then the configured directive.
fn build_filter(settings: &LoggingSettings, verbosity: Verbosity) -> EnvFilter {
    let env_directive = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    filter_from(settings, verbosity, env_directive.as_deref())
}

fn filter_from(
    settings: &LoggingSettings,
    verbosity: Verbosity,
    env_directive: Option<&str>,
) -> EnvFilter {
    match verbosity {
        Verbosity::Verbose => EnvFilter::new("tdl_batcher=debug,process_utils=debug"),
        Verbosity::Quiet => EnvFilter::new("error"),
        Verbosity::Configured => env_directive
            .and_then(|directive| EnvFilter::try_new(directive).ok())
            .or_else(|| EnvFilter::try_new(&settings.filter).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER)),
    }
}

/// Initialize the global subscriber.
///
/// Keep the returned guard alive for the lifetime of the process, otherwise
/// buffered file output is lost.
pub fn init_logging(
    settings: &LoggingSettings,
    verbosity: Verbosity,
) -> crate::Result<Option<WorkerGuard>> {
    let filter = build_filter(settings, verbosity);
    let console = fmt::layer().with_ansi(true).with_timer(LocalTimer);

    let (file_layer, guard) = match settings.log_dir.as_deref() {
        Some(dir) => {
            let (layer, guard) = file_layer(dir)?;
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    Ok(guard)
}

fn file_layer<S>(
    dir: &Path,
) -> crate::Result<(Box<dyn Layer<S> + Send + Sync + 'static>, WorkerGuard)>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_timer(LocalTimer)
        .boxed();
    Ok((layer, guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(filter: &str) -> LoggingSettings {
        LoggingSettings {
            filter: filter.to_string(),
            log_dir: None,
        }
    }

    #[test]
    fn test_configured_filter_used_without_rust_log() {
        let filter = filter_from(&settings("tdl_batcher=warn"), Verbosity::Configured, None);
        assert_eq!(filter.to_string(), "tdl_batcher=warn");
    }

    #[test]
    fn test_rust_log_beats_configured_filter() {
        let filter = filter_from(
            &settings("tdl_batcher=warn"),
            Verbosity::Configured,
            Some("tdl_batcher=trace"),
        );
        assert_eq!(filter.to_string(), "tdl_batcher=trace");
    }

    #[test]
    fn test_invalid_directives_fall_back_to_default() {
        let filter = filter_from(
            &settings("tdl_batcher=loud"),
            Verbosity::Configured,
            Some("process_utils=noisy"),
        );
        let rendered = filter.to_string();
        assert!(rendered.contains("tdl_batcher=info"), "{rendered}");
        assert!(rendered.contains("process_utils=info"), "{rendered}");
    }

    #[test]
    fn test_verbosity_overrides_configured_filter() {
        let settings = LoggingSettings {
            filter: "tdl_batcher=warn".to_string(),
            log_dir: None,
        };
        let filter = build_filter(&settings, Verbosity::Quiet);
        assert_eq!(filter.to_string(), "error");

        let filter = build_filter(&settings, Verbosity::Verbose);
        assert!(filter.to_string().contains("tdl_batcher=debug"));
    }
}
