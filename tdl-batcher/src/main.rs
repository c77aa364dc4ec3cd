use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tdl_batcher::config::AppConfig;
use tdl_batcher::ingest::extract_links;
use tdl_batcher::logging::{Verbosity, init_logging};
use tdl_batcher::notify::{LogNotifier, NotificationAdapter, NotificationHandle, TelegramNotifier};
use tdl_batcher::scheduler::BatchScheduler;
use tdl_batcher::transfer::{TdlTransfer, TransferService};

/// Batch Telegram post downloads through tdl.
#[derive(Parser, Debug)]
#[command(name = "tdl-batcher", version, about)]
struct Args {
    /// File with post links (any text; links are extracted). Reads stdin when omitted.
    input: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(short, long, env = "TDL_BATCHER_CONFIG")]
    config: Option<PathBuf>,

    /// Chat that receives one editable status message per input line.
    /// Requires a bot token.
    #[arg(long)]
    chat_id: Option<i64>,

    /// Seconds between status log lines.
    #[arg(long, default_value_t = 5)]
    status_interval: u64,

    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref()).context("loading configuration")?;

    let verbosity = if args.verbose {
        Verbosity::Verbose
    } else if args.quiet {
        Verbosity::Quiet
    } else {
        Verbosity::Configured
    };
    let _log_guard = init_logging(&config.logging, verbosity)?;

    let telegram = match (args.chat_id, TelegramNotifier::from_config(&config.telegram)) {
        (Some(_), Some(notifier)) => Some(Arc::new(notifier)),
        (Some(_), None) => {
            warn!("--chat-id given but no bot token configured; status goes to the log");
            None
        }
        _ => None,
    };
    let notifier: Arc<dyn NotificationAdapter> = match &telegram {
        Some(notifier) => notifier.clone(),
        None => Arc::new(LogNotifier),
    };
    let transfer: Arc<dyn TransferService> = Arc::new(TdlTransfer::new(
        config.tdl.clone(),
        config.scheduler.transfer_timeout(),
    ));

    let scheduler = BatchScheduler::new(
        config.scheduler.clone(),
        config.tdl.output_root.clone(),
        transfer,
        notifier,
    );
    info!(
        max_batch_size = config.scheduler.max_batch_size,
        batch_window_ms = config.scheduler.batch_window_ms,
        "Starting tdl-batcher"
    );

    // Handle Ctrl+C gracefully
    let cancel_token = CancellationToken::new();
    let cancel_clone = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        cancel_clone.cancel();
    });

    let input = read_input(args.input.as_deref()).await?;
    let mut submitted = 0usize;

    for (line_no, line) in input.lines().enumerate() {
        let links = extract_links(line);
        if links.is_empty() {
            if !line.trim().is_empty() {
                warn!(line = line_no + 1, "No Telegram post link found");
            }
            continue;
        }

        let handle = match (&telegram, args.chat_id) {
            (Some(telegram), Some(chat_id)) => {
                let text = if links.len() == 1 {
                    "⏳ Processing download request...".to_string()
                } else {
                    format!("⏳ Processing {} download requests...", links.len())
                };
                match telegram.send_placeholder(chat_id, &text).await {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        warn!(error = %e, "Failed to send status message");
                        None
                    }
                }
            }
            _ => Some(NotificationHandle::new(0, line_no as i64 + 1)),
        };

        for link in links {
            scheduler
                .submit(link.url.clone(), link.destination_key(), handle)
                .await;
            submitted += 1;
        }
    }

    if submitted == 0 {
        warn!("Nothing to download");
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(args.status_interval.max(1)));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                warn!("Interrupted, shutting down");
                scheduler.shutdown();
                break;
            }
            _ = scheduler.wait_idle() => break,
            _ = ticker.tick() => {
                let status = scheduler.status();
                info!(
                    queue_size = status.queue_len,
                    processing = status.is_processing,
                    completed = status.groups_completed,
                    failed = status.groups_failed,
                    pending = ?status.preview,
                    "Download queue status"
                );
            }
        }
    }

    let status = scheduler.status();
    println!("{}", serde_json::to_string_pretty(&status)?);

    if status.groups_failed > 0 {
        anyhow::bail!("{} download group(s) failed", status.groups_failed);
    }
    Ok(())
}

async fn read_input(path: Option<&std::path::Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .context("reading stdin")?;
            Ok(buffer)
        }
    }
}
