//! presenced - keeps a host activity status in sync with a config file

use anyhow::{Context, Result};
use clap::Parser;
use presence_core::config::resolve_config_path;
use presence_core::ipc::DiscordIpc;
use presence_core::{ConfigFile, Flow, PresenceMachine, SystemClock};
use presence_daemon::daemon;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// presenced - publish an activity status from a config file
#[derive(Parser, Debug)]
#[command(name = "presenced")]
#[command(about = "Publish an activity status to the local host from a config file")]
#[command(version)]
struct Args {
    /// Reload the configuration whenever the file changes
    #[arg(short, long)]
    watch: bool,

    /// Bare `watch` word, same as --watch
    #[arg(value_name = "MODE", value_parser = ["watch"], hide = true)]
    mode: Option<String>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn watch_enabled(&self) -> bool {
        self.watch || self.mode.is_some()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    presence_core::logging::init(args.verbose);

    let current_dir = std::env::current_dir().context("Failed to get current directory")?;
    let config_path = resolve_config_path(args.config.as_deref(), &current_dir);
    info!("Using configuration file {}", config_path.display());

    let mut machine = PresenceMachine::new(
        DiscordIpc::new(),
        ConfigFile::new(&config_path),
        Arc::new(SystemClock),
    );

    // Adapters are live before startup so signals during the first connect
    // are queued instead of taking their default action.
    let (event_tx, mut event_rx) = mpsc::channel(daemon::EVENT_QUEUE_CAPACITY);
    let cancel = CancellationToken::new();

    let signal_tasks = daemon::forward_signals(event_tx.clone(), cancel.clone())
        .context("Failed to install signal handlers")?;

    // Fatal misconfiguration exits non-zero before any connection attempt.
    let flow = match daemon::start(&mut machine, &mut event_rx).await {
        Ok(flow) => flow,
        Err(e) => {
            cancel.cancel();
            return Err(e).context("Failed to start presence");
        }
    };

    let watcher_task = if args.watch_enabled() && flow == Flow::Continue {
        let watcher_tx = event_tx.clone();
        let watcher_cancel = cancel.clone();
        let watched = config_path.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = daemon::watch_config(watched, watcher_tx, watcher_cancel).await {
                error!("Configuration watcher failed: {:#}", e);
            }
        }))
    } else {
        None
    };

    // The loop owns the queue from here; adapters hold the only senders.
    drop(event_tx);
    if flow == Flow::Continue {
        daemon::run(&mut machine, event_rx).await;
    }

    cancel.cancel();
    if let Some(task) = watcher_task
        && let Err(e) = tokio::time::timeout(Duration::from_secs(5), task).await
    {
        error!("Watcher task did not complete in time: {}", e);
    }
    for task in signal_tasks {
        if let Err(e) = task.await {
            error!("Signal task panicked: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}
