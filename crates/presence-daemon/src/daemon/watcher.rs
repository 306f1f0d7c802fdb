//! File system watcher for the configuration file

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use presence_core::PresenceEvent;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Watch the configuration file for changes.
///
/// The parent directory is watched rather than the file itself so that
/// editors which save by writing a temporary file and renaming it over the
/// original keep producing events. Every create, modify or remove touching
/// the configuration file is forwarded as [`PresenceEvent::ConfigChanged`].
///
/// Runs until `cancel` fires or the notify channel disconnects.
pub async fn watch_config(
    config_path: PathBuf,
    event_tx: mpsc::Sender<PresenceEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    let watch_dir = match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    // Create a channel to receive file system events from notify
    let (tx, rx) = channel();

    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(e) = tx.send(event) {
                    error!("Failed to send file system event: {}", e);
                }
            }
            Err(e) => {
                error!("File system watcher error: {}", e);
            }
        })
        .context("Failed to create file system watcher")?;

    watcher
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", watch_dir.display()))?;

    info!(
        "Watching configuration file {} for changes...",
        config_path.display()
    );

    // notify delivers on its own thread; drain it from a blocking task and
    // hand relevant events to the async queue.
    let cancel_clone = cancel.clone();
    tokio::task::spawn_blocking(move || {
        loop {
            if cancel_clone.is_cancelled() {
                info!("Configuration watcher cancelled");
                break;
            }

            match rx.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(event) => {
                    debug!("File system event: {:?}", event);

                    if is_config_event(&config_path, &event)
                        && event_tx.blocking_send(PresenceEvent::ConfigChanged).is_err()
                    {
                        warn!("Event queue closed; stopping configuration watcher");
                        break;
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    warn!("Watcher channel disconnected");
                    break;
                }
            }
        }
    })
    .await
    .context("Watcher task panicked")?;

    // Keep the watcher alive until the drain loop is done.
    drop(watcher);
    info!("Configuration watcher closed");
    Ok(())
}

/// Whether a notify event concerns the configuration file.
///
/// Reads (access events) are ignored, otherwise every reload would trigger
/// the next one.
fn is_config_event(config_path: &Path, event: &Event) -> bool {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {}
        _ => return false,
    }

    let Some(name) = config_path.file_name() else {
        return false;
    };
    event.paths.iter().any(|path| path.file_name() == Some(name))
}
