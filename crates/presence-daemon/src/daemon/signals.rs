//! Process signal adapter
//!
//! Subscribes to every notification in [`ProcessSignal`]'s table for this
//! platform and forwards each delivery into the event queue as the mapped
//! [`PresenceEvent`]. One small task per signal; none of them touches the
//! state machine directly.

use anyhow::{Context, Result};
use presence_core::{PresenceEvent, ProcessSignal};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Register all signal handlers and spawn their forwarding tasks.
///
/// Fails if any handler cannot be registered. Tasks end when `cancel` fires
/// or the queue closes.
pub fn forward_signals(
    event_tx: mpsc::Sender<PresenceEvent>,
    cancel: CancellationToken,
) -> Result<Vec<JoinHandle<()>>> {
    platform::forward(event_tx, cancel)
}

async fn deliver(signal: ProcessSignal, event_tx: &mpsc::Sender<PresenceEvent>) -> bool {
    let event = signal.event();
    info!("Received {} -> {}", signal.name(), event);
    if event_tx.send(event).await.is_err() {
        warn!("Event queue closed; dropping {}", signal.name());
        return false;
    }
    true
}

#[cfg(unix)]
mod platform {
    use super::*;
    use tokio::signal::unix::{SignalKind, signal};

    fn signal_kind(sig: ProcessSignal) -> Option<SignalKind> {
        let kind = match sig {
            ProcessSignal::Interrupt => SignalKind::interrupt(),
            ProcessSignal::Terminate => SignalKind::terminate(),
            ProcessSignal::Hangup => SignalKind::hangup(),
            ProcessSignal::Quit => SignalKind::quit(),
            ProcessSignal::TerminalStop => SignalKind::from_raw(libc::SIGTSTP),
            ProcessSignal::Continue => SignalKind::from_raw(libc::SIGCONT),
            ProcessSignal::User1 => SignalKind::user_defined1(),
            ProcessSignal::User2 => SignalKind::user_defined2(),
            _ => return None,
        };
        Some(kind)
    }

    pub(super) fn forward(
        event_tx: mpsc::Sender<PresenceEvent>,
        cancel: CancellationToken,
    ) -> Result<Vec<JoinHandle<()>>> {
        let mut tasks = Vec::new();

        for &sig in ProcessSignal::UNIX {
            let Some(kind) = signal_kind(sig) else { continue };
            let mut stream = signal(kind)
                .with_context(|| format!("Failed to create {} handler", sig.name()))?;
            let event_tx = event_tx.clone();
            let cancel = cancel.clone();

            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = stream.recv() => {
                            if received.is_none() || !deliver(sig, &event_tx).await {
                                break;
                            }
                        }
                    }
                }
                debug!("{} forwarder stopped", sig.name());
            }));
        }

        Ok(tasks)
    }

}

#[cfg(windows)]
mod platform {
    use super::*;
    use tokio::signal::windows;

    macro_rules! spawn_forwarder {
        ($tasks:ident, $sig:expr, $ctor:path, $event_tx:ident, $cancel:ident) => {{
            let sig = $sig;
            let mut stream =
                $ctor().with_context(|| format!("Failed to create {} handler", sig.name()))?;
            let event_tx = $event_tx.clone();
            let cancel = $cancel.clone();
            $tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = stream.recv() => {
                            if received.is_none() || !deliver(sig, &event_tx).await {
                                break;
                            }
                        }
                    }
                }
                debug!("{} forwarder stopped", sig.name());
            }));
        }};
    }

    pub(super) fn forward(
        event_tx: mpsc::Sender<PresenceEvent>,
        cancel: CancellationToken,
    ) -> Result<Vec<JoinHandle<()>>> {
        let mut tasks = Vec::new();
        spawn_forwarder!(tasks, ProcessSignal::CtrlC, windows::ctrl_c, event_tx, cancel);
        spawn_forwarder!(tasks, ProcessSignal::CtrlBreak, windows::ctrl_break, event_tx, cancel);
        spawn_forwarder!(tasks, ProcessSignal::CtrlClose, windows::ctrl_close, event_tx, cancel);
        spawn_forwarder!(
            tasks,
            ProcessSignal::CtrlShutdown,
            windows::ctrl_shutdown,
            event_tx,
            cancel
        );
        Ok(tasks)
    }
}

#[cfg(not(any(unix, windows)))]
mod platform {
    use super::*;

    pub(super) fn forward(
        _event_tx: mpsc::Sender<PresenceEvent>,
        _cancel: CancellationToken,
    ) -> Result<Vec<JoinHandle<()>>> {
        warn!("Process signals are not supported on this platform");
        Ok(Vec::new())
    }
}
