//! Main daemon event loop

use presence_core::ipc::PresenceTransport;
use presence_core::{Flow, PresenceEvent, PresenceMachine, StartupError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Bound on queued events; adapters wait when it is full.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// Start the machine while the queue is already live.
///
/// A terminate request dequeued before startup completes abandons the
/// pending connect and stops the machine. Any other event is held back and
/// applied in arrival order once startup is done. Returns [`Flow::Stop`] when
/// the machine is already stopped and the loop need not run.
pub async fn start<T: PresenceTransport>(
    machine: &mut PresenceMachine<T>,
    events: &mut mpsc::Receiver<PresenceEvent>,
) -> Result<Flow, StartupError> {
    let mut deferred = Vec::new();
    let started = {
        let startup = machine.start();
        tokio::pin!(startup);
        loop {
            tokio::select! {
                result = &mut startup => break Some(result),
                Some(event) = events.recv() => {
                    if event == PresenceEvent::TerminateRequested {
                        break None;
                    }
                    debug!("Deferring {} until startup completes", event);
                    deferred.push(event);
                }
            }
        }
    };

    match started {
        Some(result) => result?,
        None => {
            info!("Terminate requested during startup");
            return Ok(machine.handle(PresenceEvent::TerminateRequested).await);
        }
    }

    for event in deferred {
        if machine.handle(event).await == Flow::Stop {
            return Ok(Flow::Stop);
        }
    }
    Ok(Flow::Continue)
}

/// Run the main daemon event loop.
///
/// Events are taken off `events` one at a time and each is handled to
/// completion before the next is dequeued, so adapters can fire concurrently
/// without ever re-entering the machine. Returns once the machine stops.
/// If every sender is dropped the loop terminates the machine itself.
pub async fn run<T: PresenceTransport>(
    machine: &mut PresenceMachine<T>,
    mut events: mpsc::Receiver<PresenceEvent>,
) {
    info!("Process is running. Press Ctrl+C to exit.");

    loop {
        let event = match events.recv().await {
            Some(event) => event,
            None => {
                warn!("All event sources closed; shutting down");
                PresenceEvent::TerminateRequested
            }
        };
        debug!("Dequeued {}", event);

        if machine.handle(event).await == Flow::Stop {
            break;
        }
    }

    info!("Event loop stopped");
}
