//! Connection manager: the single logical session with the host.
//!
//! Owns the transport and the ground truth about whether a session is live.
//! `connect` and `disconnect` are idempotent; `publish` and `clear` refuse to
//! run without a session.

use crate::activity::Activity;
use crate::ipc::{PresenceTransport, TransportError};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ConnectionError {
    /// publish/clear called without a live session
    #[error("no live session with the host")]
    NotConnected,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub struct ConnectionManager<T> {
    transport: T,
    /// Application id of the live session, `None` when disconnected.
    session: Option<String>,
}

impl<T: PresenceTransport> ConnectionManager<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            session: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Application id the live session was opened with.
    pub fn session_application_id(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Open a session as `application_id`. No-op when one is already live.
    pub async fn connect(&mut self, application_id: &str) -> Result<(), ConnectionError> {
        if self.session.is_some() {
            debug!("Already connected; skipping connect");
            return Ok(());
        }

        self.transport.connect(application_id).await?;
        self.session = Some(application_id.to_string());
        info!("Logged in as application {}", application_id);
        Ok(())
    }

    /// Make sure the live session belongs to `application_id`, reconnecting
    /// if it was opened under a different one.
    pub async fn ensure_session(&mut self, application_id: &str) -> Result<(), ConnectionError> {
        if let Some(current) = self.session.as_deref()
            && current != application_id
        {
            info!(
                "Application id changed from {} to {}; reconnecting",
                current, application_id
            );
            self.disconnect().await;
        }
        self.connect(application_id).await
    }

    /// Close the session. No-op when disconnected; never fails.
    pub async fn disconnect(&mut self) {
        if self.session.is_none() {
            debug!("Already disconnected; skipping disconnect");
            return;
        }

        if let Err(e) = self.transport.disconnect().await {
            warn!("Error while disconnecting (session dropped anyway): {}", e);
        }
        self.session = None;
        info!("Disconnected");
    }

    pub async fn publish(&mut self, activity: &Activity) -> Result<(), ConnectionError> {
        if self.session.is_none() {
            return Err(ConnectionError::NotConnected);
        }
        let result = self.transport.set_activity(activity).await;
        self.observe(result)
    }

    pub async fn clear(&mut self) -> Result<(), ConnectionError> {
        if self.session.is_none() {
            return Err(ConnectionError::NotConnected);
        }
        let result = self.transport.clear_activity().await;
        self.observe(result)
    }

    /// A `Closed` error means the session no longer exists.
    fn observe(&mut self, result: Result<(), TransportError>) -> Result<(), ConnectionError> {
        if let Err(TransportError::Closed { message }) = &result {
            warn!("Host session closed: {}", message);
            self.session = None;
        }
        result.map_err(ConnectionError::from)
    }
}
