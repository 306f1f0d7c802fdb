//! Host process IPC
//!
//! [`PresenceTransport`] abstracts the local channel to the host. The
//! production implementation is [`DiscordIpc`]; [`MockTransport`] records
//! calls for tests.

pub mod discord;
pub mod frame;
pub mod mock;

pub use discord::DiscordIpc;
pub use mock::{MockCall, MockTransport};

use crate::activity::Activity;
use async_trait::async_trait;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No IPC endpoint accepted a connection
    #[error("no host IPC endpoint available (tried {tried})")]
    NotFound { tried: usize },

    /// IO error while connecting
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent something we could not understand
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// The host refused the handshake or a command
    #[error("host rejected request: {message}")]
    Rejected { message: String },

    /// The session ended underneath us
    #[error("connection closed: {message}")]
    Closed { message: String },
}

/// Channel to the host process.
///
/// `connect` includes the handshake; after it succeeds the session is ready
/// for `set_activity` / `clear_activity`. Implementations must be `Send` so
/// the daemon can own them inside its event loop task.
#[async_trait]
pub trait PresenceTransport: Send {
    /// Open the channel and log in as `application_id`.
    async fn connect(&mut self, application_id: &str) -> Result<()>;

    /// Publish (replace) the current activity.
    async fn set_activity(&mut self, activity: &Activity) -> Result<()>;

    /// Remove the current activity without closing the session.
    async fn clear_activity(&mut self) -> Result<()>;

    /// Close the session. Best-effort; the session is gone afterwards even if
    /// this returns an error.
    async fn disconnect(&mut self) -> Result<()>;
}
