//! Client for the desktop host's local IPC socket.
//!
//! The host listens on a Unix domain socket (Unix) or named pipe (Windows):
//!
//! ```text
//! ${XDG_RUNTIME_DIR | TMPDIR | TMP | TEMP | /tmp}/discord-ipc-{0..9}
//! \\?\pipe\discord-ipc-{0..9}
//! ```
//!
//! After connecting, the client sends a handshake frame and waits for the
//! `READY` dispatch. Commands are JSON frames carrying a `nonce` that the host
//! echoes in its reply:
//!
//! ```json
//! // Request
//! {"cmd":"SET_ACTIVITY","args":{"pid":4242,"activity":{"name":"Editor","timestamps":{"start":1700000000}}},"nonce":"uuid"}
//! // Response
//! {"cmd":"SET_ACTIVITY","evt":null,"data":{...},"nonce":"uuid"}
//! ```

use super::frame::{Frame, Opcode, read_frame, write_frame};
use super::{PresenceTransport, Result, TransportError};
use crate::activity::Activity;
use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

/// Protocol version sent in the handshake.
pub const RPC_VERSION: u32 = 1;

/// Number of numbered endpoints probed per directory.
const ENDPOINT_SLOTS: usize = 10;

trait IpcStream: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

impl<S: AsyncRead + AsyncWrite + Unpin + Send + Sync> IpcStream for S {}

/// Production [`PresenceTransport`].
pub struct DiscordIpc {
    endpoints: Vec<PathBuf>,
    stream: Option<Box<dyn IpcStream>>,
    pid: u32,
}

impl std::fmt::Debug for DiscordIpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordIpc")
            .field("endpoints", &self.endpoints.len())
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

impl Default for DiscordIpc {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscordIpc {
    /// Client probing the platform's well-known endpoints.
    pub fn new() -> Self {
        Self::with_endpoints(default_endpoints())
    }

    /// Client probing exactly `endpoints`, in order.
    pub fn with_endpoints(endpoints: Vec<PathBuf>) -> Self {
        Self {
            endpoints,
            stream: None,
            pid: std::process::id(),
        }
    }

    async fn open(&self) -> Result<Box<dyn IpcStream>> {
        let mut last_error = None;
        for endpoint in &self.endpoints {
            match open_endpoint(endpoint).await {
                Ok(stream) => {
                    debug!("Connected to IPC endpoint {}", endpoint.display());
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) if e.kind() != std::io::ErrorKind::NotFound
                && e.kind() != std::io::ErrorKind::ConnectionRefused =>
            {
                Err(TransportError::Io(e))
            }
            _ => Err(TransportError::NotFound {
                tried: self.endpoints.len(),
            }),
        }
    }

    /// Send a command and wait for the reply carrying the same nonce.
    async fn command(&mut self, cmd: &str, args: serde_json::Value) -> Result<serde_json::Value> {
        let nonce = uuid::Uuid::new_v4().to_string();
        let request = Frame::new(
            Opcode::Frame,
            json!({ "cmd": cmd, "args": args, "nonce": nonce }),
        );

        let result = self.exchange(&request, &nonce).await;
        if matches!(result, Err(TransportError::Closed { .. })) {
            self.stream = None;
        }
        result
    }

    async fn exchange(&mut self, request: &Frame, nonce: &str) -> Result<serde_json::Value> {
        let stream = self.stream.as_mut().ok_or_else(|| TransportError::Closed {
            message: "not connected".to_string(),
        })?;

        write_frame(stream, request).await.map_err(closed)?;

        loop {
            let reply = read_frame(stream).await.map_err(closed)?;
            match reply.opcode {
                Opcode::Ping => {
                    write_frame(stream, &Frame::new(Opcode::Pong, reply.payload))
                        .await
                        .map_err(closed)?;
                }
                Opcode::Close => {
                    return Err(TransportError::Closed {
                        message: error_message(&reply.payload),
                    });
                }
                Opcode::Frame if reply.field("nonce") == Some(nonce) => {
                    if reply.field("evt") == Some("ERROR") {
                        return Err(TransportError::Rejected {
                            message: error_message(&reply.payload),
                        });
                    }
                    return Ok(reply.payload);
                }
                _ => debug!("Ignoring unsolicited {:?} frame", reply.opcode),
            }
        }
    }
}

#[async_trait]
impl PresenceTransport for DiscordIpc {
    async fn connect(&mut self, application_id: &str) -> Result<()> {
        let mut stream = self.open().await?;

        let handshake = Frame::new(
            Opcode::Handshake,
            json!({ "v": RPC_VERSION, "client_id": application_id }),
        );
        write_frame(&mut stream, &handshake).await?;

        let reply = read_frame(&mut stream).await?;
        match reply.opcode {
            Opcode::Frame if reply.field("evt") == Some("READY") => {
                self.stream = Some(stream);
                Ok(())
            }
            Opcode::Close => Err(TransportError::Rejected {
                message: error_message(&reply.payload),
            }),
            Opcode::Frame if reply.field("evt") == Some("ERROR") => {
                Err(TransportError::Rejected {
                    message: error_message(&reply.payload),
                })
            }
            other => Err(TransportError::Protocol {
                message: format!("unexpected {other:?} frame during handshake"),
            }),
        }
    }

    async fn set_activity(&mut self, activity: &Activity) -> Result<()> {
        let activity = serde_json::to_value(activity).map_err(|e| TransportError::Protocol {
            message: format!("failed to encode activity: {e}"),
        })?;
        self.command("SET_ACTIVITY", json!({ "pid": self.pid, "activity": activity }))
            .await
            .map(|_| ())
    }

    async fn clear_activity(&mut self) -> Result<()> {
        self.command("SET_ACTIVITY", json!({ "pid": self.pid, "activity": null }))
            .await
            .map(|_| ())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };

        if let Err(e) = write_frame(&mut stream, &Frame::new(Opcode::Close, json!({}))).await {
            warn!("Failed to send close frame: {}", e);
            return Err(closed(e));
        }
        Ok(())
    }
}

/// Pull a human-readable message out of an error or close payload.
fn error_message(payload: &serde_json::Value) -> String {
    payload
        .get("message")
        .or_else(|| payload.pointer("/data/message"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| payload.to_string())
}

/// Any failure mid-session means the session is gone. A protocol error
/// leaves the stream out of frame alignment, so it closes the session too.
fn closed(err: TransportError) -> TransportError {
    match err {
        TransportError::Io(e) => TransportError::Closed {
            message: e.to_string(),
        },
        TransportError::Protocol { message } => TransportError::Closed { message },
        other => other,
    }
}

#[cfg(unix)]
async fn open_endpoint(path: &std::path::Path) -> std::io::Result<Box<dyn IpcStream>> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    Ok(Box::new(stream))
}

#[cfg(windows)]
async fn open_endpoint(path: &std::path::Path) -> std::io::Result<Box<dyn IpcStream>> {
    let client = tokio::net::windows::named_pipe::ClientOptions::new().open(path)?;
    Ok(Box::new(client))
}

#[cfg(not(any(unix, windows)))]
async fn open_endpoint(_path: &std::path::Path) -> std::io::Result<Box<dyn IpcStream>> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
}

/// Well-known endpoints for the current platform, in probe order.
pub fn default_endpoints() -> Vec<PathBuf> {
    #[cfg(windows)]
    {
        (0..ENDPOINT_SLOTS)
            .map(|i| PathBuf::from(format!(r"\\?\pipe\discord-ipc-{i}")))
            .collect()
    }

    #[cfg(not(windows))]
    {
        let mut dirs: Vec<PathBuf> = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
            .iter()
            .filter_map(|var| std::env::var_os(var))
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .collect();
        dirs.push(PathBuf::from("/tmp"));
        dirs.dedup();

        dirs.iter()
            .flat_map(|dir| (0..ENDPOINT_SLOTS).map(move |i| dir.join(format!("discord-ipc-{i}"))))
            .collect()
    }
}
