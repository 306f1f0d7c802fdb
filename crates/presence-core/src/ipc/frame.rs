//! Length-prefixed frame codec for the host IPC socket
//!
//! Each frame is an 8-byte header (little-endian `u32` opcode, then
//! little-endian `u32` payload length) followed by a UTF-8 JSON payload.

use super::{Result, TransportError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload we accept from the host.
pub const MAX_PAYLOAD: usize = 64 * 1024;

const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Handshake,
    Frame,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    pub fn code(self) -> u32 {
        match self {
            Self::Handshake => 0,
            Self::Frame => 1,
            Self::Close => 2,
            Self::Ping => 3,
            Self::Pong => 4,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Handshake),
            1 => Some(Self::Frame),
            2 => Some(Self::Close),
            3 => Some(Self::Ping),
            4 => Some(Self::Pong),
            _ => None,
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub opcode: Opcode,
    pub payload: serde_json::Value,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: serde_json::Value) -> Self {
        Self { opcode, payload }
    }

    /// Header plus payload bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(&self.payload).map_err(|e| TransportError::Protocol {
            message: format!("failed to encode payload: {e}"),
        })?;
        let len = u32::try_from(body.len()).map_err(|_| TransportError::Protocol {
            message: format!("payload too large: {} bytes", body.len()),
        })?;

        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(&self.opcode.code().to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Top-level string field of the payload, if any.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes = frame.encode()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// I/O failures (including EOF) surface as [`TransportError::Io`]; malformed
/// headers or payloads as [`TransportError::Protocol`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;

    let code = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

    let opcode = Opcode::from_code(code).ok_or_else(|| TransportError::Protocol {
        message: format!("unknown opcode {code}"),
    })?;
    if len > MAX_PAYLOAD {
        return Err(TransportError::Protocol {
            message: format!("payload of {len} bytes exceeds limit of {MAX_PAYLOAD}"),
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    let payload = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| TransportError::Protocol {
            message: format!("invalid JSON payload: {e}"),
        })?
    };

    Ok(Frame { opcode, payload })
}
