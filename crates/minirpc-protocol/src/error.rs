//! Protocol and call error types.

use thiserror::Error;

use crate::codec::CodecError;

/// Result type for framing and message operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors in the wire format.
///
/// Any of these while reading is fatal for the connection: the stream can no
/// longer be trusted to be positioned on a frame boundary.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Declared frame length exceeds [`MAX_FRAME_SIZE`](crate::MAX_FRAME_SIZE).
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: u64, max: u64 },

    /// The frame ended before a field could be read.
    #[error("truncated frame: needed {expected} bytes, got {received}")]
    Truncated { expected: usize, received: usize },

    /// A declared length disagrees with the bytes actually present.
    #[error("inconsistent {field} length: declared {declared}, actual {actual}")]
    LengthMismatch {
        field: &'static str,
        declared: u64,
        actual: u64,
    },

    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    /// Meta keys and values may not contain the `\r` / `\n` separators.
    #[error("invalid meta entry: {0}")]
    InvalidMeta(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for a single remote call.
pub type CallResult<T> = Result<T, CallError>;

/// Everything that can end a single remote call on the client side.
#[derive(Debug, Error)]
pub enum CallError {
    /// The stub was never bound with `Client::init_service`.
    #[error("stub {service}.{method} is not bound to a client")]
    Unbound { service: String, method: String },

    /// Every pooled connection stayed checked out for the whole acquire timeout.
    #[error("connection pool exhausted")]
    PoolExhausted,

    #[error("connect failed: {0}")]
    Connect(std::io::Error),

    /// Write or read failure on an established connection.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The call's deadline passed before a response arrived.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Error message reported by the server for this call.
    #[error("remote error: {0}")]
    Remote(String),

    /// Sentinel for oneway calls: the request was sent and no response will
    /// ever arrive.
    #[error("oneway call: no response is expected")]
    Oneway,

    /// The background task running the exchange panicked or was aborted.
    #[error("call task failed: {0}")]
    TaskFailed(String),
}

impl CallError {
    /// True for the oneway sentinel, which signals success of the send.
    pub fn is_oneway(&self) -> bool {
        matches!(self, Self::Oneway)
    }

    /// True when the server received the call and reported a failure.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}
