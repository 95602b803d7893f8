//! Server error types.

use std::io;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
///
/// None of these are sent to clients: failures of an individual call travel
/// back in `Response.error` instead.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (listener or connection socket).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed or oversized frame; the connection is dropped.
    #[error("Protocol error: {0}")]
    Protocol(#[from] minirpc_protocol::ProtocolError),

    /// Configuration or registration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The server stopped accepting connections.
    #[error("Server shutdown requested")]
    Shutdown,
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
