//! Client error types.

use std::io;

use thiserror::Error;

use minirpc_protocol::CallError;

use crate::pool::PoolError;

/// Result type for client setup operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised while building a client or binding services to it.
///
/// Failures of individual calls are [`CallError`]s instead.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A service cannot be bound: empty name or duplicate method names.
    #[error("invalid service: {0}")]
    InvalidService(String),

    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<PoolError> for CallError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Exhausted => CallError::PoolExhausted,
            PoolError::Connect(e) => CallError::Connect(e),
            PoolError::InvalidConfig(message) => {
                CallError::Connect(io::Error::new(io::ErrorKind::InvalidInput, message))
            }
        }
    }
}
