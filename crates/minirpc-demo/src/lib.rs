//! Demo user service and the `minirpc` command that serves or calls it.

pub mod cli;
pub mod commands;
pub mod service;

use thiserror::Error;

/// Result type for demo commands.
pub type DemoResult<T> = Result<T, DemoError>;

/// Errors reported by the `minirpc` command.
#[derive(Debug, Error)]
pub enum DemoError {
    #[error("{0}")]
    Client(#[from] minirpc_client::ClientError),

    #[error("call failed: {0}")]
    Call(#[from] minirpc_protocol::CallError),

    #[error("{0}")]
    Server(#[from] minirpc_server::ServerError),

    #[error("{0}")]
    Tracing(#[from] minirpc_core::TracingError),

    #[error("output error: {0}")]
    Json(#[from] serde_json::Error),
}
