//! minirpc server.
//!
//! This crate provides the TCP side of minirpc:
//! - a [`ServiceRegistry`] of services and codecs
//! - an accept loop bounded by `max_connections`
//! - a per-connection loop that dispatches requests in order, honours oneway
//!   calls and hands the caller's deadline to each handler
//!
//! # Example
//!
//! ```rust,no_run
//! use minirpc_protocol::{CallContext, HandlerError, ServiceDescriptor};
//! use minirpc_server::{RpcServer, ServerConfig, ServiceRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = ServiceRegistry::new();
//!     registry.register_service(ServiceDescriptor::new("math").method(
//!         "double",
//!         |_ctx: CallContext, n: i64| async move { Ok::<_, HandlerError>(n * 2) },
//!     ))?;
//!
//!     let server = RpcServer::bind(ServerConfig::default(), registry).await?;
//!     server.run_until_shutdown(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod dispatch;
mod error;
mod registry;
mod socket;

pub use config::{DEFAULT_PORT, ServerConfig};
pub use dispatch::Dispatcher;
pub use error::{ServerError, ServerResult};
pub use registry::ServiceRegistry;
pub use socket::{Connection, RpcServer};
