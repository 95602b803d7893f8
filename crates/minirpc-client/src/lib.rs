//! minirpc client.
//!
//! A [`Client`] owns a pool of TCP connections to one server. Service stubs
//! declared with [`rpc_service!`](minirpc_protocol::rpc_service) are bound to
//! it with [`Client::init_service`] and then called like async functions:
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use minirpc_client::{Client, ClientConfig};
//! use minirpc_protocol::{CallContext, rpc_service};
//!
//! rpc_service! {
//!     pub service Math("math") => MathClient, MathHandler {
//!         rpc double(i64) -> i64;
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::connect(ClientConfig::new("127.0.0.1:8081")).await?;
//!     let mut math = MathClient::default();
//!     client.init_service(&mut math)?;
//!
//!     let ctx = CallContext::new().with_timeout(Duration::from_secs(1));
//!     assert_eq!(math.double.call(&ctx, &21).await?, 42);
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
pub mod pool;

pub use client::Client;
pub use config::{ClientConfig, DEFAULT_ADDR};
pub use error::{ClientError, ClientResult};
pub use pool::{
    ConnectionManager, ConnectionPool, PoolConfig, PoolError, PoolStats, PooledConnection,
    TcpConnector,
};
