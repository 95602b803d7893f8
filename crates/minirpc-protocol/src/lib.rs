//! Wire format, codecs and service contract shared by the minirpc client and
//! server.
//!
//! # Frames
//!
//! Every request and response travels as one frame whose first 8 bytes carry
//! the total frame length (big-endian, prefix included):
//!
//! ```text
//! +----------------+---------------------------+-----------------+
//! | total (8 BE)   | header (lengths, codecs,  | body (data)     |
//! |                | ids, names, meta / error) |                 |
//! +----------------+---------------------------+-----------------+
//! ```
//!
//! See [`message`] for the exact field layout.
//!
//! # Services
//!
//! A service is declared once with [`rpc_service!`], which produces both the
//! server-side handler trait and the client-side struct of [`Stub`]s.
//!
//! ```rust
//! use minirpc_protocol::{CallContext, HandlerError, rpc_service};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! pub struct Ping { pub n: u32 }
//!
//! rpc_service! {
//!     pub service Echo("echo") => EchoClient, EchoHandler {
//!         rpc ping(Ping) -> Ping;
//!     }
//! }
//!
//! struct EchoImpl;
//!
//! impl EchoHandler for EchoImpl {
//!     async fn ping(&self, _ctx: CallContext, req: Ping) -> Result<Ping, HandlerError> {
//!         Ok(Ping { n: req.n + 1 })
//!     }
//! }
//!
//! let descriptor = EchoImpl.into_service();
//! assert_eq!(descriptor.name(), "echo");
//! assert!(descriptor.method_handler("ping").is_some());
//! ```

pub mod codec;
mod context;
mod error;
mod framing;
mod macros;
pub mod message;
mod service;
mod stub;

pub use codec::{
    CodecError, CodecResult, Compressor, GzipCompressor, NoopCompressor, Serializer,
    decode_payload, encode_payload,
};
pub use context::{CallContext, META_DEADLINE, META_ONEWAY};
pub use error::{CallError, CallResult, ProtocolError, ProtocolResult};
pub use framing::{read_frame, write_frame};
pub use message::{Meta, Request, Response};
pub use service::{DispatchError, HandlerError, MethodFuture, MethodHandler, ServiceDescriptor};
pub use stub::{ClientService, Proxy, ProxyFuture, Stub};

/// Protocol version written into every frame.
pub const PROTOCOL_VERSION: u8 = 1;

/// Number of bytes of the total-length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 8;

/// Largest frame accepted by [`read_frame`] (16 MiB).
pub const MAX_FRAME_SIZE: u64 = 16 * 1024 * 1024;
