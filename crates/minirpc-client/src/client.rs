//! RPC client: binds stubs and carries their calls over pooled connections.

use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, trace, warn};

use minirpc_protocol::message::{decode_response, encode_request};
use minirpc_protocol::{
    CallContext, CallError, CallResult, ClientService, Compressor, Proxy, ProxyFuture, Request,
    Response, Serializer, Stub, read_frame, write_frame,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::pool::{ConnectionPool, PoolStats, TcpConnector};

/// Connection to one RPC server. Cloning shares the pool and request ids.
#[derive(Clone)]
pub struct Client {
    addr: String,
    pool: ConnectionPool<TcpConnector>,
    serializer: Serializer,
    compressor: Arc<dyn Compressor>,
    next_request_id: Arc<AtomicU32>,
}

impl Client {
    /// Validates `config` and opens the connection pool.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;

        let connector = TcpConnector::new(config.addr.clone(), config.dial_timeout);
        let pool = ConnectionPool::new(connector, config.pool).await?;
        debug!(
            addr = %config.addr,
            serializer = config.serializer.name(),
            compressor = config.compressor.code(),
            "Client connected"
        );

        Ok(Self {
            addr: config.addr,
            pool,
            serializer: config.serializer,
            compressor: config.compressor,
            next_request_id: Arc::new(AtomicU32::new(1)),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Binds every stub of `service` to this client.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidService`] if the service name is empty or two
    /// methods share a name.
    pub fn init_service<S: ClientService>(&self, service: &mut S) -> ClientResult<()> {
        let name = service.service_name().to_string();
        if name.is_empty() {
            return Err(ClientError::InvalidService(
                "service name must not be empty".into(),
            ));
        }

        let mut seen = HashSet::new();
        for method in service.method_names() {
            if method.is_empty() {
                return Err(ClientError::InvalidService(format!(
                    "{name}: method name must not be empty"
                )));
            }
            if !seen.insert(method) {
                return Err(ClientError::InvalidService(format!(
                    "{name}: duplicate method {method}"
                )));
            }
        }

        let methods = seen.len();
        service.bind(Arc::new(self.clone()));
        debug!(service = %name, methods, "Service bound");
        Ok(())
    }

    /// Builds a single stub bound to this client.
    pub fn stub<Req, Resp>(
        &self,
        service: impl Into<String>,
        method: impl Into<String>,
    ) -> Stub<Req, Resp> {
        Stub::bound(service, method, Arc::new(self.clone()))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("addr", &self.addr)
            .field("serializer", &self.serializer)
            .field("compressor", &self.compressor.code())
            .field("pool", &self.pool.stats())
            .finish()
    }
}

impl Proxy for Client {
    fn invoke<'a>(&'a self, ctx: &'a CallContext, mut request: Request) -> ProxyFuture<'a> {
        Box::pin(async move {
            request.request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);

            let remaining = ctx.remaining();
            if remaining.is_some_and(|r| r.is_zero()) {
                return Err(CallError::DeadlineExceeded);
            }

            let request_id = request.request_id;
            let task = tokio::spawn(exchange(self.pool.clone(), request, ctx.is_oneway()));
            let joined = match remaining {
                Some(remaining) => match tokio::time::timeout(remaining, task).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        debug!(request_id, ?remaining, "Deadline exceeded, abandoning call");
                        return Err(CallError::DeadlineExceeded);
                    }
                },
                None => task.await,
            };
            joined.map_err(|e| CallError::TaskFailed(e.to_string()))?
        })
    }

    fn serializer(&self) -> Serializer {
        self.serializer
    }

    fn compressor(&self) -> &dyn Compressor {
        self.compressor.as_ref()
    }
}

/// Writes `request` on a pooled connection and, unless oneway, reads the
/// response.
///
/// Runs on its own task so that an abandoned call still finishes and hands
/// its connection back. Connections that saw an IO or framing error are
/// discarded.
async fn exchange(
    pool: ConnectionPool<TcpConnector>,
    request: Request,
    oneway: bool,
) -> CallResult<Response> {
    let frame = encode_request(&request)?;
    let mut conn = pool.get().await?;

    if let Err(e) = write_frame(&mut *conn, &frame).await {
        conn.discard();
        return Err(e.into());
    }
    trace!(
        request_id = request.request_id,
        service = %request.service_name,
        method = %request.method_name,
        size = frame.len(),
        oneway,
        "Request sent"
    );
    if oneway {
        return Err(CallError::Oneway);
    }

    let frame = match read_frame(&mut *conn).await {
        Ok(Some(frame)) => frame,
        Ok(None) => {
            conn.discard();
            return Err(CallError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before response",
            )));
        }
        Err(e) => {
            conn.discard();
            return Err(e.into());
        }
    };
    let response = match decode_response(&frame) {
        Ok(response) => response,
        Err(e) => {
            conn.discard();
            return Err(e.into());
        }
    };

    if response.request_id != request.request_id {
        warn!(
            expected = request.request_id,
            received = response.request_id,
            "Response request_id mismatch"
        );
    }
    Ok(response)
}
