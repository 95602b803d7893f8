//! TCP listener and per-connection frame IO.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use minirpc_protocol::{
    PROTOCOL_VERSION, Request, Response, message::decode_request, message::encode_response,
    read_frame, write_frame,
};

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::registry::ServiceRegistry;

/// RPC server: accepts TCP connections and serves each on its own task.
pub struct RpcServer {
    /// Server configuration.
    config: ServerConfig,
    /// TCP listener.
    listener: TcpListener,
    /// Semaphore for limiting concurrent connections.
    connection_semaphore: Arc<Semaphore>,
    dispatcher: Dispatcher,
}

impl RpcServer {
    /// Binds to the configured address and freezes `registry`.
    pub async fn bind(config: ServerConfig, registry: ServiceRegistry) -> ServerResult<Self> {
        if config.max_connections == 0 {
            return Err(ServerError::config("max_connections must be greater than 0"));
        }

        let listener = TcpListener::bind(config.addr).await?;
        info!(
            addr = %listener.local_addr()?,
            services = ?registry.service_names(),
            "RPC server listening"
        );

        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));

        Ok(Self {
            config,
            listener,
            connection_semaphore,
            dispatcher: Dispatcher::new(Arc::new(registry)),
        })
    }

    /// Returns the bound address; useful when binding to port 0.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Accepts a single connection, waiting while `max_connections`
    /// connections are open.
    pub async fn accept(&self) -> ServerResult<Connection> {
        let permit = self
            .connection_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServerError::Shutdown)?;

        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        debug!(peer = %peer, "Accepted new connection");

        Ok(Connection {
            stream,
            peer,
            idle_timeout: self.config.idle_timeout,
            _permit: permit,
        })
    }

    /// Runs the accept loop, serving every connection with the dispatcher.
    ///
    /// This method runs indefinitely; accept errors are logged and skipped.
    pub async fn run(&self) -> ServerResult<()> {
        loop {
            match self.accept().await {
                Ok(connection) => {
                    let dispatcher = self.dispatcher.clone();
                    tokio::spawn(async move {
                        let peer = connection.peer_addr();
                        if let Err(e) = dispatcher.handle_connection(connection).await {
                            warn!(peer = %peer, error = %e, "Connection closed with error");
                        }
                    });
                }
                Err(ServerError::Shutdown) => return Err(ServerError::Shutdown),
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// Connections already being served keep running on their own tasks.
    pub async fn run_until_shutdown<S>(&self, shutdown: S) -> ServerResult<()>
    where
        S: std::future::Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run() => result,
            _ = shutdown => {
                info!("Shutdown signal received");
                self.connection_semaphore.close();
                Ok(())
            }
        }
    }
}

/// A client connection to the server.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    idle_timeout: Option<Duration>,
    _permit: OwnedSemaphorePermit,
}

impl Connection {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Reads the next request.
    ///
    /// Returns `Ok(None)` if the client closed the connection cleanly or the
    /// idle timeout elapsed before a new frame started.
    pub async fn read_request(&mut self) -> ServerResult<Option<Request>> {
        let frame = match self.idle_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, read_frame(&mut self.stream)).await
            {
                Ok(frame) => frame?,
                Err(_) => {
                    debug!(peer = %self.peer, ?timeout, "Closing idle connection");
                    return Ok(None);
                }
            },
            None => read_frame(&mut self.stream).await?,
        };
        let Some(frame) = frame else {
            return Ok(None);
        };

        let request = decode_request(&frame)?;
        if request.version != PROTOCOL_VERSION {
            warn!(
                version = request.version,
                expected = PROTOCOL_VERSION,
                "Unexpected protocol version"
            );
        }
        debug!(
            peer = %self.peer,
            request_id = request.request_id,
            service = %request.service_name,
            method = %request.method_name,
            size = frame.len(),
            "Request received"
        );
        Ok(Some(request))
    }

    pub async fn write_response(&mut self, response: &Response) -> ServerResult<()> {
        let frame = encode_response(response)?;
        write_frame(&mut self.stream, &frame).await?;
        debug!(
            peer = %self.peer,
            request_id = response.request_id,
            size = frame.len(),
            "Response sent"
        );
        Ok(())
    }
}
