//! `serve` and `call` subcommands.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::info;

use minirpc_client::{Client, ClientConfig};
use minirpc_protocol::{CallContext, GzipCompressor, Serializer};
use minirpc_server::{RpcServer, ServerConfig, ServiceRegistry};

use crate::DemoResult;
use crate::service::{GetByIdReq, UserDirectory, UserServiceClient, UserServiceHandler};

/// Options of `minirpc serve`.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub addr: SocketAddr,
    pub max_connections: usize,
    pub idle_timeout: Option<Duration>,
}

/// Options of `minirpc call`.
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub addr: String,
    pub id: u64,
    pub timeout: Option<Duration>,
    pub delay: Duration,
    pub oneway: bool,
    pub serializer: Serializer,
    pub gzip: bool,
}

/// Serves the demo user service until Ctrl-C.
pub async fn serve(options: ServeOptions) -> DemoResult<()> {
    let mut registry = ServiceRegistry::new();
    registry.register_service(UserDirectory.into_service())?;

    let mut config =
        ServerConfig::new(options.addr).with_max_connections(options.max_connections);
    config.idle_timeout = options.idle_timeout;

    let server = RpcServer::bind(config, registry).await?;
    server
        .run_until_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    info!("Server stopped");
    Ok(())
}

/// Calls `get_by_id` once and prints the user as JSON.
pub async fn call(options: CallOptions) -> DemoResult<()> {
    let mut config = ClientConfig::new(options.addr).with_serializer(options.serializer);
    if options.gzip {
        config = config.with_compressor(GzipCompressor::default());
    }

    let client = Client::connect(config).await?;
    let mut users = UserServiceClient::default();
    client.init_service(&mut users)?;

    let mut ctx = CallContext::new();
    if let Some(timeout) = options.timeout {
        ctx = ctx.with_timeout(timeout);
    }
    if options.oneway {
        ctx = ctx.oneway();
    }

    let req = GetByIdReq {
        id: options.id,
        delay_ms: options.delay.as_millis() as u64,
    };
    match users.get_by_id.call(&ctx, &req).await {
        Ok(resp) => {
            println!("{}", serde_json::to_string_pretty(&resp.user)?);
            Ok(())
        }
        Err(e) if e.is_oneway() => {
            println!("sent (oneway)");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
