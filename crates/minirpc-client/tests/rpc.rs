//! End-to-end calls between a client and a server over loopback TCP.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use minirpc_client::{Client, ClientConfig, PoolConfig};
use minirpc_protocol::message::{decode_response, encode_request};
use minirpc_protocol::{
    CallContext, CallError, GzipCompressor, HandlerError, Request, Serializer, read_frame,
    rpc_service, write_frame,
};
use minirpc_server::{RpcServer, ServerConfig, ServiceRegistry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetById {
    pub id: u64,
}

rpc_service! {
    pub service UserService("user-service") => UserServiceClient, UserServiceHandler {
        rpc get_by_id(GetById) -> User;
        rpc fail(GetById) -> User;
        /// Sleeps for the given number of milliseconds.
        rpc slow(u64) -> u64;
        /// Milliseconds left before the caller's deadline, as seen by the server.
        rpc remaining(()) -> Option<u64>;
        rpc record(String) -> ();
    }
}

struct Users {
    records: mpsc::UnboundedSender<String>,
    completed: mpsc::UnboundedSender<u64>,
}

impl UserServiceHandler for Users {
    async fn get_by_id(&self, _ctx: CallContext, req: GetById) -> Result<User, HandlerError> {
        Ok(User {
            id: req.id,
            name: format!("user-{}", req.id),
        })
    }

    async fn fail(&self, _ctx: CallContext, req: GetById) -> Result<User, HandlerError> {
        Err(format!("user {} not found", req.id).into())
    }

    async fn slow(&self, _ctx: CallContext, ms: u64) -> Result<u64, HandlerError> {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        let _ = self.completed.send(ms);
        Ok(ms)
    }

    async fn remaining(&self, ctx: CallContext, _req: ()) -> Result<Option<u64>, HandlerError> {
        Ok(ctx.remaining().map(|r| r.as_millis() as u64))
    }

    async fn record(&self, _ctx: CallContext, line: String) -> Result<(), HandlerError> {
        self.records.send(line).map_err(|e| Box::new(e) as HandlerError)
    }
}

struct Harness {
    addr: SocketAddr,
    records: mpsc::UnboundedReceiver<String>,
    completed: mpsc::UnboundedReceiver<u64>,
}

async fn start_server() -> Harness {
    let (records_tx, records) = mpsc::unbounded_channel();
    let (completed_tx, completed) = mpsc::unbounded_channel();
    let users = Users {
        records: records_tx,
        completed: completed_tx,
    };

    let mut registry = ServiceRegistry::new();
    registry.register_service(users.into_service()).unwrap();

    let server = RpcServer::bind(ServerConfig::new("127.0.0.1:0".parse().unwrap()), registry)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    Harness {
        addr,
        records,
        completed,
    }
}

async fn connect(config: ClientConfig) -> (Client, UserServiceClient) {
    let client = Client::connect(config).await.unwrap();
    let mut users = UserServiceClient::default();
    client.init_service(&mut users).unwrap();
    (client, users)
}

fn single_connection() -> PoolConfig {
    PoolConfig::default()
        .with_initial_capacity(1)
        .with_max_capacity(1)
        .with_max_idle(1)
}

#[tokio::test]
async fn call_roundtrip() {
    let harness = start_server().await;
    let (_client, users) = connect(ClientConfig::new(harness.addr.to_string())).await;

    let user = users
        .get_by_id
        .call(&CallContext::new(), &GetById { id: 12 })
        .await
        .unwrap();
    assert_eq!(
        user,
        User {
            id: 12,
            name: "user-12".into()
        }
    );
}

#[tokio::test]
async fn handler_error_reaches_caller() {
    let harness = start_server().await;
    let (_client, users) = connect(ClientConfig::new(harness.addr.to_string())).await;

    let err = users
        .fail
        .call(&CallContext::new(), &GetById { id: 7 })
        .await
        .unwrap_err();
    assert!(err.is_remote());
    assert!(matches!(err, CallError::Remote(ref m) if m == "user 7 not found"));
}

#[tokio::test]
async fn msgpack_with_gzip() {
    let harness = start_server().await;
    let config = ClientConfig::new(harness.addr.to_string())
        .with_serializer(Serializer::MsgPack)
        .with_compressor(GzipCompressor::default());
    let (_client, users) = connect(config).await;

    let user = users
        .get_by_id
        .call(&CallContext::new(), &GetById { id: 3 })
        .await
        .unwrap();
    assert_eq!(user.name, "user-3");
}

#[tokio::test]
async fn raw_serializer_returns_unit_results() {
    let mut harness = start_server().await;
    let config = ClientConfig::new(harness.addr.to_string()).with_serializer(Serializer::Raw);
    let (_client, users) = connect(config).await;

    users
        .record
        .call(&CallContext::new(), &"hello".to_string())
        .await
        .unwrap();
    assert_eq!(harness.records.recv().await.unwrap(), "hello");
}

#[tokio::test]
async fn oneway_call_gets_no_response_frame() {
    let mut harness = start_server().await;
    let config = ClientConfig::new(harness.addr.to_string()).with_pool(single_connection());
    let (client, users) = connect(config).await;

    let err = users
        .record
        .call(&CallContext::new().oneway(), &"hello".to_string())
        .await
        .unwrap_err();
    assert!(err.is_oneway());
    assert_eq!(harness.records.recv().await.unwrap(), "hello");

    // The only connection is reused; a stray response would be read here.
    let user = users
        .get_by_id
        .call(&CallContext::new(), &GetById { id: 1 })
        .await
        .unwrap();
    assert_eq!(user.id, 1);
    assert_eq!(client.pool_stats().idle, 1);
}

#[tokio::test]
async fn deadline_bounds_the_wait_not_the_handler() {
    let mut harness = start_server().await;
    let config = ClientConfig::new(harness.addr.to_string()).with_pool(single_connection());
    let (client, users) = connect(config).await;

    let ctx = CallContext::new().with_timeout(Duration::from_millis(50));
    let started = Instant::now();
    let err = users.slow.call(&ctx, &500).await.unwrap_err();
    assert!(matches!(err, CallError::DeadlineExceeded), "{err}");
    assert!(started.elapsed() < Duration::from_millis(400));

    // The handler still runs to completion on the server.
    let done = tokio::time::timeout(Duration::from_secs(2), harness.completed.recv())
        .await
        .unwrap();
    assert_eq!(done, Some(500));

    // The abandoned exchange reads its response and returns the connection.
    let deadline = Instant::now() + Duration::from_secs(2);
    while client.pool_stats().in_use > 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(client.pool_stats().in_use, 0);

    let user = users
        .get_by_id
        .call(&CallContext::new(), &GetById { id: 2 })
        .await
        .unwrap();
    assert_eq!(user.id, 2);
}

#[tokio::test]
async fn deadline_reaches_the_server() {
    let harness = start_server().await;
    let (_client, users) = connect(ClientConfig::new(harness.addr.to_string())).await;

    let ctx = CallContext::new().with_timeout(Duration::from_secs(5));
    let remaining = users.remaining.call(&ctx, &()).await.unwrap().unwrap();
    assert!(remaining > 0 && remaining <= 5_000, "{remaining}");

    let remaining = users.remaining.call(&CallContext::new(), &()).await.unwrap();
    assert_eq!(remaining, None);
}

#[tokio::test]
async fn unknown_service_and_method() {
    let harness = start_server().await;
    let client = Client::connect(ClientConfig::new(harness.addr.to_string()))
        .await
        .unwrap();

    let err = client
        .stub::<u64, u64>("order-service", "get")
        .call(&CallContext::new(), &1)
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::Remote(ref m) if m == "service not found: order-service"));

    let err = client
        .stub::<u64, u64>("user-service", "delete")
        .call(&CallContext::new(), &1)
        .await
        .unwrap_err();
    assert!(
        matches!(err, CallError::Remote(ref m) if m == "method not found: user-service.delete")
    );
}

#[tokio::test]
async fn unsupported_serializer_code() {
    let harness = start_server().await;
    let mut stream = TcpStream::connect(harness.addr).await.unwrap();

    let mut request = Request::new("user-service", "get_by_id");
    request.request_id = 99;
    request.serializer = 9;
    request.data = br#"{"id":1}"#.to_vec();
    write_frame(&mut stream, &encode_request(&request).unwrap())
        .await
        .unwrap();

    let frame = read_frame(&mut stream).await.unwrap().unwrap();
    let response = decode_response(&frame).unwrap();
    assert_eq!(response.request_id, 99);
    assert_eq!(response.serializer, 9);
    assert_eq!(
        response.error_message().as_deref(),
        Some("unsupported serializer: 9")
    );
    assert!(response.data.is_empty());
}

#[tokio::test]
async fn exhausted_pool_fails_fast_then_recovers() {
    let harness = start_server().await;
    let config = ClientConfig::new(harness.addr.to_string()).with_pool(
        single_connection().with_acquire_timeout(Some(Duration::from_millis(50))),
    );
    let (client, users) = connect(config).await;

    let busy = {
        let users = users.clone();
        tokio::spawn(async move { users.slow.call(&CallContext::new(), &300).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    let err = users
        .get_by_id
        .call(&CallContext::new(), &GetById { id: 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::PoolExhausted), "{err}");

    assert_eq!(busy.await.unwrap().unwrap(), 300);
    let user = users
        .get_by_id
        .call(&CallContext::new(), &GetById { id: 1 })
        .await
        .unwrap();
    assert_eq!(user.id, 1);
    assert_eq!(client.pool_stats().in_use, 0);
}

#[tokio::test]
async fn concurrent_calls_share_the_pool() {
    let harness = start_server().await;
    let config = ClientConfig::new(harness.addr.to_string()).with_pool(
        PoolConfig::default()
            .with_initial_capacity(0)
            .with_max_capacity(4)
            .with_max_idle(4),
    );
    let (client, users) = connect(config).await;

    let calls: Vec<_> = (0..16u64)
        .map(|id| {
            let users = users.clone();
            tokio::spawn(async move {
                users
                    .get_by_id
                    .call(&CallContext::new(), &GetById { id })
                    .await
            })
        })
        .collect();

    for (id, call) in calls.into_iter().enumerate() {
        assert_eq!(call.await.unwrap().unwrap().id, id as u64);
    }
    let stats = client.pool_stats();
    assert_eq!(stats.in_use, 0);
    assert!(stats.idle <= 4);
}
