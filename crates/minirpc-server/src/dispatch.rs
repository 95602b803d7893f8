//! Request dispatch.
//!
//! Turns a decoded [`Request`] into a [`Response`] by looking up the service,
//! method and codecs it names. Everything that goes wrong for a single call
//! is reported in `Response.error`; only failures to read or write frames
//! end a connection.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use thiserror::Error;
use tracing::{debug, warn};

use minirpc_protocol::{CallContext, CodecError, DispatchError, Request, Response};

use crate::error::ServerResult;
use crate::registry::ServiceRegistry;
use crate::socket::Connection;

/// Why a call could not produce a result. The display text is what the
/// client receives.
#[derive(Debug, Error)]
enum InvokeError {
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("method not found: {service}.{method}")]
    MethodNotFound { service: String, method: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_owned(),
            Err(_) => "unknown panic".to_owned(),
        },
    }
}

/// Routes requests to registered services.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ServiceRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Serves a connection, processing requests in order until it closes.
    pub async fn handle_connection(&self, mut conn: Connection) -> ServerResult<()> {
        loop {
            match conn.read_request().await {
                Ok(Some(request)) => {
                    if let Some(response) = self.invoke(request).await {
                        conn.write_response(&response).await?;
                    }
                }
                Ok(None) => {
                    debug!(peer = %conn.peer_addr(), "Client disconnected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(peer = %conn.peer_addr(), error = %e, "Error reading request");
                    return Err(e);
                }
            }
        }
    }

    /// Runs one request.
    ///
    /// Returns `None` for oneway requests: their dispatch continues on a
    /// separate task and no response frame is ever written for them, not even
    /// for an unknown service.
    pub async fn invoke(&self, request: Request) -> Option<Response> {
        let ctx = CallContext::from_meta(&request.meta);

        if ctx.is_oneway() {
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.dispatch(ctx, &request).await {
                    debug!(
                        request_id = request.request_id,
                        service = %request.service_name,
                        method = %request.method_name,
                        error = %e,
                        "Oneway call failed"
                    );
                }
            });
            return None;
        }

        let response = Response::for_request(&request);
        Some(match self.dispatch(ctx, &request).await {
            Ok(data) => response.with_data(data),
            Err(e) => {
                debug!(
                    request_id = request.request_id,
                    service = %request.service_name,
                    method = %request.method_name,
                    error = %e,
                    "Call failed"
                );
                response.with_error(e)
            }
        })
    }

    async fn dispatch(&self, ctx: CallContext, request: &Request) -> Result<Vec<u8>, InvokeError> {
        let service = self
            .registry
            .service(&request.service_name)
            .ok_or_else(|| InvokeError::ServiceNotFound(request.service_name.clone()))?;
        let handler = service
            .method_handler(&request.method_name)
            .ok_or_else(|| InvokeError::MethodNotFound {
                service: request.service_name.clone(),
                method: request.method_name.clone(),
            })?;
        let serializer = self
            .registry
            .serializer(request.serializer)
            .ok_or(CodecError::UnsupportedSerializer(request.serializer))?;
        let compressor = self
            .registry
            .compressor(request.compressor)
            .ok_or(CodecError::UnsupportedCompressor(request.compressor))?;

        let data = compressor.decompress(&request.data)?;
        let result = AssertUnwindSafe(handler(ctx, serializer, data))
            .catch_unwind()
            .await
            .map_err(|payload| InvokeError::Panicked(panic_message(payload)))??;
        Ok(compressor.compress(&result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use minirpc_protocol::{
        Compressor, GzipCompressor, HandlerError, META_DEADLINE, META_ONEWAY, Serializer,
        ServiceDescriptor,
    };
    use tokio::sync::mpsc;

    fn dispatcher_with(service: ServiceDescriptor) -> Dispatcher {
        let mut registry = ServiceRegistry::new();
        registry.register_service(service).unwrap();
        Dispatcher::new(Arc::new(registry))
    }

    fn math() -> Dispatcher {
        dispatcher_with(
            ServiceDescriptor::new("math")
                .method("double", |_ctx: CallContext, n: i64| async move {
                    Ok::<_, HandlerError>(n * 2)
                })
                .method("divide", |_ctx: CallContext, (a, b): (i64, i64)| async move {
                    if b == 0 {
                        return Err::<i64, HandlerError>("division by zero".into());
                    }
                    Ok(a / b)
                })
                .method("deadline", |ctx: CallContext, _: ()| async move {
                    Ok::<_, HandlerError>(ctx.deadline().map(|d| d.timestamp_millis()))
                })
                .method("sqrt", |_ctx: CallContext, n: i64| async move {
                    if n < 0 {
                        panic!("negative input: {n}");
                    }
                    Ok::<_, HandlerError>(n.isqrt())
                }),
        )
    }

    fn request(service: &str, method: &str, arg: &impl serde::Serialize) -> Request {
        let mut request = Request::new(service, method);
        request.request_id = 5;
        request.serializer = Serializer::Json.code();
        request.data = Serializer::Json.encode(arg).unwrap();
        request
    }

    #[tokio::test]
    async fn successful_call_echoes_codecs() {
        let response = math()
            .invoke(request("math", "double", &21i64))
            .await
            .unwrap();

        assert_eq!(response.request_id, 5);
        assert_eq!(response.serializer, Serializer::Json.code());
        assert_eq!(response.compressor, 0);
        assert!(response.error.is_empty());
        assert_eq!(Serializer::Json.decode::<i64>(&response.data).unwrap(), 42);
    }

    #[tokio::test]
    async fn gzip_payloads_are_unwrapped_and_rewrapped() {
        let gzip = GzipCompressor::default();
        let mut req = request("math", "double", &4i64);
        req.compressor = gzip.code();
        req.data = gzip.compress(&req.data).unwrap();

        let response = math().invoke(req).await.unwrap();
        assert_eq!(response.compressor, gzip.code());
        let plain = gzip.decompress(&response.data).unwrap();
        assert_eq!(Serializer::Json.decode::<i64>(&plain).unwrap(), 8);
    }

    #[tokio::test]
    async fn unknown_service_and_method() {
        let dispatcher = math();

        let response = dispatcher
            .invoke(request("physics", "double", &1i64))
            .await
            .unwrap();
        assert_eq!(
            response.error_message().as_deref(),
            Some("service not found: physics")
        );
        assert!(response.data.is_empty());
        assert_eq!(response.request_id, 5);

        let response = dispatcher
            .invoke(request("math", "triple", &1i64))
            .await
            .unwrap();
        assert_eq!(
            response.error_message().as_deref(),
            Some("method not found: math.triple")
        );
        assert!(response.data.is_empty());
    }

    #[tokio::test]
    async fn unsupported_codecs_are_reported() {
        let dispatcher = math();

        let mut req = request("math", "double", &1i64);
        req.serializer = 9;
        let response = dispatcher.invoke(req).await.unwrap();
        assert_eq!(response.serializer, 9);
        assert_eq!(
            response.error_message().as_deref(),
            Some("unsupported serializer: 9")
        );

        let mut req = request("math", "double", &1i64);
        req.compressor = 7;
        let response = dispatcher.invoke(req).await.unwrap();
        assert_eq!(response.compressor, 7);
        assert_eq!(
            response.error_message().as_deref(),
            Some("unsupported compressor: 7")
        );
    }

    #[tokio::test]
    async fn handler_error_travels_verbatim() {
        let response = math()
            .invoke(request("math", "divide", &(1i64, 0i64)))
            .await
            .unwrap();
        assert_eq!(response.error_message().as_deref(), Some("division by zero"));
        assert!(response.data.is_empty());
    }

    #[tokio::test]
    async fn undecodable_argument_is_a_call_error() {
        let mut req = request("math", "double", &1i64);
        req.data = b"{not json".to_vec();
        let response = math().invoke(req).await.unwrap();
        let message = response.error_message().unwrap();
        assert!(message.starts_with("decode argument"), "{message}");
    }

    #[tokio::test]
    async fn corrupt_compressed_argument_is_a_decompress_error() {
        let mut req = request("math", "double", &1i64);
        req.compressor = GzipCompressor::default().code();
        req.data = b"definitely not gzip".to_vec();
        let response = math().invoke(req).await.unwrap();
        let message = response.error_message().unwrap();
        assert!(message.starts_with("decompress payload:"), "{message}");
        assert!(response.data.is_empty());
    }

    #[tokio::test]
    async fn handler_panic_becomes_a_call_error() {
        let dispatcher = math();

        let response = dispatcher
            .invoke(request("math", "sqrt", &-4i64))
            .await
            .unwrap();
        assert_eq!(response.request_id, 5);
        assert_eq!(
            response.error_message().as_deref(),
            Some("handler panicked: negative input: -4")
        );
        assert!(response.data.is_empty());

        let response = dispatcher
            .invoke(request("math", "sqrt", &16i64))
            .await
            .unwrap();
        assert_eq!(Serializer::Json.decode::<i64>(&response.data).unwrap(), 4);
    }

    #[tokio::test]
    async fn deadline_reaches_the_handler() {
        let deadline = DateTime::<Utc>::from_timestamp_millis(1_900_000_000_000).unwrap();
        let mut req = request("math", "deadline", &());
        req.meta = CallContext::new().with_deadline(deadline).to_meta();

        let response = math().invoke(req).await.unwrap();
        let seen: Option<i64> = Serializer::Json.decode(&response.data).unwrap();
        assert_eq!(seen, Some(1_900_000_000_000));

        let mut req = request("math", "deadline", &());
        req.meta.insert(META_DEADLINE.into(), "soon".into());
        let response = math().invoke(req).await.unwrap();
        let seen: Option<i64> = Serializer::Json.decode(&response.data).unwrap();
        assert_eq!(seen, None);
    }

    #[tokio::test]
    async fn oneway_runs_without_response() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = dispatcher_with(ServiceDescriptor::new("log").method(
            "write",
            move |_ctx: CallContext, line: String| {
                let tx = tx.clone();
                async move {
                    tx.send(line).map_err(|e| Box::new(e) as HandlerError)?;
                    Ok::<_, HandlerError>(())
                }
            },
        ));

        let mut req = request("log", "write", &"hello");
        req.meta.insert(META_ONEWAY.into(), "true".into());
        assert!(dispatcher.invoke(req).await.is_none());
        assert_eq!(rx.recv().await.unwrap(), "hello");

        let mut req = request("missing", "write", &"hello");
        req.meta.insert(META_ONEWAY.into(), "true".into());
        assert!(dispatcher.invoke(req).await.is_none());
    }
}
