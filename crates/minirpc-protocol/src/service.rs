//! Server-side service contract: a name plus a table of method handlers.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::codec::{CodecError, Serializer};
use crate::context::CallContext;

/// Error returned by service implementations; only its message crosses the
/// wire.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Future produced by a [`MethodHandler`]: the serialized (not yet
/// compressed) return value.
pub type MethodFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, DispatchError>> + Send>>;

/// Type-erased method: decodes the argument with the given serializer, runs
/// the implementation and encodes its result.
pub type MethodHandler =
    Arc<dyn Fn(CallContext, Serializer, Vec<u8>) -> MethodFuture + Send + Sync>;

/// Failure of a single method dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("decode argument: {0}")]
    DecodeArgument(CodecError),

    /// The implementation's own error, reported verbatim.
    #[error("{0}")]
    Handler(HandlerError),

    #[error("encode result: {0}")]
    EncodeResult(CodecError),
}

/// A named service and its methods, ready to be registered with a server.
///
/// Usually produced by the `into_service` method that [`rpc_service!`]
/// generates, but it can be assembled by hand:
///
/// ```rust
/// use minirpc_protocol::{CallContext, HandlerError, ServiceDescriptor};
///
/// let service = ServiceDescriptor::new("math").method(
///     "double",
///     |_ctx: CallContext, n: i64| async move { Ok::<_, HandlerError>(n * 2) },
/// );
/// assert!(service.method_handler("double").is_some());
/// ```
///
/// [`rpc_service!`]: crate::rpc_service
#[derive(Clone)]
pub struct ServiceDescriptor {
    name: String,
    methods: HashMap<String, MethodHandler>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builder: registers `handler` under `method`, replacing any previous
    /// handler with that name.
    #[must_use]
    pub fn method<Req, Resp, F, Fut>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
    {
        self.add_method(method, handler);
        self
    }

    pub fn add_method<Req, Resp, F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: MethodHandler = Arc::new(
            move |ctx: CallContext, serializer: Serializer, data: Vec<u8>| -> MethodFuture {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let req: Req = serializer
                        .decode(&data)
                        .map_err(DispatchError::DecodeArgument)?;
                    let resp = handler(ctx, req).await.map_err(DispatchError::Handler)?;
                    serializer
                        .encode(&resp)
                        .map_err(DispatchError::EncodeResult)
                })
            },
        );
        self.methods.insert(method.into(), erased);
    }

    pub fn method_handler(&self, method: &str) -> Option<&MethodHandler> {
        self.methods.get(method)
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .finish()
    }
}
