//! Client-side stand-ins for remote methods.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use tracing::trace;

use crate::codec::{CodecError, Compressor, Serializer, decode_payload, encode_payload};
use crate::context::CallContext;
use crate::error::{CallError, CallResult};
use crate::message::{Request, Response};

/// Future returned by [`Proxy::invoke`].
pub type ProxyFuture<'a> = Pin<Box<dyn Future<Output = CallResult<Response>> + Send + 'a>>;

/// Transport behind every bound [`Stub`]: sends a request and produces the
/// matching response.
///
/// For oneway contexts the proxy resolves to [`CallError::Oneway`] as soon
/// as the request is written.
pub trait Proxy: Send + Sync + 'static {
    fn invoke<'a>(&'a self, ctx: &'a CallContext, request: Request) -> ProxyFuture<'a>;

    /// Serializer applied to arguments sent through this proxy.
    fn serializer(&self) -> Serializer;

    /// Compressor applied to arguments sent through this proxy.
    fn compressor(&self) -> &dyn Compressor;
}

/// A typed remote method: `Req` in, `Resp` out.
///
/// A stub starts unbound and is bound to a proxy (normally a client) by
/// `Client::init_service`. Calling an unbound stub fails with
/// [`CallError::Unbound`].
pub struct Stub<Req, Resp> {
    service: String,
    method: String,
    proxy: Option<Arc<dyn Proxy>>,
    _types: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> Stub<Req, Resp> {
    pub fn unbound(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            proxy: None,
            _types: PhantomData,
        }
    }

    pub fn bound(
        service: impl Into<String>,
        method: impl Into<String>,
        proxy: Arc<dyn Proxy>,
    ) -> Self {
        let mut stub = Self::unbound(service, method);
        stub.bind(proxy);
        stub
    }

    pub fn bind(&mut self, proxy: Arc<dyn Proxy>) {
        self.proxy = Some(proxy);
    }

    pub fn is_bound(&self) -> bool {
        self.proxy.is_some()
    }

    pub fn service_name(&self) -> &str {
        &self.service
    }

    pub fn method_name(&self) -> &str {
        &self.method
    }
}

impl<Req, Resp> Stub<Req, Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    /// Performs the remote call.
    ///
    /// # Errors
    ///
    /// Any [`CallError`]; for a oneway `ctx` a successful send yields
    /// [`CallError::Oneway`].
    pub async fn call(&self, ctx: &CallContext, req: &Req) -> CallResult<Resp> {
        let proxy = self.proxy.as_ref().ok_or_else(|| CallError::Unbound {
            service: self.service.clone(),
            method: self.method.clone(),
        })?;
        let serializer = proxy.serializer();
        let compressor = proxy.compressor();

        let mut request = Request::new(self.service.as_str(), self.method.as_str());
        request.serializer = serializer.code();
        request.compressor = compressor.code();
        request.meta = ctx.to_meta();
        request.data = encode_payload(serializer, compressor, req)?;

        let response = proxy.invoke(ctx, request).await?;
        trace!(
            service = %self.service,
            method = %self.method,
            request_id = response.request_id,
            "Response received"
        );

        if let Some(message) = response.error_message() {
            return Err(CallError::Remote(message));
        }
        if response.serializer != serializer.code() {
            return Err(CodecError::UnsupportedSerializer(response.serializer).into());
        }
        if response.compressor != compressor.code() {
            return Err(CodecError::UnsupportedCompressor(response.compressor).into());
        }
        Ok(decode_payload(serializer, compressor, &response.data)?)
    }
}

impl<Req, Resp> Clone for Stub<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            method: self.method.clone(),
            proxy: self.proxy.clone(),
            _types: PhantomData,
        }
    }
}

impl<Req, Resp> fmt::Debug for Stub<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stub")
            .field("service", &self.service)
            .field("method", &self.method)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// A struct of stubs for one service, as generated by
/// [`rpc_service!`](crate::rpc_service).
pub trait ClientService {
    fn service_name(&self) -> &str;

    fn method_names(&self) -> Vec<&str>;

    /// Binds every stub of the service to `proxy`.
    fn bind(&mut self, proxy: Arc<dyn Proxy>);
}
