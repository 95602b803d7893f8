//! Client configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use minirpc_protocol::{Compressor, NoopCompressor, Serializer};

use crate::error::{ClientError, ClientResult};
use crate::pool::PoolConfig;

/// Default server address.
pub const DEFAULT_ADDR: &str = "127.0.0.1:8081";

/// Client configuration: where to connect and how to encode arguments.
#[derive(Clone)]
pub struct ClientConfig {
    /// Server address, `host:port`.
    pub addr: String,

    /// Timeout for establishing a single TCP connection.
    pub dial_timeout: Duration,

    pub pool: PoolConfig,

    /// Serializer used for every call made through this client.
    pub serializer: Serializer,

    /// Compressor used for every call made through this client.
    pub compressor: Arc<dyn Compressor>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            dial_timeout: Duration::from_secs(3),
            pool: PoolConfig::default(),
            serializer: Serializer::default(),
            compressor: Arc::new(NoopCompressor),
        }
    }
}

impl ClientConfig {
    /// Creates a new client configuration for `addr`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Builder: set dial timeout.
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Builder: set pool limits.
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Builder: set serializer.
    pub fn with_serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = serializer;
        self
    }

    /// Builder: set compressor.
    pub fn with_compressor(mut self, compressor: impl Compressor) -> Self {
        self.compressor = Arc::new(compressor);
        self
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.addr.trim().is_empty() {
            return Err(ClientError::Config("address must not be empty".into()));
        }
        if self.dial_timeout.is_zero() {
            return Err(ClientError::Config(
                "dial timeout must be greater than 0".into(),
            ));
        }
        Ok(self.pool.validate()?)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("addr", &self.addr)
            .field("dial_timeout", &self.dial_timeout)
            .field("pool", &self.pool)
            .field("serializer", &self.serializer)
            .field("compressor", &self.compressor.code())
            .finish()
    }
}
