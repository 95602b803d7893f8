//! Services and codecs known to a server.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use minirpc_protocol::{Compressor, GzipCompressor, NoopCompressor, Serializer, ServiceDescriptor};

use crate::error::{ServerError, ServerResult};

/// Everything a server can dispatch to, keyed the way requests address it:
/// services by name, serializers and compressors by wire code.
///
/// Filled before [`RpcServer::bind`](crate::RpcServer::bind) and read-only
/// afterwards.
pub struct ServiceRegistry {
    services: HashMap<String, ServiceDescriptor>,
    serializers: HashMap<u8, Serializer>,
    compressors: HashMap<u8, Arc<dyn Compressor>>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    /// Creates a registry with every built-in serializer and the no-op and
    /// gzip compressors.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for serializer in Serializer::ALL {
            registry.register_serializer(serializer);
        }
        registry.register_compressor(NoopCompressor);
        registry.register_compressor(GzipCompressor::default());
        registry
    }

    /// Creates a registry without any codec.
    pub fn empty() -> Self {
        Self {
            services: HashMap::new(),
            serializers: HashMap::new(),
            compressors: HashMap::new(),
        }
    }

    /// Registers `service` under its name, replacing any service already
    /// registered with that name.
    pub fn register_service(&mut self, service: ServiceDescriptor) -> ServerResult<()> {
        if service.name().is_empty() {
            return Err(ServerError::config("service name must not be empty"));
        }
        debug!(
            service = %service.name(),
            methods = ?service.method_names(),
            "Registering service"
        );
        if let Some(previous) = self.services.insert(service.name().to_string(), service) {
            warn!(service = %previous.name(), "Replaced previously registered service");
        }
        Ok(())
    }

    pub fn register_serializer(&mut self, serializer: Serializer) {
        self.serializers.insert(serializer.code(), serializer);
    }

    pub fn register_compressor(&mut self, compressor: impl Compressor) {
        self.compressors.insert(compressor.code(), Arc::new(compressor));
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.get(name)
    }

    pub fn serializer(&self, code: u8) -> Option<Serializer> {
        self.serializers.get(&code).copied()
    }

    pub fn compressor(&self, code: u8) -> Option<&dyn Compressor> {
        self.compressors.get(&code).map(|c| c.as_ref())
    }

    /// Registered service names, sorted.
    pub fn service_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut serializers: Vec<u8> = self.serializers.keys().copied().collect();
        serializers.sort_unstable();
        let mut compressors: Vec<u8> = self.compressors.keys().copied().collect();
        compressors.sort_unstable();
        f.debug_struct("ServiceRegistry")
            .field("services", &self.service_names())
            .field("serializers", &serializers)
            .field("compressors", &compressors)
            .finish()
    }
}
