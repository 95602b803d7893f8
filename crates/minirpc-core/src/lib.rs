//! Shared runtime setup for minirpc binaries.

pub mod tracing;

pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
