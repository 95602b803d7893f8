//! Codec error types.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while encoding or decoding a payload.
///
/// Decompression and deserialization failures are kept apart: the server
/// reports them as different faults.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("serialize payload: {0}")]
    Serialize(String),

    #[error("deserialize payload: {0}")]
    Deserialize(String),

    #[error("compress payload: {0}")]
    Compress(String),

    #[error("decompress payload: {0}")]
    Decompress(String),

    /// No serializer is registered under this code.
    #[error("unsupported serializer: {0}")]
    UnsupportedSerializer(u8),

    /// No compressor is registered under this code.
    #[error("unsupported compressor: {0}")]
    UnsupportedCompressor(u8),
}

impl CodecError {
    pub(crate) fn serialize(err: impl std::fmt::Display) -> Self {
        Self::Serialize(err.to_string())
    }

    pub(crate) fn deserialize(err: impl std::fmt::Display) -> Self {
        Self::Deserialize(err.to_string())
    }
}
