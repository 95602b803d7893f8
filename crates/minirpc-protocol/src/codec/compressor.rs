use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use super::error::{CodecError, CodecResult};

/// Symmetric byte transform applied to serialized payloads.
///
/// Implementations must be stateless between calls; a single instance is
/// shared by every connection of a server.
pub trait Compressor: Send + Sync + 'static {
    /// Wire code of this compressor.
    fn code(&self) -> u8;

    fn compress(&self, data: &[u8]) -> CodecResult<Vec<u8>>;

    /// Fails with [`CodecError::Decompress`] on a malformed stream.
    fn decompress(&self, data: &[u8]) -> CodecResult<Vec<u8>>;
}

/// Leaves payloads untouched (code 0).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn code(&self) -> u8 {
        0
    }

    fn compress(&self, data: &[u8]) -> CodecResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> CodecResult<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// gzip via `flate2` (code 1).
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: Compression,
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl GzipCompressor {
    /// Level from 0 (store) to 9 (best).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Compressor for GzipCompressor {
    fn code(&self) -> u8 {
        1
    }

    fn compress(&self, data: &[u8]) -> CodecResult<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 32), self.level);
        encoder
            .write_all(data)
            .map_err(|e| CodecError::Compress(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| CodecError::Compress(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> CodecResult<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::with_capacity(data.len() * 2);
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompress(e.to_string()))?;
        Ok(out)
    }
}
