//! Payload codecs.
//!
//! A payload is serialized first and compressed second; decoding runs the
//! other way round. Both halves are identified on the wire by a one-byte
//! code, so a server can keep a table of everything it understands while a
//! client commits to one of each.
//!
//! | code | serializer | compressor |
//! |------|------------|------------|
//! | 0    | [`Serializer::Raw`] | [`NoopCompressor`] |
//! | 1    | [`Serializer::Json`] | [`GzipCompressor`] |
//! | 2    | [`Serializer::MsgPack`] | |

mod compressor;
mod error;
mod serializer;

pub use compressor::{Compressor, GzipCompressor, NoopCompressor};
pub use error::{CodecError, CodecResult};
pub use serializer::Serializer;

use serde::{Serialize, de::DeserializeOwned};

/// Serializes then compresses `value`.
pub fn encode_payload<T: Serialize + ?Sized>(
    serializer: Serializer,
    compressor: &dyn Compressor,
    value: &T,
) -> CodecResult<Vec<u8>> {
    let raw = serializer.encode(value)?;
    compressor.compress(&raw)
}

/// Decompresses then deserializes `data`.
pub fn decode_payload<T: DeserializeOwned>(
    serializer: Serializer,
    compressor: &dyn Compressor,
    data: &[u8],
) -> CodecResult<T> {
    let raw = compressor.decompress(data)?;
    serializer.decode(&raw)
}
