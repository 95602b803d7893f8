use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use super::error::{CodecError, CodecResult};

/// Payload serialization formats understood by minirpc.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Serializer {
    /// Pass-through for payloads that already are bytes or text.
    ///
    /// Values must serialize as a byte sequence or a string; anything else is
    /// rejected with [`CodecError::Serialize`].
    Raw,
    /// JSON via `serde_json`.
    #[default]
    Json,
    /// MessagePack with named struct fields via `rmp-serde`.
    MsgPack,
}

impl Serializer {
    /// Every built-in serializer, in code order.
    pub const ALL: [Serializer; 3] = [Serializer::Raw, Serializer::Json, Serializer::MsgPack];

    /// Wire code of this serializer.
    pub const fn code(self) -> u8 {
        match self {
            Self::Raw => 0,
            Self::Json => 1,
            Self::MsgPack => 2,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Raw),
            1 => Some(Self::Json),
            2 => Some(Self::MsgPack),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Json => "json",
            Self::MsgPack => "msgpack",
        }
    }

    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> CodecResult<Vec<u8>> {
        match self {
            Self::Raw => encode_raw(value),
            Self::Json => serde_json::to_vec(value).map_err(CodecError::serialize),
            Self::MsgPack => rmp_serde::to_vec_named(value).map_err(CodecError::serialize),
        }
    }

    pub fn decode<T: DeserializeOwned>(self, data: &[u8]) -> CodecResult<T> {
        match self {
            Self::Raw => decode_raw(data),
            Self::Json => serde_json::from_slice(data).map_err(CodecError::deserialize),
            Self::MsgPack => rmp_serde::from_slice(data).map_err(CodecError::deserialize),
        }
    }
}

impl std::str::FromStr for Serializer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "json" => Ok(Self::Json),
            "msgpack" | "messagepack" => Ok(Self::MsgPack),
            other => Err(format!("unknown serializer: {other}")),
        }
    }
}

fn encode_raw<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    match serde_json::to_value(value).map_err(CodecError::serialize)? {
        Value::String(text) => Ok(text.into_bytes()),
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| CodecError::Serialize("raw payload must be a byte sequence".into())),
        _ => Err(CodecError::Serialize(
            "raw payload must be bytes or a string".into(),
        )),
    }
}

fn decode_raw<T: DeserializeOwned>(data: &[u8]) -> CodecResult<T> {
    // An empty body is what a value-less result (`()`, `None`) encodes to.
    if data.is_empty() {
        if let Ok(value) = serde_json::from_value(Value::Null) {
            return Ok(value);
        }
    }
    let bytes = Value::Array(data.iter().map(|b| Value::from(*b)).collect());
    match serde_json::from_value(bytes) {
        Ok(value) => Ok(value),
        Err(bytes_err) => match std::str::from_utf8(data) {
            Ok(text) => serde_json::from_value(Value::String(text.to_owned()))
                .map_err(CodecError::deserialize),
            Err(_) => Err(CodecError::deserialize(bytes_err)),
        },
    }
}
