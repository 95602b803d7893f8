//! Request and response frames.
//!
//! All integers are big-endian. A request frame is laid out as:
//!
//! ```text
//! | total u64 | header u32 | body u32 | request_id u32 |
//! | version u8 | compressor u8 | serializer u8 |
//! | service_len u32 | method_len u32 | meta_len u32 |
//! | service | method | meta | data |
//! ```
//!
//! and a response frame as:
//!
//! ```text
//! | total u64 | header u32 | body u32 | request_id u32 |
//! | version u8 | compressor u8 | serializer u8 | error_len u32 |
//! | error | data |
//! ```
//!
//! `total` counts the whole frame including its own 8 bytes, `header` counts
//! everything before the body, and `total == header + body` always holds.
//! Meta entries are written as `key\rvalue\n`.
//!
//! Lengths are computed from the fields on demand and never stored, so a
//! message can be mutated freely before it is encoded.

use std::collections::BTreeMap;

use crate::error::{ProtocolError, ProtocolResult};
use crate::{LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE, PROTOCOL_VERSION};

/// Out-of-band key/value pairs carried by a request.
pub type Meta = BTreeMap<String, String>;

const REQUEST_FIXED_HEADER: usize = LENGTH_PREFIX_SIZE + 4 + 4 + 4 + 3 + 4 + 4 + 4;
const RESPONSE_FIXED_HEADER: usize = LENGTH_PREFIX_SIZE + 4 + 4 + 4 + 3 + 4;

const META_KV_SEPARATOR: u8 = b'\r';
const META_ENTRY_SEPARATOR: u8 = b'\n';

/// A call to `method_name` on `service_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Correlation id, meaningful within one connection.
    pub request_id: u32,
    pub version: u8,
    pub compressor: u8,
    pub serializer: u8,
    pub service_name: String,
    pub method_name: String,
    pub meta: Meta,
    /// Serialized then compressed argument.
    pub data: Vec<u8>,
}

impl Request {
    /// Creates a request with the current protocol version, no meta and an
    /// empty body.
    pub fn new(service_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            request_id: 0,
            version: PROTOCOL_VERSION,
            compressor: 0,
            serializer: 0,
            service_name: service_name.into(),
            method_name: method_name.into(),
            meta: Meta::new(),
            data: Vec::new(),
        }
    }

    /// Bytes before the body, length prefix included.
    pub fn header_len(&self) -> usize {
        REQUEST_FIXED_HEADER
            + self.service_name.len()
            + self.method_name.len()
            + meta_len(&self.meta)
    }

    pub fn body_len(&self) -> usize {
        self.data.len()
    }

    pub fn total_len(&self) -> usize {
        self.header_len() + self.body_len()
    }

    /// Looks up a meta value.
    pub fn meta_value(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }
}

/// The outcome of one request.
///
/// `error` and `data` are never both populated by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub request_id: u32,
    pub version: u8,
    pub compressor: u8,
    pub serializer: u8,
    /// Error message bytes, empty on success.
    pub error: Vec<u8>,
    /// Serialized then compressed return value.
    pub data: Vec<u8>,
}

impl Response {
    /// Creates an empty response echoing the id, version and codecs of
    /// `request`.
    pub fn for_request(request: &Request) -> Self {
        Self {
            request_id: request.request_id,
            version: request.version,
            compressor: request.compressor,
            serializer: request.serializer,
            error: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Replaces the payload with an error message.
    pub fn with_error(mut self, message: impl std::fmt::Display) -> Self {
        self.error = message.to_string().into_bytes();
        self.data.clear();
        self
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// The error message, if the server reported one.
    pub fn error_message(&self) -> Option<String> {
        if self.error.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.error).into_owned())
        }
    }

    pub fn header_len(&self) -> usize {
        RESPONSE_FIXED_HEADER + self.error.len()
    }

    pub fn body_len(&self) -> usize {
        self.data.len()
    }

    pub fn total_len(&self) -> usize {
        self.header_len() + self.body_len()
    }
}

/// Encodes a request into one complete frame.
pub fn encode_request(request: &Request) -> ProtocolResult<Vec<u8>> {
    let meta = encode_meta(&request.meta)?;
    let total = checked_total(request.total_len())?;

    let mut buf = Vec::with_capacity(request.total_len());
    buf.extend_from_slice(&total.to_be_bytes());
    buf.extend_from_slice(&len_u32(request.header_len(), "header")?.to_be_bytes());
    buf.extend_from_slice(&len_u32(request.body_len(), "body")?.to_be_bytes());
    buf.extend_from_slice(&request.request_id.to_be_bytes());
    buf.push(request.version);
    buf.push(request.compressor);
    buf.push(request.serializer);
    buf.extend_from_slice(&len_u32(request.service_name.len(), "service name")?.to_be_bytes());
    buf.extend_from_slice(&len_u32(request.method_name.len(), "method name")?.to_be_bytes());
    buf.extend_from_slice(&len_u32(meta.len(), "meta")?.to_be_bytes());
    buf.extend_from_slice(request.service_name.as_bytes());
    buf.extend_from_slice(request.method_name.as_bytes());
    buf.extend_from_slice(&meta);
    buf.extend_from_slice(&request.data);
    Ok(buf)
}

/// Decodes one complete request frame, as returned by
/// [`read_frame`](crate::read_frame).
pub fn decode_request(frame: &[u8]) -> ProtocolResult<Request> {
    let mut cursor = FrameCursor::new(frame);
    let (header_len, _body_len) = cursor.read_lengths(REQUEST_FIXED_HEADER)?;

    let request_id = cursor.read_u32()?;
    let version = cursor.read_u8()?;
    let compressor = cursor.read_u8()?;
    let serializer = cursor.read_u8()?;
    let service_len = cursor.read_u32()? as usize;
    let method_len = cursor.read_u32()? as usize;
    let meta_len = cursor.read_u32()? as usize;

    let service_name = cursor.read_str(service_len, "service name")?;
    let method_name = cursor.read_str(method_len, "method name")?;
    let meta = decode_meta(cursor.read_bytes(meta_len)?)?;
    cursor.expect_position(header_len, "header")?;

    Ok(Request {
        request_id,
        version,
        compressor,
        serializer,
        service_name,
        method_name,
        meta,
        data: cursor.rest().to_vec(),
    })
}

/// Encodes a response into one complete frame.
pub fn encode_response(response: &Response) -> ProtocolResult<Vec<u8>> {
    let total = checked_total(response.total_len())?;

    let mut buf = Vec::with_capacity(response.total_len());
    buf.extend_from_slice(&total.to_be_bytes());
    buf.extend_from_slice(&len_u32(response.header_len(), "header")?.to_be_bytes());
    buf.extend_from_slice(&len_u32(response.body_len(), "body")?.to_be_bytes());
    buf.extend_from_slice(&response.request_id.to_be_bytes());
    buf.push(response.version);
    buf.push(response.compressor);
    buf.push(response.serializer);
    buf.extend_from_slice(&len_u32(response.error.len(), "error")?.to_be_bytes());
    buf.extend_from_slice(&response.error);
    buf.extend_from_slice(&response.data);
    Ok(buf)
}

/// Decodes one complete response frame.
pub fn decode_response(frame: &[u8]) -> ProtocolResult<Response> {
    let mut cursor = FrameCursor::new(frame);
    let (header_len, _body_len) = cursor.read_lengths(RESPONSE_FIXED_HEADER)?;

    let request_id = cursor.read_u32()?;
    let version = cursor.read_u8()?;
    let compressor = cursor.read_u8()?;
    let serializer = cursor.read_u8()?;
    let error_len = cursor.read_u32()? as usize;
    let error = cursor.read_bytes(error_len)?.to_vec();
    cursor.expect_position(header_len, "header")?;

    Ok(Response {
        request_id,
        version,
        compressor,
        serializer,
        error,
        data: cursor.rest().to_vec(),
    })
}

fn meta_len(meta: &Meta) -> usize {
    meta.iter().map(|(k, v)| k.len() + v.len() + 2).sum()
}

fn encode_meta(meta: &Meta) -> ProtocolResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(meta_len(meta));
    for (key, value) in meta {
        if key.is_empty() || contains_separator(key) || contains_separator(value) {
            return Err(ProtocolError::InvalidMeta(format!("{key:?} => {value:?}")));
        }
        buf.extend_from_slice(key.as_bytes());
        buf.push(META_KV_SEPARATOR);
        buf.extend_from_slice(value.as_bytes());
        buf.push(META_ENTRY_SEPARATOR);
    }
    Ok(buf)
}

fn decode_meta(bytes: &[u8]) -> ProtocolResult<Meta> {
    let mut meta = Meta::new();
    if bytes.is_empty() {
        return Ok(meta);
    }

    let Some(entries) = bytes.strip_suffix(&[META_ENTRY_SEPARATOR]) else {
        return Err(ProtocolError::InvalidMeta("unterminated entry".into()));
    };
    for entry in entries.split(|b| *b == META_ENTRY_SEPARATOR) {
        let Some(split) = entry.iter().position(|b| *b == META_KV_SEPARATOR) else {
            return Err(ProtocolError::InvalidMeta(
                String::from_utf8_lossy(entry).into_owned(),
            ));
        };
        if split == 0 {
            return Err(ProtocolError::InvalidMeta("empty key".into()));
        }
        let key = std::str::from_utf8(&entry[..split])
            .map_err(|_| ProtocolError::InvalidUtf8 { field: "meta key" })?;
        let value = std::str::from_utf8(&entry[split + 1..])
            .map_err(|_| ProtocolError::InvalidUtf8 { field: "meta value" })?;
        meta.insert(key.to_owned(), value.to_owned());
    }
    Ok(meta)
}

fn contains_separator(s: &str) -> bool {
    s.bytes()
        .any(|b| b == META_KV_SEPARATOR || b == META_ENTRY_SEPARATOR)
}

fn checked_total(total: usize) -> ProtocolResult<u64> {
    let total = total as u64;
    if total > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: total,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(total)
}

fn len_u32(len: usize, field: &'static str) -> ProtocolResult<u32> {
    u32::try_from(len).map_err(|_| ProtocolError::LengthMismatch {
        field,
        declared: u64::from(u32::MAX),
        actual: len as u64,
    })
}

/// Bounds-checked reader over one frame.
struct FrameCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Reads and cross-checks the three leading lengths, returning the header
    /// and body lengths.
    fn read_lengths(&mut self, fixed_header: usize) -> ProtocolResult<(usize, usize)> {
        let total = self.read_u64()?;
        if total != self.buf.len() as u64 {
            return Err(ProtocolError::LengthMismatch {
                field: "frame",
                declared: total,
                actual: self.buf.len() as u64,
            });
        }

        let header_len = self.read_u32()? as usize;
        let body_len = self.read_u32()? as usize;
        let declared = header_len as u64 + body_len as u64;
        if declared != total {
            return Err(ProtocolError::LengthMismatch {
                field: "header + body",
                declared,
                actual: total,
            });
        }
        if header_len < fixed_header {
            return Err(ProtocolError::Truncated {
                expected: fixed_header,
                received: header_len,
            });
        }
        Ok((header_len, body_len))
    }

    fn take(&mut self, n: usize) -> ProtocolResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(ProtocolError::Truncated {
                expected: self.pos.saturating_add(n),
                received: self.buf.len(),
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> ProtocolResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> ProtocolResult<u32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(bytes))
    }

    fn read_u64(&mut self) -> ProtocolResult<u64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(bytes))
    }

    fn read_bytes(&mut self, n: usize) -> ProtocolResult<&'a [u8]> {
        self.take(n)
    }

    fn read_str(&mut self, n: usize, field: &'static str) -> ProtocolResult<String> {
        let bytes = self.take(n)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8 { field })
    }

    fn expect_position(&self, expected: usize, field: &'static str) -> ProtocolResult<()> {
        if self.pos != expected {
            return Err(ProtocolError::LengthMismatch {
                field,
                declared: expected as u64,
                actual: self.pos as u64,
            });
        }
        Ok(())
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}
