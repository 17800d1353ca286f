use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::Result;

/// Content-type tag of the built-in JSON codec.
pub const JSON_TYPE: &str = "application/json";

/// Codec for encoding/decoding RPC headers and bodies.
///
/// The codec is chosen per connection by the handshake's codec tag; tags are
/// opaque strings resolved through [`Codec::from_type`]. Currently only JSON
/// is supported, but the enum allows for future extensibility (e.g.,
/// MessagePack, CBOR, etc.).
///
/// # Example
///
/// ```
/// use zrpc_common::{Codec, Header};
///
/// let codec = Codec::from_type("application/json").unwrap();
/// let header = Header::request("Arith.Mul", 1);
///
/// let encoded = codec.encode(&header).unwrap();
/// let decoded: Header = codec.decode(&encoded).unwrap();
/// assert_eq!(header, decoded);
/// ```
#[derive(Debug, Clone)]
pub enum Codec {
    /// JSON codec (currently the only supported format)
    Json(JsonCodec),
}

impl Codec {
    /// Resolves a codec tag to a codec instance. Unknown tags return `None`
    /// and are rejected at handshake time.
    pub fn from_type(codec_type: &str) -> Option<Self> {
        match codec_type {
            JSON_TYPE => Some(Codec::Json(JsonCodec)),
            _ => None,
        }
    }

    /// The tag this codec is registered under.
    pub fn content_type(&self) -> &'static str {
        match self {
            Codec::Json(_) => JSON_TYPE,
        }
    }

    /// Encode a header or body value to frame payload bytes.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Json(_) => JsonCodec::encode(value),
        }
    }

    /// Decode a frame payload into a header or body value.
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            Codec::Json(_) => JsonCodec::decode(data),
        }
    }
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}
