use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::codec;
use crate::MAGIC;

/// Default limit for establishing a connection (transport connect plus
/// handshake).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection handshake record.
///
/// One JSON-encoded `Options` frame precedes all RPC frames on a stream. The
/// server rejects the connection when the magic does not match or the codec
/// tag is unknown; `handle_timeout` bounds each handler invocation on the
/// server (zero means unbounded).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use zrpc_common::Options;
///
/// let opt = Options::default().with_handle_timeout(Duration::from_secs(1));
/// assert_eq!(opt.codec_type, "application/json");
/// assert_eq!(opt.connect_timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Options {
    #[serde(default)]
    pub magic: u32,
    #[serde(default)]
    pub codec_type: String,
    #[serde(with = "duration_ms", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    #[serde(with = "duration_ms", default)]
    pub handle_timeout: Duration,
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

impl Default for Options {
    fn default() -> Self {
        Options {
            magic: MAGIC,
            codec_type: codec::JSON_TYPE.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handle_timeout: Duration::ZERO,
        }
    }
}

impl Options {
    pub fn with_codec_type(mut self, codec_type: impl Into<String>) -> Self {
        self.codec_type = codec_type.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_handle_timeout(mut self, timeout: Duration) -> Self {
        self.handle_timeout = timeout;
        self
    }
}

/// Durations travel as integer milliseconds on the wire.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opt = Options::default();
        assert_eq!(opt.magic, MAGIC);
        assert_eq!(opt.codec_type, codec::JSON_TYPE);
        assert_eq!(opt.connect_timeout, Duration::from_secs(10));
        assert!(opt.handle_timeout.is_zero());
    }

    #[test]
    fn test_durations_as_millis() {
        let opt = Options::default().with_handle_timeout(Duration::from_millis(250));
        let json = serde_json::to_value(&opt).unwrap();
        assert_eq!(json["handle_timeout"], 250);
        assert_eq!(json["connect_timeout"], 10_000);

        let back: Options = serde_json::from_value(json).unwrap();
        assert_eq!(back, opt);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let opt: Options = serde_json::from_str("{}").unwrap();
        assert_eq!(opt.magic, 0);
        assert_eq!(opt.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert!(opt.handle_timeout.is_zero());
    }
}
