use std::time::Duration;

use thiserror::Error;

/// Error type shared by all zRPC components.
///
/// Connection-level failures (I/O, codec breakdown, shutdown) terminate the
/// connection; per-call failures travel in-band in [`Header::error`] and the
/// connection continues.
///
/// [`Header::error`]: crate::Header
#[derive(Error, Debug)]
pub enum RpcError {
    /// The client was closed, or broke down and drained its pending calls.
    #[error("connection is shut down")]
    Shutdown,

    /// Establishing the connection (transport connect plus handshake) did
    /// not finish within the configured connect timeout.
    #[error("rpc client: connect timeout: expect within {0:?}")]
    ConnectTimeout(Duration),

    /// A synchronous call was abandoned before a response arrived.
    #[error("rpc client: call failed: {0}")]
    CallFailed(String),

    /// An error string reported by the remote peer in a response header,
    /// surfaced verbatim.
    #[error("{0}")]
    Remote(String),

    /// The response body could not be decoded into the caller's reply type.
    #[error("reading body {0}")]
    ReadBody(String),

    /// The handshake named a codec tag no constructor is registered for.
    #[error("invalid codec type {0}")]
    InvalidCodec(String),

    /// A registered service name was registered twice.
    #[error("rpc: service already defined: {0}")]
    DuplicateService(String),

    /// Discovery has no backend addresses to hand out.
    #[error("rpc discovery: no available servers")]
    NoAvailableServers,

    /// Discovery was asked for a selection policy it does not implement.
    #[error("rpc discovery: not supported select mode")]
    UnsupportedSelectMode,

    /// A dial address did not match the `protocol@addr` form.
    #[error("rpc client err: wrong format '{0}', expect protocol@addr")]
    BadAddress(String),

    /// A frame length prefix exceeded the transport limit.
    #[error("frame too large: {0} bytes (max {max} bytes)", max = crate::transport::frame::MAX_FRAME_SIZE)]
    FrameTooLarge(usize),

    /// Transport-level failure that is not a plain I/O error.
    #[error("connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_display() {
        assert_eq!(RpcError::Shutdown.to_string(), "connection is shut down");
        assert_eq!(
            RpcError::ConnectTimeout(Duration::from_secs(10)).to_string(),
            "rpc client: connect timeout: expect within 10s"
        );
        assert_eq!(
            RpcError::NoAvailableServers.to_string(),
            "rpc discovery: no available servers"
        );
        assert_eq!(
            RpcError::CallFailed("deadline exceeded".into()).to_string(),
            "rpc client: call failed: deadline exceeded"
        );
    }

    #[test]
    fn test_remote_error_is_verbatim() {
        let err = RpcError::Remote("rpc server: can't find service Nope".into());
        assert_eq!(err.to_string(), "rpc server: can't find service Nope");
    }
}
