use tokio::net::TcpStream;

use zrpc_common::protocol::DEFAULT_RPC_PATH;
use zrpc_common::transport::JSON_TYPE;
use zrpc_common::{Options, Result, RpcError, MAGIC};

use crate::client::Client;

#[derive(Clone, Copy)]
enum ConnKind {
    Raw,
    Http,
}

/// Merges caller options with the defaults. The magic is always forced to
/// the canonical value and an empty codec tag falls back to JSON.
fn merge_options(opts: Option<Options>) -> Options {
    let mut opt = opts.unwrap_or_default();
    opt.magic = MAGIC;
    if opt.codec_type.is_empty() {
        opt.codec_type = JSON_TYPE.to_string();
    }
    opt
}

/// Connects to a zRPC server over TCP.
pub async fn dial(addr: &str, opts: Option<Options>) -> Result<Client> {
    dial_with(ConnKind::Raw, addr, opts).await
}

/// Connects to a zRPC server mounted behind an HTTP CONNECT tunnel at the
/// default RPC path.
pub async fn dial_http(addr: &str, opts: Option<Options>) -> Result<Client> {
    dial_with(ConnKind::Http, addr, opts).await
}

/// Connects to a server addressed as `"<protocol>@<host:port>"`. The `http`
/// protocol selects the CONNECT tunnel over TCP; `tcp` the raw stream. TCP
/// is the only transport here, so any other protocol string is rejected.
pub async fn x_dial(rpc_addr: &str, opts: Option<Options>) -> Result<Client> {
    let (protocol, addr) = rpc_addr
        .split_once('@')
        .ok_or_else(|| RpcError::BadAddress(rpc_addr.to_string()))?;

    match protocol {
        "http" => dial_http(addr, opts).await,
        "tcp" => dial(addr, opts).await,
        other => Err(RpcError::Connection(format!("unsupported protocol '{other}'"))),
    }
}

/// Establishes the transport connection and runs the client constructor,
/// both bounded by the connect timeout (zero means unbounded). The
/// constructor runs in a background task so a stuck handshake cannot outlive
/// the deadline; on timeout the task is aborted and the stream dropped.
async fn dial_with(kind: ConnKind, addr: &str, opts: Option<Options>) -> Result<Client> {
    let opt = merge_options(opts);
    let connect_timeout = opt.connect_timeout;

    let stream = if connect_timeout.is_zero() {
        TcpStream::connect(addr).await?
    } else {
        tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| RpcError::ConnectTimeout(connect_timeout))??
    };

    let mut construct = tokio::spawn(async move {
        match kind {
            ConnKind::Raw => Client::new(stream, opt).await,
            ConnKind::Http => Client::new_http(stream, opt, DEFAULT_RPC_PATH).await,
        }
    });

    if connect_timeout.is_zero() {
        return construct
            .await
            .map_err(|e| RpcError::Connection(format!("client constructor failed: {e}")))?;
    }

    tokio::select! {
        result = &mut construct => {
            result.map_err(|e| RpcError::Connection(format!("client constructor failed: {e}")))?
        }
        _ = tokio::time::sleep(connect_timeout) => {
            construct.abort();
            Err(RpcError::ConnectTimeout(connect_timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_merge_defaults() {
        let opt = merge_options(None);
        assert_eq!(opt.magic, MAGIC);
        assert_eq!(opt.codec_type, JSON_TYPE);
    }

    #[test]
    fn test_merge_forces_magic_and_codec() {
        let provided = Options {
            magic: 0xdead,
            codec_type: String::new(),
            ..Options::default()
        };
        let opt = merge_options(Some(provided));
        assert_eq!(opt.magic, MAGIC);
        assert_eq!(opt.codec_type, JSON_TYPE);
    }

    #[test]
    fn test_merge_keeps_caller_timeouts() {
        let provided = Options::default()
            .with_connect_timeout(Duration::from_secs(1))
            .with_handle_timeout(Duration::from_millis(50));
        let opt = merge_options(Some(provided));
        assert_eq!(opt.connect_timeout, Duration::from_secs(1));
        assert_eq!(opt.handle_timeout, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_x_dial_rejects_bad_format() {
        let err = x_dial("127.0.0.1:9999", None).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "rpc client err: wrong format '127.0.0.1:9999', expect protocol@addr"
        );
    }

    #[tokio::test]
    async fn test_x_dial_rejects_unknown_protocol() {
        let err = x_dial("carrier-pigeon@127.0.0.1:9999", None).await.unwrap_err();
        assert!(err.to_string().contains("unsupported protocol 'carrier-pigeon'"));
    }
}
