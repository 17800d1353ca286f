use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use zrpc_common::protocol::{CONNECTED, DEFAULT_RPC_PATH};
use zrpc_common::{Result, RpcError};

use crate::server::Server;

/// Upper bound on the CONNECT request head. Anything larger is not a
/// plausible tunnel request.
const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Accepts HTTP CONNECT tunnels and hands the raw streams to the RPC serve
/// loop.
///
/// The acceptor speaks just enough HTTP/1.0 for the tunnel contract: a
/// `CONNECT <rpc_path>` request is answered with
/// `HTTP/1.0 200 Connected to zRPC` and the connection switches to the RPC
/// protocol; any other method gets a 405, any other path a 404.
pub async fn serve_http(server: Arc<Server>, listener: TcpListener, rpc_path: &str) {
    let rpc_path = rpc_path.to_string();
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("rpc server: accept error: {e}");
                return;
            }
        };
        debug!("rpc server: http connection from {peer}");
        let server = server.clone();
        let rpc_path = rpc_path.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_http_conn(server, stream, &rpc_path).await {
                debug!("rpc server: http upgrade error: {e}");
            }
        });
    }
}

/// Convenience wrapper over [`serve_http`] using the default RPC path.
pub async fn serve_http_default(server: Arc<Server>, listener: TcpListener) {
    serve_http(server, listener, DEFAULT_RPC_PATH).await
}

async fn handle_http_conn(server: Arc<Server>, mut stream: TcpStream, rpc_path: &str) -> Result<()> {
    let head = read_request_head(&mut stream).await?;
    let request_line = head.lines().next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");

    if method != "CONNECT" {
        stream
            .write_all(
                b"HTTP/1.0 405 Method Not Allowed\r\n\
                  Content-Type: text/plain; charset=utf-8\r\n\r\n\
                  405 must CONNECT\n",
            )
            .await?;
        return Ok(());
    }
    if path != rpc_path {
        stream.write_all(b"HTTP/1.0 404 Not Found\r\n\r\n").await?;
        return Ok(());
    }

    stream
        .write_all(format!("HTTP/1.0 {CONNECTED}\n\n").as_bytes())
        .await?;
    server.serve_conn(stream).await;
    Ok(())
}

/// Reads the request head byte by byte until the blank line. The client
/// waits for our status line before sending any RPC frames, so nothing past
/// the head is consumed.
async fn read_request_head(stream: &mut TcpStream) -> Result<String> {
    let mut head = Vec::new();
    let mut newlines = 0u8;
    while newlines < 2 {
        let byte = stream.read_u8().await?;
        head.push(byte);
        match byte {
            b'\n' => newlines += 1,
            b'\r' => {}
            _ => newlines = 0,
        }
        if head.len() > MAX_REQUEST_HEAD {
            return Err(RpcError::Connection("http request head too large".into()));
        }
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_head_parses_until_blank_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let writer = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"CONNECT /_zrpc_ HTTP/1.0\r\nHost: x\r\n\r\nTRAILING")
                .await
                .unwrap();
            stream
        });

        let (mut stream, _) = listener.accept().await.unwrap();
        let head = read_request_head(&mut stream).await.unwrap();
        assert!(head.starts_with("CONNECT /_zrpc_ HTTP/1.0"));
        assert!(!head.contains("TRAILING"));

        let _ = writer.await.unwrap();
    }
}
