// Integration tests for the multiplexing client against a real server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

use zrpc_client::{dial, dial_http, x_dial};
use zrpc_common::{Options, RpcError};
use zrpc_server::{Server, Service};

#[derive(Deserialize)]
struct MulArgs {
    a: i64,
    b: i64,
}

#[derive(Deserialize)]
struct SleepArgs {
    ms: u64,
}

fn arith_server() -> Arc<Server> {
    let server = Arc::new(Server::new());
    server
        .register(
            "Arith",
            Service::new()
                .method("Mul", |args: MulArgs| async move { Ok(args.a * args.b) })
                .method("Sleep", |args: SleepArgs| async move {
                    tokio::time::sleep(Duration::from_millis(args.ms)).await;
                    Ok(args.ms)
                }),
        )
        .unwrap();
    server
}

async fn spawn_tcp(server: Arc<Server>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(server.accept(listener));
    addr
}

#[tokio::test]
async fn test_single_call() {
    let addr = spawn_tcp(arith_server()).await;
    let client = dial(&addr, None).await.unwrap();

    let reply: i64 = client.call("Arith.Mul", &json!({"a": 2, "b": 3})).await.unwrap();
    assert_eq!(reply, 6);
}

#[tokio::test]
async fn test_unknown_service_error() {
    let addr = spawn_tcp(arith_server()).await;
    let client = dial(&addr, None).await.unwrap();

    let err = client
        .call::<_, i64>("Nope.Do", &json!({}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("can't find service Nope"), "{err}");
}

#[tokio::test]
async fn test_sequence_numbers_are_monotonic() {
    let addr = spawn_tcp(arith_server()).await;
    let client = dial(&addr, None).await.unwrap();

    let a = client.go("Arith.Mul", &json!({"a": 1, "b": 1})).await.unwrap();
    let b = client.go("Arith.Mul", &json!({"a": 2, "b": 2})).await.unwrap();
    let c = client.go("Arith.Mul", &json!({"a": 3, "b": 3})).await.unwrap();
    assert!(a.seq < b.seq && b.seq < c.seq);

    assert_eq!(a.wait::<i64>().await.unwrap(), 1);
    assert_eq!(b.wait::<i64>().await.unwrap(), 4);
    assert_eq!(c.wait::<i64>().await.unwrap(), 9);
}

#[tokio::test]
async fn test_concurrent_calls_multiplex_one_connection() {
    let addr = spawn_tcp(arith_server()).await;
    let client = Arc::new(dial(&addr, None).await.unwrap());

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..10i64 {
        let client = client.clone();
        tasks.spawn(async move {
            let reply: i64 = client.call("Arith.Mul", &json!({"a": i, "b": i})).await.unwrap();
            assert_eq!(reply, i * i);
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }
}

#[tokio::test]
async fn test_call_deadline() {
    let addr = spawn_tcp(arith_server()).await;
    let client = dial(&addr, None).await.unwrap();

    let start = Instant::now();
    let err = client
        .call_timeout::<_, u64>("Arith.Sleep", &json!({"ms": 500}), Duration::from_millis(50))
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.to_string().contains("call failed"), "{err}");
    assert!(elapsed < Duration::from_millis(200), "took {elapsed:?}");

    // The late response for the abandoned seq is discarded and the
    // connection keeps working.
    let reply: i64 = client.call("Arith.Mul", &json!({"a": 5, "b": 5})).await.unwrap();
    assert_eq!(reply, 25);
}

#[tokio::test]
async fn test_close_is_idempotent_and_drains() {
    let addr = spawn_tcp(arith_server()).await;
    let client = dial(&addr, None).await.unwrap();
    assert!(client.is_available());

    client.close().await.unwrap();
    assert!(!client.is_available());

    let err = client.close().await.unwrap_err();
    assert!(matches!(err, RpcError::Shutdown));

    let err = client
        .call::<_, i64>("Arith.Mul", &json!({"a": 1, "b": 1}))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Shutdown));
}

#[tokio::test]
async fn test_pending_calls_fail_when_server_dies() {
    // A fake server that accepts one connection and drops it mid-call.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(stream);
    });

    let client = dial(&addr, None).await.unwrap();
    let call = client.go("Arith.Sleep", &json!({"ms": 5000})).await.unwrap();

    let err = call.wait::<u64>().await.unwrap_err();
    assert!(
        matches!(err, RpcError::Shutdown | RpcError::Connection(_)),
        "unexpected error: {err}"
    );
    assert!(!client.is_available());
}

#[tokio::test]
async fn test_connect_timeout_is_bounded() {
    // A blackhole address: connects neither succeed nor fail fast.
    let opt = Options::default().with_connect_timeout(Duration::from_millis(100));

    let start = Instant::now();
    let result = dial("10.255.255.1:9999", Some(opt)).await;
    let elapsed = start.elapsed();

    assert!(result.is_err());
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
}

#[tokio::test]
async fn test_dial_http_connect_tunnel() {
    let server = arith_server();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(zrpc_server::http::serve_http_default(server, listener));

    let client = dial_http(&addr, None).await.unwrap();
    let reply: i64 = client.call("Arith.Mul", &json!({"a": 6, "b": 7})).await.unwrap();
    assert_eq!(reply, 42);
}

#[tokio::test]
async fn test_x_dial_selects_transport() {
    let server = arith_server();

    let tcp_addr = spawn_tcp(server.clone()).await;
    let client = x_dial(&format!("tcp@{tcp_addr}"), None).await.unwrap();
    let reply: i64 = client.call("Arith.Mul", &json!({"a": 2, "b": 2})).await.unwrap();
    assert_eq!(reply, 4);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(zrpc_server::http::serve_http_default(server, listener));

    let client = x_dial(&format!("http@{http_addr}"), None).await.unwrap();
    let reply: i64 = client.call("Arith.Mul", &json!({"a": 3, "b": 3})).await.unwrap();
    assert_eq!(reply, 9);
}

#[tokio::test]
async fn test_handle_timeout_reported_to_caller() {
    let addr = spawn_tcp(arith_server()).await;
    let opt = Options::default().with_handle_timeout(Duration::from_millis(100));
    let client = dial(&addr, Some(opt)).await.unwrap();

    let start = Instant::now();
    let err = client
        .call::<_, u64>("Arith.Sleep", &json!({"ms": 500}))
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(
        err.to_string().contains("request handle timeout: expect within 100ms"),
        "{err}"
    );
    assert!(elapsed < Duration::from_millis(300), "took {elapsed:?}");
}
