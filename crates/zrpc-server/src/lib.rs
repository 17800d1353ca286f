//! zRPC Server
//!
//! This crate provides the server side of the zRPC runtime: service
//! registration, concurrent request dispatch, per-request handle timeouts
//! and an HTTP CONNECT acceptor for tunnelled connections.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde::Deserialize;
//! use tokio::net::TcpListener;
//! use zrpc_server::{Server, Service};
//!
//! #[derive(Deserialize)]
//! struct MulArgs { a: i64, b: i64 }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Arc::new(Server::new());
//!     server.register(
//!         "Arith",
//!         Service::new().method("Mul", |args: MulArgs| async move { Ok(args.a * args.b) }),
//!     )?;
//!
//!     let listener = TcpListener::bind("0.0.0.0:9999").await?;
//!     server.accept(listener).await;
//!     Ok(())
//! }
//! ```
//!
//! # Concurrency
//!
//! Each accepted connection runs a read loop in its own task; each request
//! runs its handler in a further task. Responses on one connection are
//! serialized through a per-connection send lock, so a response's header and
//! body frames never interleave with another response. Sequence numbers, not
//! arrival order, match responses to calls.

pub mod http;
pub mod server;
pub mod service;

pub use server::Server;
pub use service::Service;
