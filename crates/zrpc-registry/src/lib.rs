//! zRPC Registry
//!
//! A lightweight HTTP registry tracking which zRPC servers are alive.
//! Servers POST heartbeats carrying their address in the `x-zrpc-server`
//! header; clients GET the endpoint and read the sorted alive list from the
//! `x-zrpc-servers` header. Entries expire when their last heartbeat is
//! older than the registry timeout and are evicted lazily during listing.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use zrpc_registry::{heartbeat, Registry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(Registry::default());
//!     let listener = TcpListener::bind("0.0.0.0:9090").await?;
//!
//!     // Servers keep themselves registered with a heartbeat task.
//!     heartbeat::start(
//!         "http://127.0.0.1:9090/_zrpc_/registry",
//!         "127.0.0.1:9999",
//!         std::time::Duration::ZERO,
//!     );
//!
//!     zrpc_registry::serve(registry, listener).await?;
//!     Ok(())
//! }
//! ```

pub mod heartbeat;
pub mod registry;

pub use registry::{router, serve, Registry, DEFAULT_TIMEOUT};
