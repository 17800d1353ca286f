//! zRPC Client
//!
//! This crate provides the client side of the zRPC runtime:
//!
//! - [`Client`]: one connection, many concurrent in-flight calls matched to
//!   responses by sequence number
//! - [`dial`] / [`dial_http`] / [`x_dial`]: connection establishment with a
//!   connect timeout, raw or through an HTTP CONNECT tunnel
//! - [`Discovery`] and [`MultiServersDiscovery`]: backend enumeration with
//!   random or round-robin selection
//! - [`RegistryDiscovery`]: discovery that refreshes its address set from a
//!   registry endpoint
//! - [`XClient`]: load-balancing facade caching one client per backend
//!
//! # Usage
//!
//! ```rust,no_run
//! use serde_json::json;
//! use zrpc_client::dial;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = dial("127.0.0.1:9999", None).await?;
//!     let product: i64 = client.call("Arith.Mul", &json!({"a": 2, "b": 3})).await?;
//!     assert_eq!(product, 6);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod dial;
pub mod discovery;
pub mod registry_discovery;
pub mod xclient;

pub use client::{Call, Client};
pub use dial::{dial, dial_http, x_dial};
pub use discovery::{Discovery, MultiServersDiscovery, SelectMode};
pub use registry_discovery::RegistryDiscovery;
pub use xclient::XClient;
