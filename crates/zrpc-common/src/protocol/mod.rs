//! Core protocol types: the per-call header, the handshake record and the
//! shared error type.

use serde::{Deserialize, Serialize};

pub mod error;
pub mod option;

/// Sequence number identifying one call within a connection.
///
/// Assigned by the client, echoed by the server. Numbering starts at 1;
/// 0 marks an invalid call.
pub type Seq = u64;

/// Magic number identifying a zRPC stream. Sent in the handshake; streams
/// carrying any other value are rejected without a reply.
pub const MAGIC: u32 = 0x3bef5c;

/// Default path for the HTTP CONNECT tunnel.
pub const DEFAULT_RPC_PATH: &str = "/_zrpc_";

/// Status text a server answers a CONNECT request with. The client switches
/// to the RPC protocol only after seeing exactly this status.
pub const CONNECTED: &str = "200 Connected to zRPC";

/// Default path the registry endpoint is mounted on.
pub const DEFAULT_REGISTRY_PATH: &str = "/_zrpc_/registry";

/// Header carrying the alive-server list in registry GET responses.
pub const X_ZRPC_SERVERS: &str = "x-zrpc-servers";

/// Header carrying the advertised address in registry heartbeat POSTs.
pub const X_ZRPC_SERVER: &str = "x-zrpc-server";

/// Per-call header, one per request and one per response.
///
/// `service_method` has the form `"<service>.<method>"`. On responses,
/// `error` is empty on success; a non-empty string is a failure reported by
/// the server and is surfaced to the caller verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Header {
    pub service_method: String,
    pub seq: Seq,
    #[serde(default)]
    pub error: String,
}

impl Header {
    pub fn request(service_method: impl Into<String>, seq: Seq) -> Self {
        Header { service_method: service_method.into(), seq, error: String::new() }
    }
}
