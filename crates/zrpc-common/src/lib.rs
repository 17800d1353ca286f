//! zRPC Common Types and Transport
//!
//! This crate provides the core protocol definitions and the framed wire
//! transport shared by every zRPC component.
//!
//! # Overview
//!
//! zRPC is a multiplexed RPC runtime: a caller invokes a named method on a
//! remote peer with one argument value, the peer runs a registered handler
//! and returns one reply value (or an error string). This crate contains the
//! pieces both sides agree on:
//!
//! - **Protocol layer**: the per-call [`Header`], the connection handshake
//!   [`Options`], and the [`RpcError`] type
//! - **Transport layer**: length-prefixed frames and the pluggable
//!   [`Codec`] that serializes headers and bodies
//!
//! # Wire format
//!
//! Every RPC stream starts with one JSON-encoded [`Options`] frame, followed
//! by `(header, body)` frame pairs in the negotiated codec. Frames are
//! `[4-byte length prefix as u32 big-endian] + [data]`.

pub mod protocol;
pub mod transport;

pub use protocol::error::{Result, RpcError};
pub use protocol::option::Options;
pub use protocol::{Header, Seq, MAGIC};
pub use transport::codec::Codec;
