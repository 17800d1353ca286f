//! Framed wire transport.
//!
//! Messages are sent with a 4-byte length prefix (big-endian u32) followed
//! by the codec-encoded data:
//!
//! ```text
//! [4-byte length] [data]
//! ```
//!
//! One RPC message occupies exactly two frames, a header frame followed by a
//! body frame. The handshake is a single JSON frame.

pub mod codec;
pub mod frame;

pub use codec::{Codec, JSON_TYPE};
pub use frame::{read_frame, write_frame, write_message};
