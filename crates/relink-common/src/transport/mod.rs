//! relink transport layer
//!
//! Framing and a reference peer for the NUL-terminated message protocol.
//!
//! # Wire Format
//!
//! - **Client -> server**: a one-time handshake probe (`\n`), then
//!   `[message] [0x00]` per outbound message
//! - **Server -> client**: `[prefix byte] [message] [0x00]`
//!
//! The prefix byte is reserved by the server and never delivered to the
//! application. An empty message is a heartbeat.
//!
//! # Components
//!
//! - **[`FrameCodec`]**: `tokio_util` codec for the frames above
//! - **[`EchoServer`]**: async TCP peer that echoes every frame back

pub mod codec;
pub mod tcp_server;

pub use codec::{bound_message, encode_reply, FrameCodec, HANDSHAKE_PROBE, PREFIX_LEN, TERMINATOR};
pub use tcp_server::{EchoServer, ECHO_PREFIX};

#[cfg(test)]
mod tests;
