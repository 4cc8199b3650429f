//! Jute records spoken by ZooKeeper-compatible servers.
//!
//! Every exchange is a big-endian length followed by one or more records:
//! a connect request or response during the handshake, then a request
//! header plus body going out and a reply header plus body coming back.
//!
//! [`codec`] holds the primitive encoding and frame limits, [`types`] the
//! enumerations shared across records (opcodes, result codes, create modes,
//! ACLs, `Stat`), and [`messages`] the request and reply bodies this client
//! sends and understands. Nothing here touches a socket; sessions,
//! request ids and keep-alive are handled by `zkreg-runtime`.

pub mod codec;
pub mod messages;
pub mod types;

pub use codec::{Decode, DecodeError, Encode, MAX_FRAME_LEN, Reader, encode_frame};
pub use messages::*;
pub use types::*;
