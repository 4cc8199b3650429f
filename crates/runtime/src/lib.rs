//! Client runtime for the coordination service.
//!
//! Layers, bottom up:
//!
//! - [`transport`]: length-prefixed frames over TCP
//! - [`connection`]: xid allocation and reply correlation on one connection
//! - [`session`]: handshake, keep-alive, reconnect, and close for a session
//!   that outlives individual connections
//!
//! With the `testing` feature, [`testing::MemoryEnsemble`] provides an
//! in-process server speaking the same protocol.

pub mod connection;
pub mod error;
pub mod session;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use connection::Connection;
pub use error::{Error, Result};
pub use session::{DEFAULT_PORT, Session, SessionState, hex_id, with_default_port};
pub use zkreg_protocol as protocol;
