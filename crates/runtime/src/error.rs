//! Error types for the coordination client.

use zkreg_protocol::{DecodeError, ErrorCode, OpCode};

/// Failure talking to the coordination service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	#[error("malformed frame: {0}")]
	Decode(#[from] DecodeError),

	#[error("timed out: {0}")]
	Timeout(String),

	#[error("no coordination server reachable (tried {servers}): {last}")]
	NoServerReachable { servers: String, last: String },

	#[error("{op} failed: {code}")]
	Server { op: OpCode, code: ErrorCode },

	#[error("protocol error: {0}")]
	Protocol(String),

	#[error("connection to the coordination server was lost")]
	ConnectionLoss,

	#[error("session is not connected")]
	NotConnected,

	#[error("session has expired")]
	SessionExpired,
}

impl Error {
	/// Server result code, when the failure came from a reply header.
	pub fn code(&self) -> Option<ErrorCode> {
		match self {
			Self::Server { code, .. } => Some(*code),
			_ => None,
		}
	}

	pub fn is_node_exists(&self) -> bool {
		self.code() == Some(ErrorCode::NodeExists)
	}

	pub fn is_no_node(&self) -> bool {
		self.code() == Some(ErrorCode::NoNode)
	}

	/// True for failures caused by the session rather than the request.
	pub fn is_session_error(&self) -> bool {
		matches!(self, Self::NotConnected | Self::SessionExpired | Self::ConnectionLoss)
			|| matches!(self.code(), Some(ErrorCode::SessionExpired | ErrorCode::ConnectionLoss | ErrorCode::SessionMoved))
	}
}

pub type Result<T> = std::result::Result<T, Error>;
