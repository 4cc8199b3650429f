use serde::{Deserialize, Serialize};
use zkreg_runtime::protocol::Stat;

/// The result envelope returned by all commands.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T> {
	pub ok: bool,
	pub command: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub duration_ms: Option<u64>,
}

impl<T> CommandResult<T> {
	pub fn success(command: &str, data: T) -> Self {
		Self {
			ok: true,
			command: command.to_string(),
			data: Some(data),
			error: None,
			duration_ms: None,
		}
	}

	pub fn failure(command: &str, error: CommandError) -> Self {
		Self {
			ok: false,
			command: command.to_string(),
			data: None,
			error: Some(error),
			duration_ms: None,
		}
	}

	pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
		self.duration_ms = Some(duration_ms);
		self
	}
}

/// Error information for failed commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
}

/// Standardized error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	InvalidInput,
	ConnectFailed,
	RegisterFailed,
	SessionLost,
	CoordinationError,
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
			ErrorCode::ConnectFailed => write!(f, "CONNECT_FAILED"),
			ErrorCode::RegisterFailed => write!(f, "REGISTER_FAILED"),
			ErrorCode::SessionLost => write!(f, "SESSION_LOST"),
			ErrorCode::CoordinationError => write!(f, "COORDINATION_ERROR"),
		}
	}
}

/// Payload of `zkreg register`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterData {
	pub session_id: String,
	pub nodes: Vec<String>,
}

/// Payload of `zkreg ensure`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsureData {
	pub path: String,
}

/// Payload of `zkreg check`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckData {
	pub path: String,
	pub registered: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stat: Option<Stat>,
}
