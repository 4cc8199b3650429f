//! Error types for registration.

use std::path::PathBuf;

use thiserror::Error;
use zkreg_runtime::Error as SessionError;

/// Failure to establish the session in [`start`](crate::RegisterPlugin::start).
#[derive(Debug, Error)]
pub enum ConnectError {
	#[error("invalid configuration: {0}")]
	Config(#[from] ConfigError),

	#[error("failed to open a session with {servers}: {source}")]
	Session {
		servers: String,
		#[source]
		source: SessionError,
	},
}

/// Failure to validate or create a namespace path.
#[derive(Debug, Error)]
pub enum PathError {
	#[error("path should not be empty")]
	Empty,

	#[error("path must start with '/': {0:?}")]
	NotAbsolute(String),

	#[error("path contains an empty segment: {0:?}")]
	EmptySegment(String),

	#[error("failed to create {path}: {source}")]
	Coordination {
		path: String,
		#[source]
		source: SessionError,
	},
}

/// Failure to register a service instance.
#[derive(Debug, Error)]
pub enum RegisterError {
	#[error("register plugin has not been started")]
	NotStarted,

	#[error("invalid {what} {value:?}: must be non-empty and contain no '/'")]
	InvalidSegment { what: &'static str, value: String },

	#[error(transparent)]
	Path(#[from] PathError),

	#[error("failed to create registration node {path}: {source}{}", stale_note(.stale_delete))]
	Create {
		path: String,
		#[source]
		source: SessionError,
		/// Failure to remove the previous node at the same path, if any.
		stale_delete: Option<SessionError>,
	},
}

fn stale_note(stale_delete: &Option<SessionError>) -> String {
	match stale_delete {
		Some(err) => format!(" (removing the stale node also failed: {err})"),
		None => String::new(),
	}
}

impl RegisterError {
	/// The coordination-service failure underneath, if there is one.
	pub fn session_error(&self) -> Option<&SessionError> {
		match self {
			Self::Path(PathError::Coordination { source, .. }) | Self::Create { source, .. } => Some(source),
			_ => None,
		}
	}
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read {}: {source}", .path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse configuration: {0}")]
	Parse(#[from] serde_json::Error),

	#[error("at least one coordination server is required")]
	NoServers,

	#[error("invalid server address {0:?}: expected host or host:port")]
	InvalidServer(String),

	#[error("invalid base path {path:?}: {reason}")]
	InvalidBasePath { path: String, reason: PathError },

	#[error("base path must not end with '/': {0:?}")]
	TrailingSlash(String),

	#[error("service address must not be empty or contain '/': {0:?}")]
	InvalidServiceAddress(String),

	#[error("session timeout must be greater than zero")]
	ZeroTimeout,
}
