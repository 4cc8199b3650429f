//! Plugin configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PathError};
use crate::path::NamespacePath;

/// Session timeout used when the configuration does not name one.
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 1000;

fn default_session_timeout_ms() -> u64 {
	DEFAULT_SESSION_TIMEOUT_MS
}

/// Where to register and which cluster to register with.
///
/// ```json
/// {
///   "service_address": "127.0.0.1:8972",
///   "servers": ["zk1:2181", "zk2:2181"],
///   "base_path": "/rpcx",
///   "session_timeout_ms": 1000
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
	/// Address this instance advertises, typically `host:port`.
	pub service_address: String,
	/// Coordination servers as `host:port`, tried in order; a bare host uses
	/// port 2181.
	pub servers: Vec<String>,
	/// Namespace under which services register.
	pub base_path: String,
	#[serde(default = "default_session_timeout_ms")]
	pub session_timeout_ms: u64,
}

impl RegistryConfig {
	pub fn new(service_address: impl Into<String>, servers: Vec<String>, base_path: impl Into<String>) -> Self {
		Self {
			service_address: service_address.into(),
			servers,
			base_path: base_path.into(),
			session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
		}
	}

	pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
		self.session_timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
		self
	}

	pub fn session_timeout(&self) -> Duration {
		Duration::from_millis(self.session_timeout_ms)
	}

	pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
		let config: Self = serde_json::from_str(content)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads and validates a JSON configuration file.
	pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_json_str(&content)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.servers.is_empty() {
			return Err(ConfigError::NoServers);
		}
		if let Some(server) = self.servers.iter().find(|server| !is_host_port(server)) {
			return Err(ConfigError::InvalidServer(server.clone()));
		}

		NamespacePath::parse(&self.base_path).map_err(|reason| match reason {
			PathError::EmptySegment(_) if self.base_path.ends_with('/') => ConfigError::TrailingSlash(self.base_path.clone()),
			reason => ConfigError::InvalidBasePath {
				path: self.base_path.clone(),
				reason,
			},
		})?;

		if self.service_address.is_empty() || self.service_address.contains('/') {
			return Err(ConfigError::InvalidServiceAddress(self.service_address.clone()));
		}
		if self.session_timeout_ms == 0 {
			return Err(ConfigError::ZeroTimeout);
		}
		Ok(())
	}
}

fn is_host_port(server: &str) -> bool {
	match server.rsplit_once(':') {
		Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
		None => !server.is_empty() && !server.contains(char::is_whitespace),
	}
}
