//! Resolves registry settings from the configuration file and flags.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use zkreg::{DEFAULT_SESSION_TIMEOUT_MS, RegistryConfig};

use crate::cli::Cli;

pub const DEFAULT_BASE_PATH: &str = "/rpcx";

/// Settings after merging the config file with command-line overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
	pub servers: Vec<String>,
	pub base_path: String,
	pub address: Option<String>,
	pub session_timeout: Duration,
}

impl Settings {
	pub fn resolve(cli: &Cli) -> Result<Self> {
		let file = match &cli.config {
			Some(path) => Some(RegistryConfig::from_json_file(path).with_context(|| format!("loading {}", path.display()))?),
			None => None,
		};

		let servers = if cli.servers.is_empty() {
			file.as_ref().map(|config| config.servers.clone()).unwrap_or_default()
		} else {
			cli.servers.clone()
		};
		if servers.is_empty() {
			bail!("no coordination servers given; pass --servers or --config");
		}

		let base_path = cli
			.base_path
			.clone()
			.or_else(|| file.as_ref().map(|config| config.base_path.clone()))
			.unwrap_or_else(|| DEFAULT_BASE_PATH.to_string());
		let address = cli.address.clone().or_else(|| file.as_ref().map(|config| config.service_address.clone()));
		let timeout_ms = cli
			.session_timeout_ms
			.or_else(|| file.as_ref().map(|config| config.session_timeout_ms))
			.unwrap_or(DEFAULT_SESSION_TIMEOUT_MS);

		Ok(Self {
			servers,
			base_path,
			address,
			session_timeout: Duration::from_millis(timeout_ms),
		})
	}

	/// Plugin configuration; requires an advertised address.
	pub fn registry_config(&self) -> Result<RegistryConfig> {
		let Some(address) = &self.address else {
			bail!("no service address given; pass --address or set service_address in the config file");
		};
		let config = RegistryConfig::new(address.clone(), self.servers.clone(), self.base_path.clone()).with_session_timeout(self.session_timeout);
		config.validate()?;
		Ok(config)
	}
}
