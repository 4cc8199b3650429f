//! The register plugin a host framework drives through its lifecycle.

use std::any::Any;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use zkreg_runtime::{Session, SessionState, hex_id};

use crate::config::RegistryConfig;
use crate::error::{ConnectError, RegisterError};
use crate::registry;

/// Lifecycle a host framework expects from a registration backend.
///
/// The host calls `start` once, `register` for each service it exposes,
/// `unregister` for each on shutdown, and finally `close`.
#[async_trait]
pub trait RegisterPlugin: Send + Sync {
	fn name(&self) -> &'static str;

	fn description(&self) -> &'static str;

	async fn start(&mut self) -> Result<(), ConnectError>;

	async fn close(&mut self);

	/// Advertises the service `name`; `service` is the host's service object.
	async fn register(&self, name: &str, service: &(dyn Any + Send + Sync)) -> Result<(), RegisterError>;

	async fn unregister(&self, name: &str);
}

/// Registers services as ephemeral nodes in a ZooKeeper-style cluster.
#[derive(Debug)]
pub struct ZooKeeperRegisterPlugin {
	config: RegistryConfig,
	session: Option<Session>,
}

impl ZooKeeperRegisterPlugin {
	pub fn new(config: RegistryConfig) -> Self {
		Self { config, session: None }
	}

	pub fn config(&self) -> &RegistryConfig {
		&self.config
	}

	/// The session opened by `start`, kept after `close` so later calls fail
	/// as not connected.
	pub fn session(&self) -> Option<&Session> {
		self.session.as_ref()
	}

	fn started(&self) -> Result<&Session, RegisterError> {
		self.session.as_ref().ok_or(RegisterError::NotStarted)
	}
}

#[async_trait]
impl RegisterPlugin for ZooKeeperRegisterPlugin {
	fn name(&self) -> &'static str {
		"ZooKeeperRegisterPlugin"
	}

	fn description(&self) -> &'static str {
		"a register plugin which can register services into zookeeper for cluster"
	}

	async fn start(&mut self) -> Result<(), ConnectError> {
		if let Some(session) = &self.session {
			if !session.state().is_terminal() {
				debug!(target: "zkreg.plugin", session_id = %hex_id(session.session_id()), "already started");
				return Ok(());
			}
		}

		self.config.validate()?;
		let session = Session::connect(&self.config.servers, self.config.session_timeout())
			.await
			.map_err(|source| ConnectError::Session {
				servers: self.config.servers.join(","),
				source,
			})?;
		info!(
			target: "zkreg.plugin",
			session_id = %hex_id(session.session_id()),
			base_path = %self.config.base_path,
			address = %self.config.service_address,
			"register plugin started"
		);
		self.session = Some(session);
		Ok(())
	}

	async fn close(&mut self) {
		match &self.session {
			Some(session) if session.state() != SessionState::Closed => session.close().await,
			Some(_) => debug!(target: "zkreg.plugin", "already closed"),
			None => debug!(target: "zkreg.plugin", "close without start; nothing to do"),
		}
	}

	async fn register(&self, name: &str, _service: &(dyn Any + Send + Sync)) -> Result<(), RegisterError> {
		let session = self.started()?;
		registry::register(session, &self.config.base_path, &self.config.service_address, name).await
	}

	async fn unregister(&self, name: &str) {
		match self.started() {
			Ok(session) => registry::unregister(session, &self.config.base_path, &self.config.service_address, name).await,
			Err(err) => warn!(target: "zkreg.plugin", service = name, error = %err, "cannot unregister"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn plugin() -> ZooKeeperRegisterPlugin {
		ZooKeeperRegisterPlugin::new(RegistryConfig::new("127.0.0.1:8972", vec!["127.0.0.1:1".into()], "/rpcx"))
	}

	#[test]
	fn identity() {
		let plugin = plugin();
		assert_eq!(plugin.name(), "ZooKeeperRegisterPlugin");
		assert_eq!(plugin.description(), "a register plugin which can register services into zookeeper for cluster");
	}

	#[tokio::test]
	async fn register_before_start_is_rejected() {
		let plugin = plugin();
		let err = plugin.register("Arith", &()).await.unwrap_err();
		assert!(matches!(err, RegisterError::NotStarted));
		plugin.unregister("Arith").await;
	}

	#[tokio::test]
	async fn close_without_start_is_a_no_op() {
		let mut plugin = plugin();
		plugin.close().await;
		assert!(plugin.session().is_none());
	}

	#[tokio::test]
	async fn invalid_config_fails_before_connecting() {
		let mut plugin = ZooKeeperRegisterPlugin::new(RegistryConfig::new("127.0.0.1:8972", vec![], "/rpcx"));
		let err = plugin.start().await.unwrap_err();
		assert!(matches!(err, ConnectError::Config(crate::ConfigError::NoServers)));
		assert!(plugin.session().is_none());
	}
}
