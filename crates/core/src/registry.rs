//! Registration nodes: one ephemeral node per service instance.
//!
//! An instance of `service` reachable at `address` is advertised as the node
//! `{base}/{service}/{address}`, created ephemeral so the server removes it
//! when the session ends. Registering again replaces the node; unregistering
//! is best-effort.

use bytes::Bytes;
use tracing::{debug, info, warn};
use zkreg_protocol::{CreateMode, open_acl};
use zkreg_runtime::Session;

use crate::error::RegisterError;
use crate::path::{NamespacePath, ensure_exists};

/// Rejects names that would not form exactly one path segment.
pub fn validate_segment(what: &'static str, value: &str) -> Result<(), RegisterError> {
	if value.is_empty() || value.contains('/') {
		return Err(RegisterError::InvalidSegment {
			what,
			value: value.to_string(),
		});
	}
	Ok(())
}

/// Namespace node under which instances of `service_name` register.
pub fn service_path(base_path: &str, service_name: &str) -> Result<NamespacePath, RegisterError> {
	validate_segment("service name", service_name)?;
	Ok(NamespacePath::parse(base_path)?.join(service_name))
}

/// Full path of the registration node for one instance.
pub fn registration_path(base_path: &str, service_address: &str, service_name: &str) -> Result<NamespacePath, RegisterError> {
	validate_segment("service address", service_address)?;
	Ok(service_path(base_path, service_name)?.join(service_address))
}

/// Advertises `service_address` as a live instance of `service_name`.
///
/// Ensures the service's namespace node, deletes any node already at the
/// registration path, then creates a fresh ephemeral one. A failed delete is
/// logged and only reported if the create fails too.
pub async fn register(session: &Session, base_path: &str, service_address: &str, service_name: &str) -> Result<(), RegisterError> {
	let node = registration_path(base_path, service_address, service_name)?;
	let service = service_path(base_path, service_name)?;
	ensure_exists(session, service.as_str()).await?;

	let mut stale_delete = None;
	match session.exists(node.as_str()).await {
		Ok(Some(stat)) => {
			debug!(
				target: "zkreg.registry",
				path = %node,
				owner = %zkreg_runtime::hex_id(stat.ephemeral_owner),
				"replacing existing registration"
			);
			match session.delete(node.as_str(), None).await {
				Ok(()) => {}
				Err(err) if err.is_no_node() => {}
				Err(err) => {
					warn!(target: "zkreg.registry", path = %node, error = %err, "failed to delete existing registration");
					stale_delete = Some(err);
				}
			}
		}
		Ok(None) => {}
		Err(err) => debug!(target: "zkreg.registry", path = %node, error = %err, "existence check failed"),
	}

	match session.create(node.as_str(), Bytes::new(), open_acl(), CreateMode::Ephemeral).await {
		Ok(_) => {
			info!(target: "zkreg.registry", path = %node, service = service_name, "service registered");
			Ok(())
		}
		Err(source) => Err(RegisterError::Create {
			path: node.to_string(),
			source,
			stale_delete,
		}),
	}
}

/// Removes the registration node if present.
///
/// Never fails: problems are logged at warn level and the call returns.
pub async fn unregister(session: &Session, base_path: &str, service_address: &str, service_name: &str) {
	let node = match registration_path(base_path, service_address, service_name) {
		Ok(node) => node,
		Err(err) => {
			warn!(target: "zkreg.registry", service = service_name, error = %err, "cannot unregister");
			return;
		}
	};

	match session.exists(node.as_str()).await {
		Ok(Some(_)) => {}
		Ok(None) => {
			debug!(target: "zkreg.registry", path = %node, "nothing to unregister");
			return;
		}
		Err(err) => {
			warn!(target: "zkreg.registry", path = %node, error = %err, "failed to check registration");
			return;
		}
	}

	match session.delete(node.as_str(), None).await {
		Ok(()) => info!(target: "zkreg.registry", path = %node, service = service_name, "service unregistered"),
		Err(err) => warn!(target: "zkreg.registry", path = %node, error = %err, "failed to delete registration"),
	}
}
