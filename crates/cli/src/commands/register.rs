use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};
use zkreg::{RegisterPlugin, ZooKeeperRegisterPlugin};
use zkreg_runtime::{SessionState, hex_id};

use super::CommandContext;
use crate::error::CliError;
use crate::output::RegisterData;

/// Registers `services`, holds until a signal, the hold time, or session loss,
/// then unregisters and closes.
pub async fn execute(ctx: &CommandContext, services: &[String], hold: Option<Duration>) -> Result<()> {
	let config = ctx.settings.registry_config()?;
	let mut plugin = ZooKeeperRegisterPlugin::new(config);
	plugin.start().await?;

	let mut nodes = Vec::with_capacity(services.len());
	for service in services {
		if let Err(err) = plugin.register(service, &()).await {
			teardown(&mut plugin, &services[..nodes.len()]).await;
			return Err(err).with_context(|| format!("registering {service}"));
		}
		let config = plugin.config();
		nodes.push(zkreg::registration_path(&config.base_path, &config.service_address, service)?.to_string());
	}

	let Some(session) = plugin.session().cloned() else {
		return Err(zkreg::RegisterError::NotStarted.into());
	};
	ctx.emit(RegisterData {
		session_id: hex_id(session.session_id()),
		nodes,
	});

	let outcome = tokio::select! {
		_ = shutdown_signal() => {
			info!(target: "zkreg", "signal received; unregistering");
			Ok(())
		}
		_ = hold_for(hold) => {
			info!(target: "zkreg", "hold time elapsed; unregistering");
			Ok(())
		}
		state = session_ended(session.subscribe()) => Err(CliError::SessionLost(state)),
	};

	teardown(&mut plugin, services).await;
	Ok(outcome?)
}

async fn teardown(plugin: &mut ZooKeeperRegisterPlugin, services: &[String]) {
	for service in services {
		plugin.unregister(service).await;
	}
	plugin.close().await;
}

async fn hold_for(hold: Option<Duration>) {
	match hold {
		Some(hold) => tokio::time::sleep(hold).await,
		None => std::future::pending().await,
	}
}

async fn session_ended(mut state: watch::Receiver<SessionState>) -> SessionState {
	let ended = match state.wait_for(|state| state.is_terminal()).await {
		Ok(state) => *state,
		Err(_) => SessionState::Closed,
	};
	warn!(target: "zkreg", state = ?ended, "session ended; registrations are gone");
	ended
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(err) = tokio::signal::ctrl_c().await {
			warn!(target: "zkreg", error = %err, "cannot listen for ctrl-c");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			}
			Err(err) => {
				warn!(target: "zkreg", error = %err, "cannot listen for SIGTERM");
				std::future::pending::<()>().await;
			}
		}
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {}
		_ = terminate => {}
	}
}
