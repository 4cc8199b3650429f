mod check;
mod ensure;
mod register;

use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;
use zkreg_runtime::Session;

use crate::cli::{Cli, Commands};
use crate::output::{CommandResult, OutputFormat, print_result};
use crate::settings::Settings;

/// Per-invocation state shared by every command.
pub struct CommandContext {
	pub settings: Settings,
	pub format: OutputFormat,
	command: &'static str,
	started: Instant,
}

impl CommandContext {
	pub fn new(settings: Settings, format: OutputFormat, command: &'static str) -> Self {
		Self {
			settings,
			format,
			command,
			started: Instant::now(),
		}
	}

	/// Prints a success envelope for `data`.
	pub fn emit<T: Serialize>(&self, data: T) {
		let result = CommandResult::success(self.command, data).with_duration_ms(elapsed_ms(self.started.elapsed()));
		print_result(&result, self.format);
	}

	/// Opens a bare session for commands that need no registration.
	pub async fn connect(&self) -> Result<Session> {
		Ok(Session::connect(&self.settings.servers, self.settings.session_timeout).await?)
	}
}

pub fn elapsed_ms(elapsed: Duration) -> u64 {
	elapsed.as_millis().min(u64::MAX as u128) as u64
}

pub async fn dispatch(cli: Cli) -> Result<()> {
	let ctx = CommandContext::new(Settings::resolve(&cli)?, cli.format, cli.command.name());
	match cli.command {
		Commands::Register { services, hold_ms } => register::execute(&ctx, &services, hold_ms.map(Duration::from_millis)).await,
		Commands::Ensure { path } => ensure::execute(&ctx, &path).await,
		Commands::Check { service } => check::execute(&ctx, &service).await,
	}
}
