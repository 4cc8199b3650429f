use std::time::Instant;

use clap::Parser;
use tracing::error;
use zkreg_cli::cli::Cli;
use zkreg_cli::output::{CommandResult, print_result};
use zkreg_cli::{commands, error::classify, logging};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let format = cli.format;
	let command = cli.command.name();
	let started = Instant::now();

	if let Err(err) = commands::dispatch(cli).await {
		error!(target: "zkreg", error = %format!("{err:#}"), "command failed");
		let result = CommandResult::<()>::failure(command, classify(&err)).with_duration_ms(commands::elapsed_ms(started.elapsed()));
		print_result(&result, format);
		std::process::exit(1);
	}
}
