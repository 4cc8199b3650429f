use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "zkreg")]
#[command(about = "Register services in a ZooKeeper-style coordination cluster")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format
	#[arg(short = 'f', long, global = true, value_enum, default_value_t = OutputFormat::Json)]
	pub format: OutputFormat,

	/// Load settings from a JSON configuration file; flags override its values
	#[arg(short, long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Coordination servers as host:port, comma separated
	#[arg(long, global = true, value_delimiter = ',', value_name = "HOST:PORT")]
	pub servers: Vec<String>,

	/// Namespace under which services register
	#[arg(long, global = true, value_name = "PATH")]
	pub base_path: Option<String>,

	/// Address this instance advertises
	#[arg(short, long, global = true, value_name = "HOST:PORT")]
	pub address: Option<String>,

	/// Session timeout in milliseconds
	#[arg(long, global = true, value_name = "MS")]
	pub session_timeout_ms: Option<u64>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Register services and keep them registered until interrupted
	#[command(alias = "reg")]
	Register {
		/// Service names to register
		#[arg(required = true)]
		services: Vec<String>,

		/// Unregister and exit after this many milliseconds instead of waiting for a signal
		#[arg(long, value_name = "MS")]
		hold_ms: Option<u64>,
	},

	/// Create a namespace path and any missing ancestors
	Ensure { path: String },

	/// Report whether this instance is registered for a service
	Check { service: String },
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Register { .. } => "register",
			Commands::Ensure { .. } => "ensure",
			Commands::Check { .. } => "check",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn servers_split_on_commas() {
		let cli = Cli::try_parse_from(["zkreg", "--servers", "zk1:2181,zk2:2181", "check", "Arith"]).unwrap();
		assert_eq!(cli.servers, ["zk1:2181", "zk2:2181"]);
		assert!(matches!(cli.command, Commands::Check { ref service } if service == "Arith"));
	}

	#[test]
	fn global_flags_follow_the_subcommand() {
		let cli = Cli::try_parse_from(["zkreg", "register", "Arith", "Echo", "-vv", "--address", "127.0.0.1:8972", "--hold-ms", "50"]).unwrap();
		assert_eq!(cli.verbose, 2);
		assert_eq!(cli.address.as_deref(), Some("127.0.0.1:8972"));
		match cli.command {
			Commands::Register { services, hold_ms } => {
				assert_eq!(services, ["Arith", "Echo"]);
				assert_eq!(hold_ms, Some(50));
			}
			other => panic!("unexpected command {other:?}"),
		}
	}

	#[test]
	fn register_needs_a_service() {
		assert!(Cli::try_parse_from(["zkreg", "register"]).is_err());
	}
}
