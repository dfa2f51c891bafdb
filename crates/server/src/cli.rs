use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pw-longrun")]
#[command(about = "Deferred task API for slow, single-session remote automation")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v debug, -vv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Configuration file (defaults to ./pw-longrun.config.json, then the user config dir)
	#[arg(short, long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
	/// Serve the task API until SIGINT or SIGTERM
	Serve {
		/// Address to bind, overriding the config file
		#[arg(long)]
		host: Option<String>,

		/// Port to bind, overriding the config file
		#[arg(long)]
		port: Option<u16>,
	},

	/// Print the resolved configuration as JSON
	Config,
}
