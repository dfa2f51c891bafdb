//! HTTP front end and CLI for the `longrun` task scheduler.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod server;
pub mod sink;
pub mod submit;

pub use error::{Result, ServerError};
pub use routes::AppState;
pub use server::ApiServer;

use anyhow::Context;

use crate::cli::{Cli, Commands};
use crate::config::Config;

/// Loads configuration, installs logging and runs the selected command.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
	let loaded = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
	logging::init_logging(cli.verbose, loaded.config.logging.level.as_deref());
	if let Some(path) = &loaded.path {
		tracing::info!(target = "longrun.server", path = %path.display(), "using config file");
	}

	match cli.command {
		Commands::Serve { host, port } => {
			let config = loaded.config.with_overrides(host, port);
			ApiServer::new(config).run().await.context("Server error")
		}
		Commands::Config => {
			let json = serde_json::to_string_pretty(&loaded.config)?;
			println!("{json}");
			Ok(())
		}
	}
}
