use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

const DEFAULT_FILTER: &str = "longrun=info,pw_longrun_server=info,warn";

pub fn init_logging(verbosity: u8, configured: Option<&str>) {
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity, configured)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}

/// Directives used when `RUST_LOG` is unset.
fn default_filter(verbosity: u8, configured: Option<&str>) -> &str {
	// 0 = config file level, else info for our crates and warn elsewhere
	// 1 (-v) = debug for the scheduler and server, info for dependencies
	// 2+ (-vv) = trace for the scheduler and server, debug for dependencies
	match verbosity {
		0 => configured.unwrap_or(DEFAULT_FILTER),
		1 => "longrun=debug,pw_longrun_server=debug,info",
		_ => "longrun=trace,pw_longrun_server=trace,debug",
	}
}
