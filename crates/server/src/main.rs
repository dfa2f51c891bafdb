use clap::Parser;
use pw_longrun_server::cli::Cli;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	if let Err(err) = pw_longrun_server::run(cli).await {
		eprintln!("Error: {err:#}");
		std::process::exit(1);
	}
}
