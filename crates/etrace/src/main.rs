//! etrace CLI

use clap::Parser;
use tracing_subscriber::EnvFilter;

use etrace::cli::{Cli, EXIT_FAILURE, EXIT_SUCCESS};
use etrace::orchestrator;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("etrace=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let exit_code = match orchestrator::run(&cli) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            EXIT_FAILURE
        }
    };

    std::process::exit(exit_code);
}
