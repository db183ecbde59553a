use std::process::ExitCode;

use clap::Parser;
use drobots::cli::Cli;
use drobots::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let config = match cli.client_config() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(category = err.category(), error = %err, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    match drobots::run(&config, interrupted()).await {
        Ok(outcome) => {
            tracing::info!(%outcome, "match over");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(category = err.category(), error = %err, "client failed");
            ExitCode::FAILURE
        }
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
