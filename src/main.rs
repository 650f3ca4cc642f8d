//! docker-platformify
//!
//! Transparent proxy between a Docker client and the daemon socket that adds
//! a fixed `platform` to every image pull/create request.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                  PLATFORMIFY                     │
//!                     │                                                  │
//!   docker client     │  ┌──────────┐   ┌─────────┐   ┌──────────────┐   │
//!   ──────────────────┼─▶│   net    │──▶│ session │──▶│ relay (scan  │───┼──▶ daemon
//!                     │  │ listener │   │         │   │  + rewrite)  │   │    socket
//!                     │  └──────────┘   │         │   └──────────────┘   │
//!   ◀─────────────────┼─────────────────│         │◀──│ relay (plain)│◀──┼───
//!                     │                 └─────────┘   └──────────────┘   │
//!                     │                                                  │
//!                     │  config · observability · lifecycle · resilience │
//!                     └──────────────────────────────────────────────────┘
//! ```

use std::process::ExitCode;

use clap::Parser;

use docker_platformify::config::{load_config, Cli};
use docker_platformify::lifecycle::startup;
use docker_platformify::observability::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // Usage errors exit 1 rather than clap's default 2
            return if err.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };

    let config = match load_config(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init(config.logging.level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.logging.level,
        "docker-platformify starting"
    );

    match startup::run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}
