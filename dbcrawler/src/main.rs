//! dbcrawler: deterministic database metadata reports.
//!
//! # Security Guarantees
//! - Read-only database operations only
//! - No credentials stored or logged

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dbcrawler::{Cli, EXIT_FAILURE, run};
use dbcrawler_core::logging::init_logging;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<u8> {
    init_logging(cli.global.verbose, cli.global.quiet).context("Failed to set up logging")?;

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current phase");
            ctrl_c.cancel();
        }
    });

    let code = run(&cli, token).await?;
    Ok(code)
}
