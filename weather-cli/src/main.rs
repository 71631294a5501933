//! Binary crate for the `weather` command-line host.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration
//! - Hosting tool invocations and printing their envelopes

use clap::Parser;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    init_tracing(cmd.log_json);
    cmd.run().await
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        warn!(error = %e, "tracing init failed");
    }
}
