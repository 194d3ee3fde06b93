//! powerctl - operator CLI for stratus cluster hibernation.
//!
//! Stops, starts, and inspects the power state of a cluster's instances
//! using the same actuators the orchestrator runs, driven from local
//! files instead of the control plane's secret store.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod error;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Actuator logs go to stderr; RUST_LOG=debug surfaces per-server
    // decisions.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
