//! tgforward - forward saved Telegram messages into a group, in batches
//!
//! Subcommands:
//! - `forward`: page through the source chat and forward each page directly
//! - `cache`: store the source history as numbered batch files
//! - `replay`: forward cached batches, resuming from the checkpoint
//! - `status`: show the cache and the resume point
//!
//! Credentials come from the `appid`, `hashid` and `number` environment
//! variables (a `.env` file is read if present).

use clap::Parser;
use tgforward::forwarder::{execute_command, ForwarderCli};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = ForwarderCli::parse();

    // Initialize logging
    let default_filter = if cli.verbose {
        "tgforward=debug,warn"
    } else {
        "tgforward=info,warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match execute_command(cli.command).await {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
