//! Ferry CLI - Command-line interface
//!
//! Runs the relay server and generates shareable stream links.

mod commands;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use ferry_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "A range-aware media relay", version)]
struct Cli {
    /// Console log level (RUST_LOG takes precedence)
    #[arg(long, global = true, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_tracing_level(), Some(Path::new("logs")))
        .context("Failed to initialize logging")?;

    commands::handle_command(cli.command).await
}
