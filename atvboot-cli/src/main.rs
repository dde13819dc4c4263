//! atvboot CLI - Command-line interface
//!
//! Runs the interception bootstrap server and exposes its decisions for
//! inspection from a shell.

mod commands;

use std::path::PathBuf;

use atvboot_core::tracing_setup::{CliLogLevel, init_tracing};
use clap::Parser;

#[derive(Parser)]
#[command(name = "atvboot")]
#[command(about = "Interception bootstrap server for AirPlay playback devices")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    /// Directory for the full trace log of this run
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())?;

    commands::handle_command(cli.command).await
}
