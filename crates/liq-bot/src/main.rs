//! Liquidation-hunting trading daemon - entry point.

use anyhow::Result;
use clap::{Parser, Subcommand};
use liq_bot::{Application, BotConfig};
use tracing::info;

/// Liquidation-hunting trading daemon for perpetual futures.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (also settable via LIQBOT_CONFIG).
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon (default).
    Start,
    /// Print account balances, open positions, and position mode.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    liq_bot::logging::init_logging();

    let args = Args::parse();
    let config = BotConfig::load(args.config.as_deref())?;
    info!(
        paper = config.global.paper_mode,
        symbols = config.symbols.len(),
        "configuration loaded"
    );

    let app = Application::new(config);
    match args.command.unwrap_or(Command::Start) {
        Command::Start => app.run().await?,
        Command::Status => app.status().await?,
    }
    Ok(())
}
