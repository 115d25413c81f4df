//! Anyflix CLI - Command-line interface
//!
//! Serves a local or generated library over the streaming API.

mod commands;

use clap::Parser;

#[derive(Parser)]
#[command(name = "anyflix")]
#[command(about = "Torrent-backed media streaming server")]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::handle_command(cli.command).await
}
