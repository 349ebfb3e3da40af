//! ## netledger
//! Captures live traffic from one interface into SQLite and serves the
//! stored records over HTTP.

use clap::Parser;

mod commands;

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::run_command(cli).await
}
