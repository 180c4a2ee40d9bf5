//! Control plane CLI entry point.

use anyhow::Result;
use clap::Parser;
use controlplane::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    Cli::parse().dispatch().await
}
