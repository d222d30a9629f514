//! sopsfs CLI Binary
//!
//! Command-line interface over the encrypted-document projection engine.

use anyhow::Context;
use clap::Parser;
use sopsfs::cli::{Cli, CliContext};
use std::process;

async fn run(cli: Cli) -> anyhow::Result<()> {
    let context = CliContext::new(cli.config.clone(), cli.log_level.clone())
        .context("initializing configuration")?;
    let output = context.execute(&cli.command).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
