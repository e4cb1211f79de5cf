//! bundlekit CLI: build asset bundles from a JSON manifest.
//!
//! Resolves include directives, runs transform stages and writes one
//! artifact per output extension and distribution kind.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
