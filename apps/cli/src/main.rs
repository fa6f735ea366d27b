//! codejson CLI: builds the `code.json` software inventory manifest.
//!
//! Reads the import and append lists, enriches each release with its
//! repository description and writes the manifest artifact.

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
