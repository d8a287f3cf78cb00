//! Personacast CLI entry point.

use clap::Parser;
use personacast_cli::{logging, run, runtime, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Config errors surface again when the command loads it
    let logging_config = runtime::load_config(cli.config.as_deref())
        .map(|config| config.logging)
        .unwrap_or_default();
    logging::init(cli.verbose, &logging_config);

    // Run the command
    run(cli).await
}
