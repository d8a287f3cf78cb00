//! Personacast command-line interface.

pub mod commands;
pub mod logging;
pub mod render;
pub mod runtime;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Personacast - persona message delivery
#[derive(Parser)]
#[command(name = "personacast")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "PERSONACAST_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the avatar and delivery gateway
    Serve(commands::serve::ServeArgs),

    /// Deliver a message as a persona
    Deliver(commands::deliver::DeliverArgs),

    /// Show how a message would be split into chunks
    Split(commands::split::SplitArgs),

    /// Manage the avatar cache
    Avatars(commands::avatars::AvatarsArgs),

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Show version information
    Version,
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve(args) => commands::serve::run(args, config_path).await,
        Commands::Deliver(args) => commands::deliver::run(args, config_path).await,
        Commands::Split(args) => commands::split::run(args, config_path).await,
        Commands::Avatars(args) => commands::avatars::run(args, config_path).await,
        Commands::Config(args) => commands::config::run(args, config_path).await,
        Commands::Version => {
            println!("personacast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
