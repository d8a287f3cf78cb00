//! Serve command.

use crate::runtime::{self, Runtime};
use clap::Args;
use personacast_core::config::BindMode;
use personacast_gateway::{Gateway, GatewayConfig};
use std::path::Path;
use tracing::info;

/// Serve command arguments.
#[derive(Args)]
pub struct ServeArgs {
    /// Bind mode (loopback, lan)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Port number
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Record deliveries in memory instead of calling the platform API
    #[arg(long)]
    pub dry_run: bool,
}

/// Parse a bind mode name.
pub fn parse_bind(value: &str) -> anyhow::Result<BindMode> {
    match value {
        "loopback" => Ok(BindMode::Loopback),
        "lan" => Ok(BindMode::Lan),
        other => anyhow::bail!("Invalid bind mode: {}. Valid options: loopback, lan", other),
    }
}

/// Run the serve command.
pub async fn run(args: ServeArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = runtime::load_config(config_path)?;
    if let Some(bind) = &args.bind {
        config.gateway.bind = parse_bind(bind)?;
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }

    let gateway_config = GatewayConfig::from_config(&config.gateway);
    let runtime = if args.dry_run {
        info!("Dry run: deliveries are recorded, not sent");
        Runtime::dry_run(config)?
    } else {
        Runtime::http(config)?
    };

    info!(
        cache_dir = %runtime.engine.avatars().cache_dir().display(),
        personas = runtime.directory.len(),
        "Avatar cache ready"
    );

    let gateway = Gateway::new(gateway_config, runtime.engine.clone())
        .with_directory(runtime.directory.clone());
    gateway.run().await?;
    Ok(())
}
