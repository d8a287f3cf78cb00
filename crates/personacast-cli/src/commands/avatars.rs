//! Avatar cache commands.

use crate::render;
use crate::runtime::{self, Runtime};
use clap::Args;
use personacast_delivery::PersonaDirectory;
use std::path::Path;

/// Avatars command arguments.
#[derive(Args)]
pub struct AvatarsArgs {
    #[command(subcommand)]
    pub command: AvatarsCommand,
}

#[derive(clap::Subcommand)]
pub enum AvatarsCommand {
    /// List cached avatars
    List {
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download and cache persona avatars
    Preload {
        /// Persona keys
        personas: Vec<String>,

        /// Preload every configured persona
        #[arg(long, conflicts_with = "personas")]
        all: bool,
    },

    /// Drop a persona's cached avatar
    Invalidate {
        /// Persona key
        persona: String,
    },

    /// Delete cached files no entry refers to
    Prune,
}

/// Run the avatars command.
pub async fn run(args: AvatarsArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = runtime::load_config(config_path)?;
    let runtime = Runtime::http(config)?;
    let avatars = runtime.engine.avatars();

    match args.command {
        AvatarsCommand::List { json } => {
            let mut entries = avatars.entries().await?;
            entries.sort_by(|a, b| a.persona_key.cmp(&b.persona_key));
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                render::render_avatar_entries(&entries);
            }
        }

        AvatarsCommand::Preload { personas, all } => {
            let personas = if all {
                runtime.directory.list()
            } else {
                let mut found = Vec::with_capacity(personas.len());
                for key in &personas {
                    match runtime.directory.get_persona(key).await {
                        Some(persona) => found.push(persona),
                        None => anyhow::bail!("Unknown persona: {}", key),
                    }
                }
                found
            };

            if personas.is_empty() {
                println!("No personas to preload.");
            }
            for persona in &personas {
                if let Some(url) = avatars.preload(Some(persona)).await {
                    println!("{} -> {}", persona.full_name, url);
                }
            }
        }

        AvatarsCommand::Invalidate { persona } => {
            if avatars.invalidate(&persona).await? {
                println!("Invalidated avatar for {}", persona);
            } else {
                println!("No cached avatar for {}", persona);
            }
        }

        AvatarsCommand::Prune => {
            let removed = avatars.prune_orphans().await?;
            println!("Removed {} orphaned file(s)", removed);
        }
    }

    Ok(())
}
