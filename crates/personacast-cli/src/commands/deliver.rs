//! Deliver command.

use crate::render;
use crate::runtime::{self, Runtime};
use clap::Args;
use personacast_core::types::{ChannelRef, Embed};
use personacast_delivery::{Attachment, DeliverOptions, PersonaDirectory};
use std::path::{Path, PathBuf};

/// Deliver command arguments.
#[derive(Args)]
pub struct DeliverArgs {
    /// Target channel ID
    #[arg(long)]
    pub channel: String,

    /// Parent channel ID when the target is a thread
    #[arg(long)]
    pub thread_parent: Option<String>,

    /// Persona key from the config file
    #[arg(short, long)]
    pub persona: Option<String>,

    /// Message text (read from stdin when omitted)
    pub content: Option<String>,

    /// File to attach to the last message
    #[arg(short, long = "attach")]
    pub attachments: Vec<PathBuf>,

    /// Model indicator appended to the message
    #[arg(long)]
    pub model_indicator: Option<String>,

    /// Embed title
    #[arg(long)]
    pub embed_title: Option<String>,

    /// Embed description
    #[arg(long, requires = "embed_title")]
    pub embed_description: Option<String>,

    /// Mark the message as a system error
    #[arg(long)]
    pub error: bool,

    /// Print the messages instead of sending them
    #[arg(long)]
    pub dry_run: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl DeliverArgs {
    /// Channel reference for the target.
    pub fn channel_ref(&self) -> ChannelRef {
        match &self.thread_parent {
            Some(parent) => ChannelRef::thread(&self.channel, parent),
            None => ChannelRef::text(&self.channel),
        }
    }

    /// Delivery options from the flags.
    pub fn options(&self) -> anyhow::Result<DeliverOptions> {
        let mut options = DeliverOptions::default();
        if let Some(title) = &self.embed_title {
            let mut embed = Embed::titled(title);
            if let Some(description) = &self.embed_description {
                embed = embed.with_description(description);
            }
            options = options.with_embed(embed);
        }
        for path in &self.attachments {
            options = options.with_attachment(Attachment::from_path(path)?);
        }
        if let Some(indicator) = &self.model_indicator {
            options = options.with_model_indicator(indicator);
        }
        if self.error {
            options = options.as_error();
        }
        Ok(options)
    }
}

/// Run the deliver command.
pub async fn run(args: DeliverArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = runtime::load_config(config_path)?;
    let runtime = if args.dry_run {
        Runtime::dry_run(config)?
    } else {
        Runtime::http(config)?
    };

    let persona = match &args.persona {
        Some(key) => Some(
            runtime
                .directory
                .get_persona(key)
                .await
                .ok_or_else(|| anyhow::anyhow!("Unknown persona: {}", key))?,
        ),
        None => None,
    };

    let options = args.options()?;
    let channel = args.channel_ref();
    let content = super::content_or_stdin(args.content).await?;

    let result = runtime
        .engine
        .deliver(&channel, &content, persona.as_ref(), options)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        render::render_result(&result);
        if let Some(recorder) = &runtime.recorder {
            render::render_sends(&recorder.sent());
        }
    }
    Ok(())
}
