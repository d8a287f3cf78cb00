//! Split command.

use crate::render;
use crate::runtime;
use clap::Args;
use personacast_delivery::{MessageChunk, MessageChunker};
use std::path::Path;

/// Split command arguments.
#[derive(Args)]
pub struct SplitArgs {
    /// Message text (read from stdin when omitted)
    pub content: Option<String>,

    /// Maximum characters per chunk (defaults to delivery.max_message_length)
    #[arg(long)]
    pub max_chars: Option<usize>,

    /// Model indicator appended to the message
    #[arg(long)]
    pub model_indicator: Option<String>,

    /// Print the chunks as JSON
    #[arg(long)]
    pub json: bool,
}

/// Split `content` the way a delivery would.
pub fn split(content: &str, max_chars: usize, model_indicator: Option<&str>) -> Vec<MessageChunk> {
    MessageChunker::new(max_chars).chunks(content, model_indicator)
}

/// Run the split command.
pub async fn run(args: SplitArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = runtime::load_config(config_path)?;
    let max_chars = args
        .max_chars
        .unwrap_or(config.delivery.max_message_length);
    let content = super::content_or_stdin(args.content).await?;

    let chunks = split(&content, max_chars, args.model_indicator.as_deref());
    if args.json {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        println!("{}", serde_json::to_string_pretty(&texts)?);
    } else {
        render::render_chunks(&chunks);
    }
    Ok(())
}
