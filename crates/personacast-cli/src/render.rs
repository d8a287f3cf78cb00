//! Terminal rendering utilities.
//!
//! Human-readable output for delivery results, recorded sends, chunks,
//! and avatar cache entries.

use console::style;
use personacast_delivery::{AvatarCacheEntry, DeliveryDisposition, DeliveryResult, MessageChunk, RecordedSend};

/// Render the outcome of a delivery.
pub fn render_result(result: &DeliveryResult) {
    let label = match result.disposition {
        DeliveryDisposition::Sent => style("sent").green(),
        DeliveryDisposition::Duplicate => style("duplicate").yellow(),
        DeliveryDisposition::InFlight => style("in flight").yellow(),
    };
    println!("{} {}", style("*").bold(), label.bold());

    if result.is_duplicate {
        println!("  {} {}", style("placeholder").dim(), result.first_message_id);
    } else {
        for id in &result.all_message_ids {
            println!("  {} {}", style("message").dim(), id);
        }
    }
    if result.skipped_chunks > 0 {
        println!(
            "  {} {} chunk(s) skipped",
            style("!").yellow(),
            result.skipped_chunks
        );
    }
}

/// Render messages captured by a dry run.
pub fn render_sends(sends: &[RecordedSend]) {
    for (i, send) in sends.iter().enumerate() {
        let payload = &send.payload;
        println!();
        println!(
            "{} {} as {}",
            style(format!("[{}/{}]", i + 1, sends.len())).cyan(),
            style(&send.message.channel_id).dim(),
            style(&payload.username).bold(),
        );
        println!("  {} {}", style("avatar").dim(), payload.avatar_url);
        if let Some(thread) = &payload.thread_id {
            println!("  {} {}", style("thread").dim(), thread);
        }
        if payload.is_error {
            println!("  {}", style("error message").red());
        }
        for embed in &payload.embeds {
            println!(
                "  {} {}",
                style("embed").dim(),
                embed.title.as_deref().unwrap_or("(untitled)")
            );
        }
        for attachment in &payload.attachments {
            println!(
                "  {} {} ({})",
                style("file").dim(),
                attachment.upload_name(),
                attachment.mime_type
            );
        }
        println!("{}", payload.content);
    }
}

/// Render split chunks.
pub fn render_chunks(chunks: &[MessageChunk]) {
    for chunk in chunks {
        let mut header = format!(
            "--- chunk {}/{} ({} chars)",
            chunk.index + 1,
            chunks.len(),
            chunk.text.chars().count()
        );
        if chunk.is_last {
            header.push_str(" [last]");
        }
        println!("{}", style(header).cyan());
        println!("{}", chunk.text);
    }
}

/// Render avatar cache entries as a table.
pub fn render_avatar_entries(entries: &[AvatarCacheEntry]) {
    if entries.is_empty() {
        println!("No cached avatars.");
        return;
    }

    for entry in entries {
        println!(
            "{}  {}  {}",
            style(&entry.persona_key).bold(),
            entry.local_filename,
            style(entry.downloaded_at.format("%Y-%m-%d %H:%M:%S UTC")).dim(),
        );
        println!("  {} {}", style("source").dim(), entry.original_url);
    }
}
