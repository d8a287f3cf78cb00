//! CLI command implementations.

pub mod serve;
pub mod deliver;
pub mod split;
pub mod avatars;
pub mod config;

use std::io::IsTerminal;

/// Take message text from an argument, or read it from stdin.
pub(crate) async fn content_or_stdin(content: Option<String>) -> anyhow::Result<String> {
    if let Some(content) = content {
        return Ok(content);
    }
    if std::io::stdin().is_terminal() {
        anyhow::bail!("No message given. Pass it as an argument or pipe it on stdin.");
    }

    use tokio::io::AsyncReadExt;
    let mut content = String::new();
    tokio::io::stdin().read_to_string(&mut content).await?;
    Ok(content)
}
