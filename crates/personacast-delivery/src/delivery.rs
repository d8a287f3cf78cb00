//! Delivery orchestration.
//!
//! [`DeliveryEngine::deliver`] turns one persona reply into one or more
//! platform messages:
//!
//! 1. claim the (persona, channel) pending slot, or reject as in flight
//! 2. look up the channel's endpoint and resolve the persona's avatar
//! 3. split the content into chunks
//! 4. send each chunk in order, skipping duplicates and flagged chunks,
//!    pausing between sends
//!
//! Embeds and attachments ride on the last chunk only. The pending slot is
//! released on every exit path.

use crate::attachment::Attachment;
use crate::avatar::{AvatarManager, AvatarSettings};
use crate::avatar_index::{AvatarIndex, MemoryAvatarIndex};
use crate::chunker::{MessageChunk, MessageChunker, DEFAULT_MAX_CHARS};
use crate::dedup::{DeduplicationGuard, DEFAULT_DEDUP_WINDOW, DEFAULT_SIGNATURE_PREFIX_CHARS};
use crate::traits::{EndpointHandle, OutboundPayload, PersonaDirectory, PlatformClient};
use crate::tracking::ErrorTracker;
use crate::webhook::{WebhookRegistry, DEFAULT_WEBHOOK_NAME};
use crate::Result;
use personacast_core::id;
use personacast_core::types::{ChannelRef, Embed, Persona};
use personacast_core::Config;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Default pause between chunk sends.
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(750);

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    /// Maximum characters per message.
    pub max_message_length: usize,

    /// Pause between consecutive sends of one delivery.
    pub chunk_delay: Duration,

    /// Duplicate suppression window.
    pub dedup_window: Duration,

    /// Leading characters hashed into a duplicate signature.
    pub signature_prefix_chars: usize,

    /// Display name used when no persona is given.
    pub fallback_display_name: String,

    /// Chunks containing this marker are never sent.
    pub must_not_display_sentinel: String,

    /// Content starting with this marker is treated as an error message.
    pub error_marker: String,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            max_message_length: DEFAULT_MAX_CHARS,
            chunk_delay: DEFAULT_CHUNK_DELAY,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            signature_prefix_chars: DEFAULT_SIGNATURE_PREFIX_CHARS,
            fallback_display_name: "Assistant".to_string(),
            must_not_display_sentinel: "[[MUST_NOT_DISPLAY]]".to_string(),
            error_marker: "⚠️".to_string(),
        }
    }
}

impl DeliverySettings {
    /// Build settings from the `delivery` config section.
    pub fn from_config(config: &personacast_core::config::DeliveryConfig) -> Self {
        Self {
            max_message_length: config.max_message_length,
            chunk_delay: Duration::from_millis(config.chunk_delay_ms),
            dedup_window: Duration::from_millis(config.dedup_window_ms),
            signature_prefix_chars: config.signature_prefix_chars,
            fallback_display_name: config.fallback_display_name.clone(),
            must_not_display_sentinel: config.must_not_display_sentinel.clone(),
            error_marker: config.error_marker.clone(),
        }
    }
}

/// Optional parts of a delivery.
#[derive(Debug, Clone, Default)]
pub struct DeliverOptions {
    /// Embed attached to the last chunk.
    pub embed: Option<Embed>,

    /// Files attached to the last chunk.
    pub attachments: Vec<Attachment>,

    /// Suffix naming the model that wrote the reply.
    pub model_indicator: Option<String>,

    /// Treat the content as a system error message.
    pub is_error: bool,
}

impl DeliverOptions {
    /// Attach an embed.
    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embed = Some(embed);
        self
    }

    /// Attach a file.
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Append a model indicator.
    pub fn with_model_indicator(mut self, indicator: impl Into<String>) -> Self {
        self.model_indicator = Some(indicator.into());
        self
    }

    /// Mark as an error message.
    pub fn as_error(mut self) -> Self {
        self.is_error = true;
        self
    }
}

/// How a delivery ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryDisposition {
    /// At least one chunk was sent.
    Sent,

    /// Every chunk was suppressed or skipped.
    Duplicate,

    /// Another delivery for the same persona and channel was in flight.
    InFlight,
}

/// Result of a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// ID of the first message sent, or a placeholder if nothing was sent.
    pub first_message_id: String,

    /// IDs of every message sent, in order.
    pub all_message_ids: Vec<String>,

    /// Whether nothing was sent.
    pub is_duplicate: bool,

    /// How the delivery ended.
    pub disposition: DeliveryDisposition,

    /// Chunks not sent because they were duplicates or flagged.
    pub skipped_chunks: usize,
}

impl DeliveryResult {
    fn sent(message_ids: Vec<String>, skipped_chunks: usize) -> Self {
        Self {
            first_message_id: message_ids.first().cloned().unwrap_or_default(),
            all_message_ids: message_ids,
            is_duplicate: false,
            disposition: DeliveryDisposition::Sent,
            skipped_chunks,
        }
    }

    /// A result standing in for a delivery that sent nothing.
    ///
    /// The placeholder ID is derived from the inputs, so repeats of the same
    /// delivery report the same ID.
    fn virtual_result(
        disposition: DeliveryDisposition,
        channel_id: &str,
        persona_key: &str,
        content: &str,
        skipped_chunks: usize,
    ) -> Self {
        let placeholder = format!("dup-{}", id::hash_parts(&[channel_id, persona_key, content]));
        Self {
            first_message_id: placeholder.clone(),
            all_message_ids: vec![placeholder],
            is_duplicate: true,
            disposition,
            skipped_chunks,
        }
    }

    /// Number of messages actually sent.
    pub fn sent_count(&self) -> usize {
        if self.is_duplicate {
            0
        } else {
            self.all_message_ids.len()
        }
    }
}

/// Orchestrator states, used in trace logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryState {
    Gating,
    Chunking,
    Sending(usize),
    Completed,
    Suppressed,
    Failed,
}

/// Delivers persona replies as platform messages.
pub struct DeliveryEngine {
    platform: Arc<dyn PlatformClient>,
    avatars: Arc<AvatarManager>,
    webhooks: WebhookRegistry,
    dedup: DeduplicationGuard,
    chunker: MessageChunker,
    tracker: Arc<ErrorTracker>,
    settings: DeliverySettings,
}

impl DeliveryEngine {
    /// Start building an engine around a platform client.
    pub fn builder(platform: Arc<dyn PlatformClient>) -> DeliveryEngineBuilder {
        DeliveryEngineBuilder::new(platform)
    }

    /// Deliver `content` to `channel` as `persona`.
    ///
    /// A delivery rejected because another one for the same persona and
    /// channel is in flight, and one whose chunks were all suppressed, both
    /// return a duplicate result rather than an error. A failed send aborts
    /// the remaining chunks and returns the error.
    pub async fn deliver(
        &self,
        channel: &ChannelRef,
        content: &str,
        persona: Option<&Persona>,
        options: DeliverOptions,
    ) -> Result<DeliveryResult> {
        trace!(channel = %channel.id, state = ?DeliveryState::Gating);

        let persona_key = persona
            .map(Persona::key)
            .unwrap_or(self.settings.fallback_display_name.as_str());
        let is_error = options.is_error || self.is_error_content(content);

        let Some(token) = self.dedup.try_begin_pending(
            persona_key,
            &channel.id,
            &id::short_hash(content),
            is_error,
        ) else {
            info!(
                persona = persona_key,
                channel = %channel.id,
                state = ?DeliveryState::Suppressed,
                "Delivery rejected: another delivery is in flight"
            );
            return Ok(DeliveryResult::virtual_result(
                DeliveryDisposition::InFlight,
                &channel.id,
                persona_key,
                content,
                0,
            ));
        };

        let result = self
            .run(channel, content, persona, persona_key, options, is_error)
            .await;
        self.dedup.end_pending(token);

        if let Err(e) = &result {
            warn!(
                persona = persona_key,
                channel = %channel.id,
                state = ?DeliveryState::Failed,
                category = %e.category(),
                "Delivery failed: {}",
                e
            );
        }
        result
    }

    async fn run(
        &self,
        channel: &ChannelRef,
        content: &str,
        persona: Option<&Persona>,
        persona_key: &str,
        options: DeliverOptions,
        is_error: bool,
    ) -> Result<DeliveryResult> {
        let username = persona
            .map(|p| p.display_name.trim())
            .filter(|name| !name.is_empty())
            .unwrap_or(self.settings.fallback_display_name.as_str())
            .to_string();

        let endpoint = self.webhooks.get_or_create(channel).await?;
        let avatar_url = match persona {
            Some(p) => self.avatars.resolve_avatar(p.key(), p.avatar_source()).await,
            None => self.avatars.fallback_url().to_string(),
        };

        trace!(channel = %channel.id, state = ?DeliveryState::Chunking);
        let chunks = self
            .chunker
            .chunks(content, options.model_indicator.as_deref());
        let total = chunks.len();

        let DeliverOptions {
            embed, attachments, ..
        } = options;
        let mut structure = Some((embed, attachments));

        let mut message_ids = Vec::with_capacity(total);
        let mut skipped = 0;
        // Signatures recorded by this reply; a repeat inside it is not a duplicate.
        let mut recorded = HashSet::new();

        for chunk in chunks {
            trace!(channel = %channel.id, state = ?DeliveryState::Sending(chunk.index));

            if self.is_flagged(&chunk) {
                debug!(persona = persona_key, chunk = chunk.index, "Skipping flagged chunk");
                skipped += 1;
                continue;
            }

            let signature = self.dedup.signature(&channel.id, persona_key, &chunk.text);
            let repeat = recorded.contains(&signature);
            if !repeat && self.dedup.should_suppress(&signature) {
                debug!(persona = persona_key, chunk = chunk.index, "Skipping duplicate chunk");
                skipped += 1;
                continue;
            }

            if !message_ids.is_empty() && !self.settings.chunk_delay.is_zero() {
                tokio::time::sleep(self.settings.chunk_delay).await;
            }

            let (embeds, files): (Vec<Embed>, Vec<Attachment>) = if chunk.is_last {
                structure
                    .take()
                    .map(|(embed, files)| (embed.into_iter().collect(), files))
                    .unwrap_or_default()
            } else {
                (Vec::new(), Vec::new())
            };

            let payload = OutboundPayload {
                content: chunk.text,
                username: username.clone(),
                avatar_url: avatar_url.clone(),
                thread_id: channel.thread_id().map(str::to_string),
                embeds,
                attachments: files,
                is_error,
            };

            match self.send_chunk(channel, &endpoint, &payload).await {
                Ok(message_id) => {
                    message_ids.push(message_id);
                    recorded.insert(signature);
                }
                Err(e) => {
                    // An unsent chunk must not block its own retry.
                    if !repeat {
                        self.dedup.forget(&signature);
                    }
                    return Err(e);
                }
            }
        }

        if message_ids.is_empty() {
            info!(
                persona = persona_key,
                channel = %channel.id,
                skipped,
                "Nothing sent, all chunks suppressed"
            );
            return Ok(DeliveryResult::virtual_result(
                DeliveryDisposition::Duplicate,
                &channel.id,
                persona_key,
                content,
                skipped,
            ));
        }

        info!(
            persona = persona_key,
            channel = %channel.id,
            sent = message_ids.len(),
            skipped,
            state = ?DeliveryState::Completed,
            "Delivered"
        );
        Ok(DeliveryResult::sent(message_ids, skipped))
    }

    async fn send_chunk(
        &self,
        channel: &ChannelRef,
        endpoint: &EndpointHandle,
        payload: &OutboundPayload,
    ) -> Result<String> {
        match self.platform.send(endpoint, payload).await {
            Ok(message) => Ok(message.id),
            Err(e) => {
                if e.is_endpoint_not_found() {
                    self.webhooks.invalidate(channel);
                }
                Err(e)
            }
        }
    }

    fn is_flagged(&self, chunk: &MessageChunk) -> bool {
        let sentinel = &self.settings.must_not_display_sentinel;
        !sentinel.is_empty() && chunk.text.contains(sentinel.as_str())
    }

    fn is_error_content(&self, content: &str) -> bool {
        let marker = &self.settings.error_marker;
        !marker.is_empty() && content.trim_start().starts_with(marker.as_str())
    }

    /// The avatar manager.
    pub fn avatars(&self) -> &Arc<AvatarManager> {
        &self.avatars
    }

    /// The endpoint registry.
    pub fn webhooks(&self) -> &WebhookRegistry {
        &self.webhooks
    }

    /// The duplicate guard.
    pub fn dedup(&self) -> &DeduplicationGuard {
        &self.dedup
    }

    /// The error tracker.
    pub fn tracker(&self) -> &Arc<ErrorTracker> {
        &self.tracker
    }

    /// The chunker.
    pub fn chunker(&self) -> &MessageChunker {
        &self.chunker
    }

    /// Orchestrator settings.
    pub fn settings(&self) -> &DeliverySettings {
        &self.settings
    }

    /// Clear every cache the engine owns.
    pub async fn reset(&self) -> Result<()> {
        self.dedup.reset();
        self.webhooks.reset();
        self.tracker.reset();
        self.avatars.reset().await
    }
}

/// Builder for [`DeliveryEngine`].
pub struct DeliveryEngineBuilder {
    platform: Arc<dyn PlatformClient>,
    settings: DeliverySettings,
    avatar_settings: Option<AvatarSettings>,
    avatar_index: Option<Arc<dyn AvatarIndex>>,
    directory: Option<Arc<dyn PersonaDirectory>>,
    tracker: Option<Arc<ErrorTracker>>,
    webhook_name: String,
}

impl DeliveryEngineBuilder {
    fn new(platform: Arc<dyn PlatformClient>) -> Self {
        Self {
            platform,
            settings: DeliverySettings::default(),
            avatar_settings: None,
            avatar_index: None,
            directory: None,
            tracker: None,
            webhook_name: DEFAULT_WEBHOOK_NAME.to_string(),
        }
    }

    /// Apply every relevant config section.
    pub fn config(mut self, config: &Config) -> Result<Self> {
        self.settings = DeliverySettings::from_config(&config.delivery);
        self.avatar_settings = Some(AvatarSettings::from_config(config)?);
        self.tracker = Some(Arc::new(ErrorTracker::from_config(&config.tracking)));
        self.webhook_name = config.platform.webhook_name.clone();
        Ok(self)
    }

    /// Set orchestrator settings.
    pub fn settings(mut self, settings: DeliverySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set avatar settings.
    pub fn avatar_settings(mut self, settings: AvatarSettings) -> Self {
        self.avatar_settings = Some(settings);
        self
    }

    /// Set the avatar index store. Defaults to an in-memory index.
    pub fn avatar_index(mut self, index: Arc<dyn AvatarIndex>) -> Self {
        self.avatar_index = Some(index);
        self
    }

    /// Write resolved avatars back to a persona directory.
    pub fn directory(mut self, directory: Arc<dyn PersonaDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Share an error tracker.
    pub fn tracker(mut self, tracker: Arc<ErrorTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Name of the endpoints the engine owns.
    pub fn webhook_name(mut self, name: impl Into<String>) -> Self {
        self.webhook_name = name.into();
        self
    }

    /// Build the engine.
    pub fn build(self) -> Result<DeliveryEngine> {
        let tracker = self.tracker.unwrap_or_default();
        // Avatar fetch failures fall back silently and stay out of the tracker.
        let fetcher = self.platform.clone();
        let platform: Arc<dyn PlatformClient> = Arc::new(tracker.wrap(self.platform));

        let avatar_settings = match self.avatar_settings {
            Some(settings) => settings,
            None => AvatarSettings::from_config(&Config::default())?,
        };
        let avatar_index = self
            .avatar_index
            .unwrap_or_else(|| Arc::new(MemoryAvatarIndex::new()));

        let mut avatars = AvatarManager::new(fetcher, avatar_index, avatar_settings);
        if let Some(directory) = self.directory {
            avatars = avatars.with_directory(directory);
        }

        Ok(DeliveryEngine {
            webhooks: WebhookRegistry::new(platform.clone(), self.webhook_name),
            dedup: DeduplicationGuard::new(
                self.settings.dedup_window,
                self.settings.signature_prefix_chars,
            ),
            chunker: MessageChunker::new(self.settings.max_message_length),
            avatars: Arc::new(avatars),
            platform,
            tracker,
            settings: self.settings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::memory::MemoryPlatform;
    use std::path::Path;

    const ARIA_URL: &str = "https://cdn.test/aria.png";

    fn aria() -> Persona {
        Persona::new("Aria").with_avatar_url(ARIA_URL)
    }

    fn engine(dir: &Path, platform: Arc<MemoryPlatform>, settings: DeliverySettings) -> DeliveryEngine {
        DeliveryEngine::builder(platform)
            .settings(settings)
            .avatar_settings(AvatarSettings::new(
                dir,
                "http://127.0.0.1:18790",
                "https://cdn.test/fallback.png",
            ))
            .build()
            .unwrap()
    }

    fn setup(settings: DeliverySettings) -> (tempfile::TempDir, Arc<MemoryPlatform>, DeliveryEngine) {
        let dir = tempfile::tempdir().unwrap();
        let platform = Arc::new(MemoryPlatform::new());
        platform.add_resource(ARIA_URL, vec![7u8; 64], Some("image/png"));
        let engine = engine(dir.path(), platform.clone(), settings);
        (dir, platform, engine)
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_chunk_delivery() {
        let (_dir, platform, engine) = setup(DeliverySettings::default());

        let result = engine
            .deliver(&ChannelRef::text("X"), "Hello there.", Some(&aria()), DeliverOptions::default())
            .await
            .unwrap();

        assert!(!result.is_duplicate);
        assert_eq!(result.disposition, DeliveryDisposition::Sent);
        assert_eq!(result.all_message_ids.len(), 1);
        assert_eq!(result.first_message_id, result.all_message_ids[0]);

        let sent = platform.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload.username, "Aria");
        assert!(sent[0].payload.avatar_url.contains("/avatars/aria-"));
        assert!(engine.dedup().pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_repeat_is_duplicate() {
        let (_dir, platform, engine) = setup(DeliverySettings::default());
        let channel = ChannelRef::text("X");

        let first = engine
            .deliver(&channel, "Hello there.", Some(&aria()), DeliverOptions::default())
            .await
            .unwrap();
        let second = engine
            .deliver(&channel, "Hello there.", Some(&aria()), DeliverOptions::default())
            .await
            .unwrap();

        assert!(!first.is_duplicate);
        assert!(second.is_duplicate);
        assert_eq!(second.disposition, DeliveryDisposition::Duplicate);
        assert!(second.first_message_id.starts_with("dup-"));
        assert_eq!(second.sent_count(), 0);
        assert_eq!(platform.send_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_embed_only_on_last_chunk() {
        let settings = DeliverySettings {
            max_message_length: 40,
            ..Default::default()
        };
        let (_dir, platform, engine) = setup(settings);
        let content = format!("{}\n\n{}\n\n{}", "a".repeat(30), "b".repeat(30), "c".repeat(30));

        let result = engine
            .deliver(
                &ChannelRef::text("X"),
                &content,
                Some(&aria()),
                DeliverOptions::default()
                    .with_embed(Embed::titled("Sources"))
                    .with_attachment(Attachment::from_bytes(vec![1u8], "a.txt", "text/plain")),
            )
            .await
            .unwrap();

        assert_eq!(result.all_message_ids.len(), 3);
        let sent = platform.sent();
        let embed_counts: Vec<_> = sent.iter().map(|s| s.payload.embeds.len()).collect();
        let file_counts: Vec<_> = sent.iter().map(|s| s.payload.attachments.len()).collect();
        assert_eq!(embed_counts, [0, 0, 1]);
        assert_eq!(file_counts, [0, 0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_between_sends() {
        let settings = DeliverySettings {
            max_message_length: 40,
            ..Default::default()
        };
        let (_dir, _platform, engine) = setup(settings);
        let content = format!("{}\n\n{}\n\n{}", "a".repeat(30), "b".repeat(30), "c".repeat(30));

        let start = tokio::time::Instant::now();
        engine
            .deliver(&ChannelRef::text("X"), &content, Some(&aria()), DeliverOptions::default())
            .await
            .unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= DEFAULT_CHUNK_DELAY * 2);
        assert!(elapsed < DEFAULT_CHUNK_DELAY * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flagged_chunks_are_skipped() {
        let settings = DeliverySettings {
            max_message_length: 40,
            ..Default::default()
        };
        let (_dir, platform, engine) = setup(settings);
        let content = format!("{}\n\n[[MUST_NOT_DISPLAY]] hidden", "a".repeat(30));

        let result = engine
            .deliver(&ChannelRef::text("X"), &content, Some(&aria()), DeliverOptions::default())
            .await
            .unwrap();

        assert_eq!(result.all_message_ids.len(), 1);
        assert_eq!(result.skipped_chunks, 1);
        assert!(!platform.sent()[0].payload.content.contains("hidden"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_releases_pending_and_aborts() {
        let settings = DeliverySettings {
            max_message_length: 40,
            ..Default::default()
        };
        let (_dir, platform, engine) = setup(settings);
        platform.fail_next_send(DeliveryError::PayloadRejected("bad".into()));
        let content = format!("{}\n\n{}", "a".repeat(30), "b".repeat(30));

        let err = engine
            .deliver(&ChannelRef::text("X"), &content, Some(&aria()), DeliverOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::PayloadRejected(_)));
        assert_eq!(platform.send_count(), 0);
        assert!(engine.dedup().pending().is_empty());
        assert_eq!(engine.tracker().stats().distinct_errors, 1);

        let retry = engine
            .deliver(&ChannelRef::text("X"), &content, Some(&aria()), DeliverOptions::default())
            .await
            .unwrap();
        assert_eq!(retry.all_message_ids.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoint_not_found_evicts_handle() {
        let (_dir, platform, engine) = setup(DeliverySettings::default());
        let channel = ChannelRef::text("X");

        engine
            .deliver(&channel, "first", Some(&aria()), DeliverOptions::default())
            .await
            .unwrap();
        let endpoint = engine.webhooks().cached(&channel).unwrap();
        platform.delete_endpoint(&endpoint.id);

        let err = engine
            .deliver(&channel, "second", Some(&aria()), DeliverOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_endpoint_not_found());
        assert!(engine.webhooks().cached(&channel).is_none());

        engine
            .deliver(&channel, "third", Some(&aria()), DeliverOptions::default())
            .await
            .unwrap();
        assert_eq!(platform.create_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_paragraph_within_reply_is_sent() {
        let settings = DeliverySettings {
            max_message_length: 20,
            ..Default::default()
        };
        let (_dir, platform, engine) = setup(settings);
        let channel = ChannelRef::text("X");
        let content = "Ha ha ha ha ha ha.\n\nHa ha ha ha ha ha.\n\nThe end of it.";

        let result = engine
            .deliver(&channel, content, Some(&aria()), DeliverOptions::default())
            .await
            .unwrap();

        assert_eq!(result.all_message_ids.len(), 3);
        assert_eq!(result.skipped_chunks, 0);
        let contents: Vec<_> = platform.sent().into_iter().map(|s| s.payload.content).collect();
        assert_eq!(
            contents,
            ["Ha ha ha ha ha ha.", "Ha ha ha ha ha ha.", "The end of it."]
        );

        // Redelivering the whole reply is still a duplicate.
        let again = engine
            .deliver(&channel, content, Some(&aria()), DeliverOptions::default())
            .await
            .unwrap();
        assert!(again.is_duplicate);
        assert_eq!(platform.send_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_avatar_fetch_failures_are_not_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let platform = Arc::new(MemoryPlatform::new());
        let engine = engine(dir.path(), platform.clone(), DeliverySettings::default());

        for i in 0..7 {
            engine
                .deliver(
                    &ChannelRef::text("X"),
                    &format!("reply {}", i),
                    Some(&aria()),
                    DeliverOptions::default(),
                )
                .await
                .unwrap();
        }

        assert!(platform
            .sent()
            .iter()
            .all(|s| s.payload.avatar_url == "https://cdn.test/fallback.png"));
        assert_eq!(engine.tracker().stats().distinct_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_persona_uses_fallbacks() {
        let (_dir, platform, engine) = setup(DeliverySettings::default());

        engine
            .deliver(&ChannelRef::text("X"), "hi", None, DeliverOptions::default())
            .await
            .unwrap();

        let payload = &platform.sent()[0].payload;
        assert_eq!(payload.username, "Assistant");
        assert_eq!(payload.avatar_url, "https://cdn.test/fallback.png");
        assert_eq!(platform.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_content_marks_every_chunk() {
        let settings = DeliverySettings {
            max_message_length: 40,
            ..Default::default()
        };
        let (_dir, platform, engine) = setup(settings);
        let content = format!("⚠️ {}\n\n{}", "a".repeat(30), "b".repeat(30));

        engine
            .deliver(&ChannelRef::text("X"), &content, Some(&aria()), DeliverOptions::default())
            .await
            .unwrap();

        let sent = platform.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|s| s.payload.is_error));
    }

    #[tokio::test(start_paused = true)]
    async fn test_thread_delivery_targets_thread() {
        let (_dir, platform, engine) = setup(DeliverySettings::default());

        engine
            .deliver(&ChannelRef::thread("T", "P"), "hi", Some(&aria()), DeliverOptions::default())
            .await
            .unwrap();

        let sent = &platform.sent()[0];
        assert_eq!(sent.endpoint.channel_id, "P");
        assert_eq!(sent.payload.thread_id.as_deref(), Some("T"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_indicator_appended() {
        let (_dir, platform, engine) = setup(DeliverySettings::default());

        engine
            .deliver(
                &ChannelRef::text("X"),
                "Hello there.",
                Some(&aria()),
                DeliverOptions::default().with_model_indicator("-# gpt-x"),
            )
            .await
            .unwrap();

        assert_eq!(platform.sent()[0].payload.content, "Hello there.\n-# gpt-x");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_caches() {
        let (_dir, platform, engine) = setup(DeliverySettings::default());
        let channel = ChannelRef::text("X");

        engine
            .deliver(&channel, "hi", Some(&aria()), DeliverOptions::default())
            .await
            .unwrap();
        engine.reset().await.unwrap();

        let again = engine
            .deliver(&channel, "hi", Some(&aria()), DeliverOptions::default())
            .await
            .unwrap();
        assert!(!again.is_duplicate);
        assert_eq!(platform.send_count(), 2);
        assert!(engine.webhooks().cached(&channel).is_some());
    }
}
