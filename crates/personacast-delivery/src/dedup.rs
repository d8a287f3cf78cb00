//! Duplicate suppression and in-flight delivery tracking.
//!
//! Two independent mechanisms live here:
//!
//! - [`SignatureCache`] remembers content signatures (channel, actor, content
//!   prefix) for a short window and reports repeats.
//! - [`PendingSends`] allows at most one in-flight delivery per
//!   (persona, channel) pair. A second attempt is rejected, not queued.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use personacast_core::id;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default suppression window.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(5000);

/// Default number of content characters that feed a signature.
pub const DEFAULT_SIGNATURE_PREFIX_CHARS: usize = 200;

/// Fingerprint of one piece of outbound content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliverySignature(String);

impl DeliverySignature {
    /// Fingerprint `content` sent by `actor_key` into `channel_id`.
    ///
    /// Only the first `prefix_chars` characters are hashed, together with the
    /// total character count.
    pub fn new(channel_id: &str, actor_key: &str, content: &str, prefix_chars: usize) -> Self {
        let prefix = id::truncate_chars(content, prefix_chars);
        let length = content.chars().count().to_string();
        Self(id::hash_parts(&[channel_id, actor_key, prefix, &length]))
    }

    /// The signature as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Time-windowed set of recently accepted signatures.
#[derive(Debug)]
pub struct SignatureCache {
    window: Duration,
    seen: Mutex<HashMap<DeliverySignature, Instant>>,
}

impl SignatureCache {
    /// Create a cache with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if `signature` was accepted within the window.
    ///
    /// Otherwise records it as accepted now and returns `false`. A repeat does
    /// not extend the window of the original acceptance.
    pub fn should_suppress(&self, signature: &DeliverySignature) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock();

        seen.retain(|_, accepted_at| now.duration_since(*accepted_at) < self.window);

        if seen.contains_key(signature) {
            debug!(signature = signature.as_str(), "Suppressing duplicate content");
            return true;
        }

        seen.insert(signature.clone(), now);
        false
    }

    /// Drop a signature so the same content is accepted again.
    pub fn forget(&self, signature: &DeliverySignature) {
        self.seen.lock().remove(signature);
    }

    /// Number of live signatures.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Whether no signatures are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every signature.
    pub fn reset(&self) {
        self.seen.lock().clear();
    }
}

/// Key of an in-flight delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PendingKey {
    persona_key: String,
    channel_id: String,
}

/// An in-flight delivery.
#[derive(Debug, Clone)]
pub struct PendingSend {
    /// Persona delivering.
    pub persona_key: String,

    /// Target channel.
    pub channel_id: String,

    /// Hash of the full content being delivered.
    pub content_hash: String,

    /// When the delivery started.
    pub started_at: DateTime<Utc>,

    /// Whether the content is a system error message.
    pub is_error_message: bool,

    nonce: u64,
}

type PendingSlots = Arc<DashMap<PendingKey, PendingSend>>;

/// At-most-one in-flight delivery per (persona, channel).
#[derive(Debug, Default)]
pub struct PendingSends {
    slots: PendingSlots,
    next_nonce: AtomicU64,
}

impl PendingSends {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for (persona, channel).
    ///
    /// Returns `None` if a delivery for the pair is already in flight. The
    /// existence check and the insertion are one atomic step.
    pub fn try_begin(
        &self,
        persona_key: &str,
        channel_id: &str,
        content_hash: &str,
        is_error_message: bool,
    ) -> Option<PendingToken> {
        let key = PendingKey {
            persona_key: persona_key.to_string(),
            channel_id: channel_id.to_string(),
        };
        let nonce = self.next_nonce.fetch_add(1, Ordering::Relaxed);

        match self.slots.entry(key.clone()) {
            Entry::Occupied(existing) => {
                debug!(
                    persona = persona_key,
                    channel = channel_id,
                    since = %existing.get().started_at,
                    "Delivery already in flight"
                );
                None
            }
            Entry::Vacant(slot) => {
                slot.insert(PendingSend {
                    persona_key: key.persona_key.clone(),
                    channel_id: key.channel_id.clone(),
                    content_hash: content_hash.to_string(),
                    started_at: Utc::now(),
                    is_error_message,
                    nonce,
                });
                trace!(persona = persona_key, channel = channel_id, "Pending slot claimed");
                Some(PendingToken {
                    slots: Arc::clone(&self.slots),
                    key,
                    nonce,
                })
            }
        }
    }

    /// Release a slot. Dropping the token has the same effect.
    pub fn end(&self, token: PendingToken) {
        drop(token);
    }

    /// Look up the in-flight delivery for a pair.
    pub fn get(&self, persona_key: &str, channel_id: &str) -> Option<PendingSend> {
        let key = PendingKey {
            persona_key: persona_key.to_string(),
            channel_id: channel_id.to_string(),
        };
        self.slots.get(&key).map(|entry| entry.value().clone())
    }

    /// Number of deliveries in flight.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every slot. Outstanding tokens become no-ops.
    pub fn reset(&self) {
        self.slots.clear();
    }
}

/// Proof of a claimed pending slot. The slot is released when the token drops.
#[derive(Debug)]
pub struct PendingToken {
    slots: PendingSlots,
    key: PendingKey,
    nonce: u64,
}

impl PendingToken {
    /// Persona holding the slot.
    pub fn persona_key(&self) -> &str {
        &self.key.persona_key
    }

    /// Channel of the slot.
    pub fn channel_id(&self) -> &str {
        &self.key.channel_id
    }
}

impl Drop for PendingToken {
    fn drop(&mut self) {
        // A reset followed by a new claim must not be undone by a stale token.
        let nonce = self.nonce;
        self.slots.remove_if(&self.key, |_, pending| pending.nonce == nonce);
    }
}

/// Content-level and persona-level duplicate protection.
#[derive(Debug)]
pub struct DeduplicationGuard {
    signatures: SignatureCache,
    pending: PendingSends,
    prefix_chars: usize,
}

impl Default for DeduplicationGuard {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW, DEFAULT_SIGNATURE_PREFIX_CHARS)
    }
}

impl DeduplicationGuard {
    /// Create a guard.
    pub fn new(window: Duration, prefix_chars: usize) -> Self {
        Self {
            signatures: SignatureCache::new(window),
            pending: PendingSends::new(),
            prefix_chars: prefix_chars.max(1),
        }
    }

    /// Build the signature for content sent by `actor_key` into `channel_id`.
    pub fn signature(&self, channel_id: &str, actor_key: &str, content: &str) -> DeliverySignature {
        DeliverySignature::new(channel_id, actor_key, content, self.prefix_chars)
    }

    /// See [`SignatureCache::should_suppress`].
    pub fn should_suppress(&self, signature: &DeliverySignature) -> bool {
        self.signatures.should_suppress(signature)
    }

    /// See [`SignatureCache::forget`].
    pub fn forget(&self, signature: &DeliverySignature) {
        self.signatures.forget(signature);
    }

    /// See [`PendingSends::try_begin`].
    pub fn try_begin_pending(
        &self,
        persona_key: &str,
        channel_id: &str,
        content_hash: &str,
        is_error_message: bool,
    ) -> Option<PendingToken> {
        self.pending
            .try_begin(persona_key, channel_id, content_hash, is_error_message)
    }

    /// Release a pending slot.
    pub fn end_pending(&self, token: PendingToken) {
        self.pending.end(token);
    }

    /// The signature cache.
    pub fn signatures(&self) -> &SignatureCache {
        &self.signatures
    }

    /// The in-flight tracker.
    pub fn pending(&self) -> &PendingSends {
        &self.pending
    }

    /// Clear both mechanisms.
    pub fn reset(&self) {
        self.signatures.reset();
        self.pending.reset();
    }
}
