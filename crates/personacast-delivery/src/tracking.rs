//! Error tracking and frequency escalation.
//!
//! Every failure handed to [`ErrorTracker::track`] gets a correlation ID and
//! is logged. Repeats of the same failure (same category, operation and
//! message) are counted in a rolling window; the occurrence that reaches the
//! escalation threshold is logged a second time at error level.
//!
//! [`TrackedPlatformClient`] applies the tracker to every [`PlatformClient`]
//! call. Tracking never changes the outcome of a call.

use crate::error::{DeliveryError, ErrorCategory};
use crate::traits::{
    EndpointHandle, FetchOptions, FetchedResource, OutboundPayload, PlatformClient, SentMessage,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use personacast_core::id;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, warn};

/// Default rolling window for occurrence counting.
pub const DEFAULT_TRACKING_WINDOW: Duration = Duration::from_secs(30 * 60);

/// Default occurrence count that triggers escalation.
pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 6;

/// Default longest string kept in metadata.
pub const DEFAULT_MAX_METADATA_CHARS: usize = 200;

/// Context attached to a tracked error.
#[derive(Debug, Clone)]
pub struct TrackContext {
    /// Error category.
    pub category: ErrorCategory,

    /// Operation that failed (e.g. `send`).
    pub operation: String,

    /// Call arguments or other details.
    pub metadata: Value,

    /// Log at error level instead of warn.
    pub is_critical: bool,
}

impl TrackContext {
    /// Context for `operation` in `category`, without metadata.
    pub fn new(category: ErrorCategory, operation: impl Into<String>) -> Self {
        Self {
            category,
            operation: operation.into(),
            metadata: Value::Null,
            is_critical: false,
        }
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Mark as critical.
    pub fn critical(mut self) -> Self {
        self.is_critical = true;
        self
    }
}

/// Outcome of tracking one occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedError {
    /// Correlation ID for this occurrence.
    pub id: String,

    /// Occurrences of the same failure in the current window, including this one.
    pub count: u32,

    /// Whether this occurrence reached the escalation threshold.
    pub escalated: bool,
}

/// Rolling record of one distinct failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    /// ID of the first occurrence in the window.
    pub error_id: String,

    /// Error category.
    pub category: String,

    /// Operation that failed.
    pub operation: String,

    /// Error message.
    pub message: String,

    /// Occurrences in the window.
    pub occurrence_count: u32,

    /// First occurrence.
    pub first_seen_at: DateTime<Utc>,

    /// Latest occurrence.
    pub last_seen_at: DateTime<Utc>,

    #[serde(skip)]
    last_seen: Instant,
}

/// Tracker summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    /// Distinct failures in the window.
    pub distinct_errors: usize,

    /// Sum of occurrences in the window.
    pub total_occurrences: u64,

    /// Distinct failures at or above the escalation threshold.
    pub escalated_errors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RecordKey {
    category: ErrorCategory,
    operation: String,
    fingerprint: String,
}

/// Classifies, counts and logs failures.
#[derive(Debug)]
pub struct ErrorTracker {
    window: Duration,
    threshold: u32,
    max_metadata_chars: usize,
    records: Mutex<HashMap<RecordKey, ErrorRecord>>,
}

impl Default for ErrorTracker {
    fn default() -> Self {
        Self::new(
            DEFAULT_TRACKING_WINDOW,
            DEFAULT_ESCALATION_THRESHOLD,
            DEFAULT_MAX_METADATA_CHARS,
        )
    }
}

impl ErrorTracker {
    /// Create a tracker.
    pub fn new(window: Duration, threshold: u32, max_metadata_chars: usize) -> Self {
        Self {
            window,
            threshold: threshold.max(1),
            max_metadata_chars,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Create a tracker from the `tracking` config section.
    pub fn from_config(config: &personacast_core::config::TrackingConfig) -> Self {
        Self::new(
            Duration::from_secs(config.window_secs),
            config.escalation_threshold,
            config.max_metadata_chars,
        )
    }

    /// Wrap a platform client so its failures are recorded here.
    pub fn wrap<C: PlatformClient>(self: &Arc<Self>, client: C) -> TrackedPlatformClient<C> {
        TrackedPlatformClient::new(client, Arc::clone(self))
    }

    /// Record one occurrence of `message`.
    pub fn track(&self, message: &str, context: TrackContext) -> TrackedError {
        let id = error_id(context.category, &context.operation);
        let metadata = truncate_metadata(context.metadata, self.max_metadata_chars);
        let now = Instant::now();
        let wall = Utc::now();

        let key = RecordKey {
            category: context.category,
            operation: context.operation.clone(),
            fingerprint: id::short_hash(message),
        };

        let count = {
            let mut records = self.records.lock();
            self.evict_expired(&mut records, now);

            let record = records.entry(key).or_insert_with(|| ErrorRecord {
                error_id: id.clone(),
                category: context.category.as_str().to_string(),
                operation: context.operation.clone(),
                message: message.to_string(),
                occurrence_count: 0,
                first_seen_at: wall,
                last_seen_at: wall,
                last_seen: now,
            });
            record.occurrence_count += 1;
            record.last_seen_at = wall;
            record.last_seen = now;
            record.occurrence_count
        };

        if context.is_critical {
            error!(
                error_id = %id,
                category = %context.category,
                operation = %context.operation,
                count,
                metadata = %metadata,
                "{}",
                message
            );
        } else {
            warn!(
                error_id = %id,
                category = %context.category,
                operation = %context.operation,
                count,
                metadata = %metadata,
                "{}",
                message
            );
        }

        let escalated = count == self.threshold;
        if escalated {
            error!(
                error_id = %id,
                category = %context.category,
                operation = %context.operation,
                count,
                window_secs = self.window.as_secs(),
                "Error escalated: {} occurrences in window: {}",
                count,
                message
            );
        }

        TrackedError { id, count, escalated }
    }

    /// Record a [`DeliveryError`] under its own category.
    pub fn track_error(
        &self,
        err: &DeliveryError,
        operation: &str,
        metadata: Value,
    ) -> TrackedError {
        let context = TrackContext::new(err.category(), operation).with_metadata(metadata);
        self.track(&err.to_string(), context)
    }

    /// Await `call`, tracking its error if it fails. The result is returned unchanged.
    pub async fn call<T, F>(&self, operation: &str, metadata: Value, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let result = call.await;
        if let Err(e) = &result {
            self.track_error(e, operation, metadata);
        }
        result
    }

    /// Current records, oldest first.
    pub fn records(&self) -> Vec<ErrorRecord> {
        let mut records = self.records.lock();
        self.evict_expired(&mut records, Instant::now());
        let mut list: Vec<_> = records.values().cloned().collect();
        list.sort_by_key(|r| r.first_seen_at);
        list
    }

    /// Summary of the current window.
    pub fn stats(&self) -> TrackerStats {
        let mut records = self.records.lock();
        self.evict_expired(&mut records, Instant::now());
        TrackerStats {
            distinct_errors: records.len(),
            total_occurrences: records.values().map(|r| r.occurrence_count as u64).sum(),
            escalated_errors: records
                .values()
                .filter(|r| r.occurrence_count >= self.threshold)
                .count(),
        }
    }

    /// Forget every record.
    pub fn reset(&self) {
        self.records.lock().clear();
    }

    fn evict_expired(&self, records: &mut HashMap<RecordKey, ErrorRecord>, now: Instant) {
        records.retain(|_, r| now.duration_since(r.last_seen) < self.window);
    }
}

/// `PLT-SEN-1a2b3c4d` style correlation ID.
fn error_id(category: ErrorCategory, operation: &str) -> String {
    let op: String = operation
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .collect::<String>()
        .to_ascii_uppercase();
    let op = if op.is_empty() { "GEN".to_string() } else { op };
    format!("{}-{}-{}", category.prefix(), op, id::short_id())
}

/// Shorten long strings anywhere in `value`, noting the original length.
fn truncate_metadata(value: Value, max_chars: usize) -> Value {
    match value {
        Value::String(s) => {
            let len = s.chars().count();
            if len > max_chars {
                Value::String(format!(
                    "{}...({} chars)",
                    id::truncate_chars(&s, max_chars),
                    len
                ))
            } else {
                Value::String(s)
            }
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| truncate_metadata(v, max_chars))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, truncate_metadata(v, max_chars)))
                .collect(),
        ),
        other => other,
    }
}

/// A [`PlatformClient`] whose failures are tracked.
///
/// Arguments are recorded as metadata. Errors are returned unchanged.
pub struct TrackedPlatformClient<C> {
    inner: C,
    tracker: Arc<ErrorTracker>,
}

impl<C: PlatformClient> TrackedPlatformClient<C> {
    /// Wrap `inner`.
    pub fn new(inner: C, tracker: Arc<ErrorTracker>) -> Self {
        Self { inner, tracker }
    }

    /// The wrapped client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// The tracker failures are recorded in.
    pub fn tracker(&self) -> &Arc<ErrorTracker> {
        &self.tracker
    }
}

#[async_trait]
impl<C: PlatformClient> PlatformClient for TrackedPlatformClient<C> {
    async fn list_endpoints(&self, channel_id: &str) -> Result<Vec<EndpointHandle>> {
        self.tracker
            .call(
                "list_endpoints",
                json!({ "channel_id": channel_id }),
                self.inner.list_endpoints(channel_id),
            )
            .await
    }

    async fn create_endpoint(&self, channel_id: &str, name: &str) -> Result<EndpointHandle> {
        self.tracker
            .call(
                "create_endpoint",
                json!({ "channel_id": channel_id, "name": name }),
                self.inner.create_endpoint(channel_id, name),
            )
            .await
    }

    async fn send(
        &self,
        endpoint: &EndpointHandle,
        payload: &OutboundPayload,
    ) -> Result<SentMessage> {
        let metadata = json!({
            "endpoint_id": endpoint.id,
            "channel_id": endpoint.channel_id,
            "thread_id": payload.thread_id,
            "username": payload.username,
            "content": payload.content,
            "embeds": payload.embeds.len(),
            "attachments": payload.attachments.len(),
            "is_error": payload.is_error,
        });
        self.tracker
            .call("send", metadata, self.inner.send(endpoint, payload))
            .await
    }

    async fn fetch_resource(&self, url: &str, options: FetchOptions) -> Result<FetchedResource> {
        let metadata = json!({
            "url": url,
            "timeout_ms": options.timeout.as_millis() as u64,
            "max_bytes": options.max_bytes,
        });
        self.tracker
            .call(
                "fetch_resource",
                metadata,
                self.inner.fetch_resource(url, options),
            )
            .await
    }
}
