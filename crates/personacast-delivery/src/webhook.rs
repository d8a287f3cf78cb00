//! Per-channel send endpoint cache.

use crate::traits::{EndpointHandle, PlatformClient};
use crate::Result;
use dashmap::DashMap;
use personacast_core::types::ChannelRef;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Default name given to endpoints this registry creates.
pub const DEFAULT_WEBHOOK_NAME: &str = "personacast";

/// Obtains and caches one send endpoint per channel.
///
/// Threads resolve to their parent channel's endpoint. Cached handles do not
/// expire; they are evicted only through [`invalidate`](Self::invalidate).
pub struct WebhookRegistry {
    platform: Arc<dyn PlatformClient>,
    name: String,
    handles: DashMap<String, EndpointHandle>,
    creating: DashMap<String, Arc<Mutex<()>>>,
}

impl WebhookRegistry {
    /// Create a registry that owns endpoints named `name`.
    pub fn new(platform: Arc<dyn PlatformClient>, name: impl Into<String>) -> Self {
        Self {
            platform,
            name: name.into(),
            handles: DashMap::new(),
            creating: DashMap::new(),
        }
    }

    /// Name of the endpoints this registry uses.
    pub fn webhook_name(&self) -> &str {
        &self.name
    }

    /// Get the endpoint for a channel, reusing or creating one on a miss.
    pub async fn get_or_create(&self, channel: &ChannelRef) -> Result<EndpointHandle> {
        let channel_id = channel.endpoint_channel_id();

        if let Some(handle) = self.handles.get(channel_id) {
            return Ok(handle.clone());
        }

        // One lookup/creation per channel at a time.
        let lock = self
            .creating
            .entry(channel_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(handle) = self.handles.get(channel_id) {
            return Ok(handle.clone());
        }

        let existing = self.platform.list_endpoints(channel_id).await?;
        let handle = match existing.into_iter().find(|e| e.is_usable_as(&self.name)) {
            Some(handle) => {
                debug!(channel = channel_id, endpoint = %handle.id, "Reusing existing endpoint");
                handle
            }
            None => {
                let handle = self.platform.create_endpoint(channel_id, &self.name).await?;
                info!(channel = channel_id, endpoint = %handle.id, "Created endpoint");
                handle
            }
        };

        self.handles.insert(channel_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Evict the cached endpoint for a channel.
    pub fn invalidate(&self, channel: &ChannelRef) -> Option<EndpointHandle> {
        let evicted = self
            .handles
            .remove(channel.endpoint_channel_id())
            .map(|(_, handle)| handle);
        if let Some(handle) = &evicted {
            debug!(channel = channel.endpoint_channel_id(), endpoint = %handle.id, "Endpoint evicted");
        }
        evicted
    }

    /// Cached handle for a channel, without any platform calls.
    pub fn cached(&self, channel: &ChannelRef) -> Option<EndpointHandle> {
        self.handles
            .get(channel.endpoint_channel_id())
            .map(|h| h.clone())
    }

    /// Number of cached endpoints.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no endpoints are cached.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Forget every cached endpoint.
    pub fn reset(&self) {
        self.handles.clear();
        self.creating.clear();
    }
}
