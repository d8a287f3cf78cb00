//! Collaborator traits and the payload types that cross them.

use crate::attachment::Attachment;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use personacast_core::types::{Embed, Persona};
use std::sync::Arc;
use std::time::Duration;

/// Chat platform operations the delivery engine depends on.
///
/// Implementations own the wire format; the engine only sees these calls.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// List the send endpoints that exist on a channel.
    async fn list_endpoints(&self, channel_id: &str) -> Result<Vec<EndpointHandle>>;

    /// Create a send endpoint named `name` on a channel.
    async fn create_endpoint(&self, channel_id: &str, name: &str) -> Result<EndpointHandle>;

    /// Send one message through an endpoint.
    async fn send(&self, endpoint: &EndpointHandle, payload: &OutboundPayload)
        -> Result<SentMessage>;

    /// Download a remote resource within the given bounds.
    async fn fetch_resource(&self, url: &str, options: FetchOptions) -> Result<FetchedResource>;
}

#[async_trait]
impl<T: PlatformClient + ?Sized> PlatformClient for Arc<T> {
    async fn list_endpoints(&self, channel_id: &str) -> Result<Vec<EndpointHandle>> {
        (**self).list_endpoints(channel_id).await
    }

    async fn create_endpoint(&self, channel_id: &str, name: &str) -> Result<EndpointHandle> {
        (**self).create_endpoint(channel_id, name).await
    }

    async fn send(
        &self,
        endpoint: &EndpointHandle,
        payload: &OutboundPayload,
    ) -> Result<SentMessage> {
        (**self).send(endpoint, payload).await
    }

    async fn fetch_resource(&self, url: &str, options: FetchOptions) -> Result<FetchedResource> {
        (**self).fetch_resource(url, options).await
    }
}

/// Read access to the persona directory, with optional avatar write-back.
#[async_trait]
pub trait PersonaDirectory: Send + Sync {
    /// Look up a persona by its full name.
    async fn get_persona(&self, key: &str) -> Option<Persona>;

    /// Record a resolved or fallback avatar URL for a persona.
    async fn set_avatar_url(&self, _key: &str, _avatar_url: &str) -> Result<()> {
        Ok(())
    }
}

/// A channel-scoped message-sending integration point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointHandle {
    /// Endpoint ID.
    pub id: String,

    /// Secret token used to post through the endpoint.
    pub token: Option<String>,

    /// Endpoint name as shown on the platform.
    pub name: Option<String>,

    /// Channel the endpoint belongs to.
    pub channel_id: String,
}

impl EndpointHandle {
    /// Create a handle.
    pub fn new(
        id: impl Into<String>,
        token: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            token: Some(token.into()),
            name: None,
            channel_id: channel_id.into(),
        }
    }

    /// Set the endpoint name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether this endpoint can be posted to and carries `name`.
    pub fn is_usable_as(&self, name: &str) -> bool {
        self.token.is_some() && self.name.as_deref() == Some(name)
    }
}

/// One outbound platform message.
#[derive(Debug, Clone, Default)]
pub struct OutboundPayload {
    /// Text content of this chunk.
    pub content: String,

    /// Name shown as the sender.
    pub username: String,

    /// Avatar shown next to the message.
    pub avatar_url: String,

    /// Thread to post into, if the target is a thread.
    pub thread_id: Option<String>,

    /// Rich embeds. Only set on the last chunk of a delivery.
    pub embeds: Vec<Embed>,

    /// File attachments. Only set on the last chunk of a delivery.
    pub attachments: Vec<Attachment>,

    /// Whether this chunk carries a system error rather than persona content.
    pub is_error: bool,
}

impl OutboundPayload {
    /// Whether the payload carries embeds or attachments.
    pub fn has_structure(&self) -> bool {
        !self.embeds.is_empty() || !self.attachments.is_empty()
    }
}

/// The platform's record of a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Message ID assigned by the platform.
    pub id: String,

    /// Channel the message landed in.
    pub channel_id: String,
}

impl SentMessage {
    /// Create a sent message record.
    pub fn new(id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
        }
    }
}

/// Bounds applied to a resource download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Total time allowed for the download.
    pub timeout: Duration,

    /// Largest body accepted, in bytes.
    pub max_bytes: u64,
}

/// A downloaded resource.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    /// Body bytes.
    pub bytes: Bytes,

    /// Content type reported by the server, if any.
    pub content_type: Option<String>,
}
