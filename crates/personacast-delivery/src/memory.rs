//! In-memory platform client.
//!
//! Records every call instead of talking to a chat platform. Used for
//! dry runs and as the platform double in tests.

use crate::error::DeliveryError;
use crate::traits::{
    EndpointHandle, FetchOptions, FetchedResource, OutboundPayload, PlatformClient, SentMessage,
};
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// One message accepted by [`MemoryPlatform::send`].
#[derive(Debug, Clone)]
pub struct RecordedSend {
    /// Endpoint the message was sent through.
    pub endpoint: EndpointHandle,

    /// Payload as received.
    pub payload: OutboundPayload,

    /// Message record returned to the caller.
    pub message: SentMessage,
}

/// A [`PlatformClient`] that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryPlatform {
    endpoints: Mutex<HashMap<String, Vec<EndpointHandle>>>,
    sent: Mutex<Vec<RecordedSend>>,
    resources: Mutex<HashMap<String, FetchedResource>>,
    send_failures: Mutex<VecDeque<DeliveryError>>,
    send_delay: Mutex<Duration>,
    fetch_delay: Mutex<Duration>,
    next_id: AtomicU64,
    fetches: AtomicUsize,
    lists: AtomicUsize,
    creates: AtomicUsize,
}

impl MemoryPlatform {
    /// Create an empty platform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send take `delay` before completing.
    pub fn with_send_delay(self, delay: Duration) -> Self {
        *self.send_delay.lock() = delay;
        self
    }

    /// Make every resource fetch take `delay` before completing.
    pub fn with_fetch_delay(self, delay: Duration) -> Self {
        *self.fetch_delay.lock() = delay;
        self
    }

    /// Serve `bytes` at `url`.
    pub fn add_resource(&self, url: &str, bytes: impl Into<Bytes>, content_type: Option<&str>) {
        self.resources.lock().insert(
            url.to_string(),
            FetchedResource {
                bytes: bytes.into(),
                content_type: content_type.map(str::to_string),
            },
        );
    }

    /// Stop serving `url`.
    pub fn remove_resource(&self, url: &str) {
        self.resources.lock().remove(url);
    }

    /// Register an endpoint that already exists on the platform.
    pub fn add_endpoint(&self, endpoint: EndpointHandle) {
        self.endpoints
            .lock()
            .entry(endpoint.channel_id.clone())
            .or_default()
            .push(endpoint);
    }

    /// Delete an endpoint, as if removed by a channel admin.
    pub fn delete_endpoint(&self, endpoint_id: &str) {
        for endpoints in self.endpoints.lock().values_mut() {
            endpoints.retain(|e| e.id != endpoint_id);
        }
    }

    /// Fail the next send with `error`. Queued failures are used in order.
    pub fn fail_next_send(&self, error: DeliveryError) {
        self.send_failures.lock().push_back(error);
    }

    /// Endpoints currently on a channel.
    pub fn endpoints(&self, channel_id: &str) -> Vec<EndpointHandle> {
        self.endpoints
            .lock()
            .get(channel_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Every accepted send, in order.
    pub fn sent(&self) -> Vec<RecordedSend> {
        self.sent.lock().clone()
    }

    /// Number of accepted sends.
    pub fn send_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Number of resource fetches attempted.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of endpoint listings.
    pub fn list_count(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    /// Number of endpoints created.
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl PlatformClient for MemoryPlatform {
    async fn list_endpoints(&self, channel_id: &str) -> Result<Vec<EndpointHandle>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        Ok(self.endpoints(channel_id))
    }

    async fn create_endpoint(&self, channel_id: &str, name: &str) -> Result<EndpointHandle> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let n = self.next_id();
        let endpoint =
            EndpointHandle::new(format!("wh-{}", n), format!("token-{}", n), channel_id).named(name);
        self.add_endpoint(endpoint.clone());
        Ok(endpoint)
    }

    async fn send(
        &self,
        endpoint: &EndpointHandle,
        payload: &OutboundPayload,
    ) -> Result<SentMessage> {
        let delay = *self.send_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.send_failures.lock().pop_front() {
            return Err(error);
        }

        let exists = self
            .endpoints
            .lock()
            .get(&endpoint.channel_id)
            .map(|list| list.iter().any(|e| e.id == endpoint.id))
            .unwrap_or(false);
        if !exists {
            return Err(DeliveryError::endpoint_not_found(&endpoint.id));
        }

        let channel_id = payload
            .thread_id
            .clone()
            .unwrap_or_else(|| endpoint.channel_id.clone());
        let message = SentMessage::new(format!("msg-{}", self.next_id()), channel_id);

        debug!(
            endpoint = %endpoint.id,
            username = %payload.username,
            chars = payload.content.chars().count(),
            "Recorded send"
        );

        self.sent.lock().push(RecordedSend {
            endpoint: endpoint.clone(),
            payload: payload.clone(),
            message: message.clone(),
        });
        Ok(message)
    }

    async fn fetch_resource(&self, url: &str, options: FetchOptions) -> Result<FetchedResource> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let delay = *self.fetch_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let resource = self
            .resources
            .lock()
            .get(url)
            .cloned()
            .ok_or(DeliveryError::FetchStatus(404))?;

        let size = resource.bytes.len() as u64;
        if size > options.max_bytes {
            return Err(DeliveryError::ResourceTooLarge {
                size,
                max: options.max_bytes,
            });
        }
        Ok(resource)
    }
}
