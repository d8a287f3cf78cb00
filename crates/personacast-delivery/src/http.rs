//! Webhook REST platform client.
//!
//! Talks to a Discord-compatible webhook API:
//!
//! - `GET  /channels/{channel}/webhooks` lists endpoints (bot token)
//! - `POST /channels/{channel}/webhooks` creates one (bot token)
//! - `POST /webhooks/{id}/{token}?wait=true` sends a message
//!
//! Messages with attachments are sent as multipart with a `payload_json`
//! part; everything else is plain JSON.

use crate::error::DeliveryError;
use crate::traits::{
    EndpointHandle, FetchOptions, FetchedResource, OutboundPayload, PlatformClient, SentMessage,
};
use crate::Result;
use async_trait::async_trait;
use bytes::BytesMut;
use personacast_core::types::Embed;
use personacast_core::Config;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default request timeout for API calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Webhook as returned by the API.
#[derive(Debug, Deserialize)]
struct ApiWebhook {
    id: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    name: Option<String>,
    channel_id: String,
}

impl From<ApiWebhook> for EndpointHandle {
    fn from(webhook: ApiWebhook) -> Self {
        Self {
            id: webhook.id,
            token: webhook.token,
            name: webhook.name,
            channel_id: webhook.channel_id,
        }
    }
}

/// Message as returned by `?wait=true`.
#[derive(Debug, Deserialize)]
struct ApiMessage {
    id: String,
    channel_id: String,
}

/// Rate limit response body.
#[derive(Debug, Deserialize)]
struct ApiRateLimit {
    retry_after: f64,
}

#[derive(Debug, Serialize)]
struct CreateWebhookBody<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct AllowedMentions {
    parse: [&'static str; 0],
}

#[derive(Debug, Serialize)]
struct AttachmentMeta<'a> {
    id: usize,
    filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ExecuteWebhookBody<'a> {
    content: &'a str,
    username: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    avatar_url: &'a str,
    #[serde(skip_serializing_if = "<[Embed]>::is_empty")]
    embeds: &'a [Embed],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentMeta<'a>>,
    allowed_mentions: AllowedMentions,
}

/// A [`PlatformClient`] over HTTP.
#[derive(Clone)]
pub struct HttpPlatformClient {
    client: Client,
    api_base: String,
    bot_token: Option<String>,
}

impl std::fmt::Debug for HttpPlatformClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPlatformClient")
            .field("api_base", &self.api_base)
            .field("bot_token", &self.bot_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpPlatformClient {
    /// Create a client for the API at `api_base`.
    pub fn new(
        api_base: impl Into<String>,
        bot_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("personacast/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token,
        })
    }

    /// Create a client from the `platform` config section.
    ///
    /// The bot token is read from the environment variable named by
    /// `platform.token_env`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let bot_token = std::env::var(&config.platform.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty());
        if bot_token.is_none() {
            debug!(
                env = %config.platform.token_env,
                "No bot token set, endpoint management unavailable"
            );
        }
        Self::new(
            config.platform.api_base_url.clone(),
            bot_token,
            Duration::from_millis(config.platform.request_timeout_ms),
        )
    }

    fn bot_auth(&self) -> Result<String> {
        self.bot_token
            .as_ref()
            .map(|token| format!("Bot {}", token))
            .ok_or_else(|| DeliveryError::Config("bot token is not configured".to_string()))
    }

    fn webhooks_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{}/webhooks", self.api_base, channel_id)
    }

    fn execute_url(&self, endpoint: &EndpointHandle, token: &str) -> String {
        format!("{}/webhooks/{}/{}", self.api_base, endpoint.id, token)
    }

    /// Map a non-success response to the error taxonomy.
    async fn error_for(response: Response, subject: &str) -> DeliveryError {
        let status = response.status();
        let retry_header = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok());
        let body = response.text().await.unwrap_or_default();

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let seconds = serde_json::from_str::<ApiRateLimit>(&body)
                    .map(|r| r.retry_after)
                    .ok()
                    .or(retry_header)
                    .unwrap_or(1.0);
                DeliveryError::rate_limited((seconds * 1000.0).ceil() as u64)
            }
            StatusCode::NOT_FOUND => DeliveryError::endpoint_not_found(subject),
            StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE => {
                DeliveryError::PayloadRejected(format!("{}: {}", status, body))
            }
            _ => DeliveryError::transport(format!("{} ({}): {}", subject, status, body)),
        }
    }

    async fn build_form(
        payload: &OutboundPayload,
        body: &ExecuteWebhookBody<'_>,
    ) -> Result<reqwest::multipart::Form> {
        let mut form =
            reqwest::multipart::Form::new().text("payload_json", serde_json::to_string(body)?);

        for (index, attachment) in payload.attachments.iter().enumerate() {
            let data = attachment.data().await?;
            let part = reqwest::multipart::Part::bytes(data.to_vec())
                .file_name(attachment.upload_name())
                .mime_str(&attachment.mime_type)
                .map_err(|e| DeliveryError::Attachment(e.to_string()))?;
            form = form.part(format!("files[{}]", index), part);
        }
        Ok(form)
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn list_endpoints(&self, channel_id: &str) -> Result<Vec<EndpointHandle>> {
        let response = self
            .client
            .get(self.webhooks_url(channel_id))
            .header(reqwest::header::AUTHORIZATION, self.bot_auth()?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response, channel_id).await);
        }

        let webhooks: Vec<ApiWebhook> = response.json().await?;
        Ok(webhooks.into_iter().map(EndpointHandle::from).collect())
    }

    async fn create_endpoint(&self, channel_id: &str, name: &str) -> Result<EndpointHandle> {
        let response = self
            .client
            .post(self.webhooks_url(channel_id))
            .header(reqwest::header::AUTHORIZATION, self.bot_auth()?)
            .json(&CreateWebhookBody { name })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response, channel_id).await);
        }

        let webhook: ApiWebhook = response.json().await?;
        Ok(webhook.into())
    }

    async fn send(
        &self,
        endpoint: &EndpointHandle,
        payload: &OutboundPayload,
    ) -> Result<SentMessage> {
        let token = endpoint
            .token
            .as_deref()
            .ok_or_else(|| DeliveryError::endpoint_not_found(&endpoint.id))?;

        let body = ExecuteWebhookBody {
            content: &payload.content,
            username: &payload.username,
            avatar_url: &payload.avatar_url,
            embeds: &payload.embeds,
            attachments: payload
                .attachments
                .iter()
                .enumerate()
                .map(|(id, a)| AttachmentMeta {
                    id,
                    filename: a.upload_name(),
                    description: a.description.as_deref(),
                })
                .collect(),
            allowed_mentions: AllowedMentions { parse: [] },
        };

        let mut query = vec![("wait", "true".to_string())];
        if let Some(thread_id) = &payload.thread_id {
            query.push(("thread_id", thread_id.clone()));
        }

        let request = self
            .client
            .post(self.execute_url(endpoint, token))
            .query(&query);

        let request = if payload.attachments.is_empty() {
            request.json(&body)
        } else {
            request.multipart(Self::build_form(payload, &body).await?)
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Self::error_for(response, &endpoint.id).await);
        }

        let message: ApiMessage = response.json().await?;
        debug!(endpoint = %endpoint.id, message = %message.id, "Message sent");
        Ok(SentMessage::new(message.id, message.channel_id))
    }

    async fn fetch_resource(&self, url: &str, options: FetchOptions) -> Result<FetchedResource> {
        let parsed =
            url::Url::parse(url).map_err(|e| DeliveryError::MalformedUrl(format!("{}: {}", url, e)))?;

        let timeout_ms = options.timeout.as_millis() as u64;
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                DeliveryError::FetchTimeout(timeout_ms)
            } else {
                DeliveryError::Http(e)
            }
        };

        let mut response = self
            .client
            .get(parsed)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(map_err)?;

        if !response.status().is_success() {
            return Err(DeliveryError::FetchStatus(response.status().as_u16()));
        }

        if let Some(length) = response.content_length() {
            if length > options.max_bytes {
                return Err(DeliveryError::ResourceTooLarge {
                    size: length,
                    max: options.max_bytes,
                });
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(map_err)? {
            let size = (body.len() + chunk.len()) as u64;
            if size > options.max_bytes {
                return Err(DeliveryError::ResourceTooLarge {
                    size,
                    max: options.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchedResource {
            bytes: body.freeze(),
            content_type,
        })
    }
}
