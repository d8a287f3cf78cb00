//! HTTP gateway server.
//!
//! Serves cached avatar files at the URLs the avatar manager hands out,
//! and exposes the delivery engine over HTTP.

use crate::error::GatewayError;
use crate::Result;
use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use personacast_core::config::BindMode;
use personacast_core::types::{ChannelRef, Embed, Persona};
use personacast_delivery::{DeliverOptions, DeliveryEngine, DeliveryResult, PersonaDirectory};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Default gateway port.
pub const DEFAULT_PORT: u16 = 18790;

/// Cache lifetime advertised for avatar files.
const AVATAR_MAX_AGE_SECS: u64 = 86_400;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind mode.
    pub bind: BindMode,

    /// Port number.
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: BindMode::Loopback,
            port: DEFAULT_PORT,
        }
    }
}

impl GatewayConfig {
    /// Build from the `gateway` config section.
    pub fn from_config(config: &personacast_core::config::GatewayConfig) -> Self {
        Self {
            bind: config.bind,
            port: config.port,
        }
    }

    /// Socket address to bind.
    pub fn bind_address(&self) -> SocketAddr {
        let ip = match self.bind {
            BindMode::Loopback => [127, 0, 0, 1],
            BindMode::Lan => [0, 0, 0, 0],
        };
        SocketAddr::from((ip, self.port))
    }
}

/// Gateway server state.
pub struct GatewayState {
    /// Delivery engine.
    pub engine: Arc<DeliveryEngine>,

    /// Persona lookup for deliveries that name a persona by key.
    pub directory: Option<Arc<dyn PersonaDirectory>>,

    started_at: Instant,
}

/// Persona in a delivery request: a directory key or a full persona.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PersonaRef {
    /// Look the persona up by key.
    Key(String),

    /// Use the persona as given.
    Inline(Persona),
}

/// Body of `POST /deliver`.
#[derive(Debug, Deserialize)]
pub struct DeliverRequest {
    /// Target channel.
    pub channel: ChannelRef,

    /// Reply text.
    pub content: String,

    /// Sending persona.
    #[serde(default)]
    pub persona: Option<PersonaRef>,

    /// Embed for the last chunk.
    #[serde(default)]
    pub embed: Option<Embed>,

    /// Model indicator suffix.
    #[serde(default)]
    pub model_indicator: Option<String>,

    /// Treat the content as an error message.
    #[serde(default)]
    pub is_error: bool,
}

/// The HTTP gateway.
pub struct Gateway {
    config: GatewayConfig,
    state: Arc<GatewayState>,
}

impl Gateway {
    /// Create a gateway around a delivery engine.
    pub fn new(config: GatewayConfig, engine: Arc<DeliveryEngine>) -> Self {
        Self {
            config,
            state: Arc::new(GatewayState {
                engine,
                directory: None,
                started_at: Instant::now(),
            }),
        }
    }

    /// Resolve persona keys through `directory`.
    pub fn with_directory(self, directory: Arc<dyn PersonaDirectory>) -> Self {
        let state = GatewayState {
            engine: self.state.engine.clone(),
            directory: Some(directory),
            started_at: self.state.started_at,
        };
        Self {
            config: self.config,
            state: Arc::new(state),
        }
    }

    /// Run the gateway server until it fails.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.bind_address();
        if self.config.bind != BindMode::Loopback {
            warn!("Gateway binding to {}; the delivery endpoint is reachable from the network", addr);
        }

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Starting gateway server on {}", addr);

        axum::serve(listener, self.router())
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        Ok(())
    }

    /// Create the Axum router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/avatars/:file", get(avatar_handler))
            .route("/deliver", post(deliver_handler))
            .route("/stats", get(stats_handler))
            .route("/health", get(health_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }
}

async fn avatar_handler(
    State(state): State<Arc<GatewayState>>,
    Path(file): Path<String>,
) -> Result<impl IntoResponse> {
    let path = state
        .engine
        .avatars()
        .local_path(&file)
        .ok_or_else(|| GatewayError::NotFound(file.clone()))?;

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(file = %file, "Avatar file not cached");
            return Err(GatewayError::NotFound(file));
        }
        Err(e) => return Err(e.into()),
    };

    let content_type = mime_guess::from_path(&path).first_or_octet_stream();
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", AVATAR_MAX_AGE_SECS),
            ),
        ],
        bytes,
    ))
}

async fn deliver_handler(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<DeliverRequest>,
) -> Result<Json<DeliveryResult>> {
    if request.channel.id.trim().is_empty() {
        return Err(GatewayError::InvalidRequest("channel id is empty".to_string()));
    }

    let persona = match request.persona {
        None => None,
        Some(PersonaRef::Inline(persona)) => Some(persona),
        Some(PersonaRef::Key(key)) => {
            let directory = state.directory.as_ref().ok_or_else(|| {
                GatewayError::InvalidRequest("no persona directory configured".to_string())
            })?;
            let persona = directory
                .get_persona(&key)
                .await
                .ok_or_else(|| GatewayError::NotFound(format!("persona {}", key)))?;
            Some(persona)
        }
    };

    let options = DeliverOptions {
        embed: request.embed,
        attachments: Vec::new(),
        model_indicator: request.model_indicator,
        is_error: request.is_error,
    };

    let result = state
        .engine
        .deliver(&request.channel, &request.content, persona.as_ref(), options)
        .await?;
    Ok(Json(result))
}

async fn stats_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let tracker = state.engine.tracker();
    Json(serde_json::json!({
        "errors": tracker.stats(),
        "records": tracker.records(),
        "pending": state.engine.dedup().pending().len(),
        "endpoints": state.engine.webhooks().len(),
    }))
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}
