//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Main Personacast configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Delivery pipeline settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Avatar cache settings.
    #[serde(default)]
    pub avatar: AvatarConfig,

    /// Error tracking settings.
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Chat platform API settings.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Avatar gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Statically configured personas, keyed by full name.
    #[serde(default)]
    pub personas: HashMap<String, PersonaConfig>,
}

/// Delivery pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Maximum characters per platform message.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Pause between consecutive chunk sends, in milliseconds.
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,

    /// Window in which identical content is suppressed, in milliseconds.
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,

    /// Number of leading content characters hashed into a signature.
    #[serde(default = "default_signature_prefix_chars")]
    pub signature_prefix_chars: usize,

    /// Display name used when a delivery has no persona.
    #[serde(default = "default_fallback_display_name")]
    pub fallback_display_name: String,

    /// Marker that flags a chunk as not displayable.
    #[serde(default = "default_must_not_display_sentinel")]
    pub must_not_display_sentinel: String,

    /// Prefix that classifies content as a system error message.
    #[serde(default = "default_error_marker")]
    pub error_marker: String,
}

fn default_max_message_length() -> usize {
    2000
}

fn default_chunk_delay_ms() -> u64 {
    750
}

fn default_dedup_window_ms() -> u64 {
    5000
}

fn default_signature_prefix_chars() -> usize {
    200
}

fn default_fallback_display_name() -> String {
    "Assistant".to_string()
}

fn default_must_not_display_sentinel() -> String {
    "[[MUST_NOT_DISPLAY]]".to_string()
}

fn default_error_marker() -> String {
    "⚠️".to_string()
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
            chunk_delay_ms: default_chunk_delay_ms(),
            dedup_window_ms: default_dedup_window_ms(),
            signature_prefix_chars: default_signature_prefix_chars(),
            fallback_display_name: default_fallback_display_name(),
            must_not_display_sentinel: default_must_not_display_sentinel(),
            error_marker: default_error_marker(),
        }
    }
}

/// Avatar cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarConfig {
    /// Directory holding cached avatar files. Defaults to ~/.personacast/avatars.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Public base URL under which cached files are served.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Avatar used whenever a persona's avatar cannot be resolved.
    #[serde(default = "default_fallback_url")]
    pub fallback_url: String,

    /// Maximum download size in bytes.
    #[serde(default = "default_avatar_max_bytes")]
    pub max_bytes: u64,

    /// Download timeout in milliseconds.
    #[serde(default = "default_avatar_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:18790".to_string()
}

fn default_fallback_url() -> String {
    "https://cdn.discordapp.com/embed/avatars/0.png".to_string()
}

fn default_avatar_max_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_avatar_timeout_ms() -> u64 {
    5000
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            public_base_url: default_public_base_url(),
            fallback_url: default_fallback_url(),
            max_bytes: default_avatar_max_bytes(),
            timeout_ms: default_avatar_timeout_ms(),
        }
    }
}

/// Error tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Rolling window for occurrence counting, in seconds.
    #[serde(default = "default_tracking_window_secs")]
    pub window_secs: u64,

    /// Occurrence count at which an error is escalated.
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: u32,

    /// Longest string recorded in error metadata before truncation.
    #[serde(default = "default_max_metadata_chars")]
    pub max_metadata_chars: usize,
}

fn default_tracking_window_secs() -> u64 {
    30 * 60
}

fn default_escalation_threshold() -> u32 {
    6
}

fn default_max_metadata_chars() -> usize {
    200
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            window_secs: default_tracking_window_secs(),
            escalation_threshold: default_escalation_threshold(),
            max_metadata_chars: default_max_metadata_chars(),
        }
    }
}

/// Chat platform API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// REST API base URL.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Environment variable holding the bot token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Name given to endpoints this process creates and reuses.
    #[serde(default = "default_webhook_name")]
    pub webhook_name: String,

    /// Request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_api_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_token_env() -> String {
    "PERSONACAST_BOT_TOKEN".to_string()
}

fn default_webhook_name() -> String {
    "personacast".to_string()
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            token_env: default_token_env(),
            webhook_name: default_webhook_name(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Avatar gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind mode.
    #[serde(default)]
    pub bind: BindMode,

    /// Port number.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    18790
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: BindMode::default(),
            port: default_port(),
        }
    }
}

/// Gateway bind mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Bind to loopback only (127.0.0.1).
    #[default]
    Loopback,

    /// Bind to all interfaces.
    Lan,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by tracing filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// A statically configured persona.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Display name; defaults to the persona key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Remote avatar source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}
