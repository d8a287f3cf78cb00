//! Delivery error types.

use std::io;
use thiserror::Error;

/// Errors that can occur while delivering persona messages.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Platform rate limit exceeded.
    #[error("Rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Milliseconds to wait before retrying.
        retry_after_ms: u64,
    },

    /// The send endpoint no longer exists on the platform.
    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    /// The platform refused the payload.
    #[error("Payload rejected: {0}")]
    PayloadRejected(String),

    /// Any other platform transport failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A fetched resource exceeded the byte limit.
    #[error("Resource too large: {size} bytes (max: {max} bytes)")]
    ResourceTooLarge {
        /// Observed or announced size.
        size: u64,
        /// Maximum allowed size.
        max: u64,
    },

    /// A resource fetch did not complete in time.
    #[error("Resource fetch timed out after {0}ms")]
    FetchTimeout(u64),

    /// A resource fetch returned a non-success status.
    #[error("Resource fetch failed with status {0}")]
    FetchStatus(u16),

    /// A fetched resource had an unacceptable content type.
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// A URL could not be parsed or used.
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),

    /// Attachment error.
    #[error("Attachment error: {0}")]
    Attachment(String),

    /// Avatar index storage error.
    #[error("Avatar index error: {0}")]
    Index(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Broad error categories used by error tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Platform API transport failures.
    Platform,
    /// Avatar or attachment downloads.
    ResourceFetch,
    /// Local state (index, files, configuration).
    Internal,
    /// Content flagged by policy.
    ContentPolicy,
}

impl ErrorCategory {
    /// Short uppercase prefix used in error IDs.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Platform => "PLT",
            Self::ResourceFetch => "RES",
            Self::Internal => "INT",
            Self::ContentPolicy => "POL",
        }
    }

    /// Lowercase name for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::ResourceFetch => "resource_fetch",
            Self::Internal => "internal",
            Self::ContentPolicy => "content_policy",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DeliveryError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create an endpoint-not-found error.
    pub fn endpoint_not_found(endpoint: impl Into<String>) -> Self {
        Self::EndpointNotFound(endpoint.into())
    }

    /// Create a rate limit error.
    pub fn rate_limited(retry_after_ms: u64) -> Self {
        Self::RateLimited { retry_after_ms }
    }

    /// Classify this error for tracking.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::RateLimited { .. }
            | Self::EndpointNotFound(_)
            | Self::PayloadRejected(_)
            | Self::Transport(_)
            | Self::Http(_) => ErrorCategory::Platform,
            Self::ResourceTooLarge { .. }
            | Self::FetchTimeout(_)
            | Self::FetchStatus(_)
            | Self::UnsupportedContentType(_)
            | Self::MalformedUrl(_) => ErrorCategory::ResourceFetch,
            Self::Io(_)
            | Self::Json(_)
            | Self::Attachment(_)
            | Self::Index(_)
            | Self::Config(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the cached endpoint for this send must be evicted.
    pub fn is_endpoint_not_found(&self) -> bool {
        matches!(self, Self::EndpointNotFound(_))
    }

    /// Check if this error is retriable by the caller.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::FetchTimeout(_) | Self::Io(_)
        )
    }

    /// Get retry delay if applicable.
    pub fn retry_delay(&self) -> Option<std::time::Duration> {
        match self {
            Self::RateLimited { retry_after_ms } => {
                Some(std::time::Duration::from_millis(*retry_after_ms))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(DeliveryError::rate_limited(10).category(), ErrorCategory::Platform);
        assert_eq!(DeliveryError::FetchStatus(404).category(), ErrorCategory::ResourceFetch);
        assert_eq!(
            DeliveryError::Index("bad".into()).category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_endpoint_not_found() {
        assert!(DeliveryError::endpoint_not_found("wh-1").is_endpoint_not_found());
        assert!(!DeliveryError::transport("boom").is_endpoint_not_found());
    }

    #[test]
    fn test_retry_delay() {
        let err = DeliveryError::rate_limited(1500);
        assert!(err.is_retriable());
        assert_eq!(err.retry_delay(), Some(std::time::Duration::from_millis(1500)));
        assert_eq!(DeliveryError::PayloadRejected("x".into()).retry_delay(), None);
    }
}
