//! Persona message delivery for Personacast.
//!
//! This crate turns persona replies into chat platform messages. It
//! provides the platform and persona directory traits, along with the
//! pieces the [`DeliveryEngine`] sequences: avatar caching, chunking,
//! duplicate suppression, endpoint management, and error tracking.

pub mod error;
pub mod traits;
pub mod attachment;
pub mod chunker;
pub mod dedup;
pub mod avatar_index;
pub mod avatar;
pub mod webhook;
pub mod tracking;
pub mod delivery;
pub mod directory;
pub mod http;
pub mod memory;

pub use error::{DeliveryError, ErrorCategory};
pub use traits::{
    EndpointHandle, FetchOptions, FetchedResource, OutboundPayload, PersonaDirectory,
    PlatformClient, SentMessage,
};
pub use attachment::{Attachment, AttachmentSource};
pub use chunker::{MessageChunk, MessageChunker};
pub use dedup::{DeduplicationGuard, DeliverySignature, PendingSend, PendingToken};
pub use avatar_index::{AvatarCacheEntry, AvatarIndex, FileAvatarIndex, MemoryAvatarIndex};
pub use avatar::{AvatarManager, AvatarSettings};
pub use webhook::WebhookRegistry;
pub use tracking::{ErrorRecord, ErrorTracker, TrackContext, TrackedError, TrackedPlatformClient, TrackerStats};
pub use delivery::{
    DeliverOptions, DeliveryDisposition, DeliveryEngine, DeliveryEngineBuilder, DeliveryResult,
    DeliverySettings,
};
pub use directory::StaticPersonaDirectory;
pub use http::HttpPlatformClient;
pub use memory::{MemoryPlatform, RecordedSend};

/// Result type for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;
