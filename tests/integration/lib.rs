//! Shared fixtures for the integration tests.

use personacast_core::types::Persona;
use personacast_delivery::{
    AvatarIndex, AvatarSettings, DeliveryEngine, DeliverySettings, FileAvatarIndex, MemoryPlatform,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Remote avatar used by the Aria persona.
pub const ARIA_AVATAR: &str = "https://cdn.test/avatars/aria.png";

/// Avatar handed out when resolution fails.
pub const FALLBACK_AVATAR: &str = "https://cdn.test/fallback.png";

/// Base URL the gateway serves avatars from.
pub const PUBLIC_BASE: &str = "http://127.0.0.1:18790";

/// A small PNG-tagged payload.
pub fn png_bytes() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    bytes.extend_from_slice(&[7u8; 24]);
    bytes
}

/// The persona most tests deliver as.
pub fn aria() -> Persona {
    Persona::new("Aria").with_avatar_url(ARIA_AVATAR)
}

/// A memory platform that serves the Aria avatar.
pub fn platform() -> Arc<MemoryPlatform> {
    let platform = Arc::new(MemoryPlatform::new());
    platform.add_resource(ARIA_AVATAR, png_bytes(), Some("image/png"));
    platform
}

/// An engine with a file-backed avatar index under `dir`.
pub fn engine_in(dir: &Path, platform: Arc<MemoryPlatform>, settings: DeliverySettings) -> DeliveryEngine {
    let index: Arc<dyn AvatarIndex> = Arc::new(FileAvatarIndex::new(dir.join("avatar-index.json")));
    DeliveryEngine::builder(platform)
        .settings(settings)
        .avatar_settings(AvatarSettings::new(
            dir.join("avatars"),
            PUBLIC_BASE,
            FALLBACK_AVATAR,
        ))
        .avatar_index(index)
        .build()
        .expect("engine builds")
}

/// Engine, platform, and the temp dir they share.
pub struct Harness {
    /// Platform double.
    pub platform: Arc<MemoryPlatform>,

    /// Engine under test.
    pub engine: Arc<DeliveryEngine>,

    /// Cache root.
    pub dir: TempDir,
}

impl Harness {
    /// Harness with default delivery settings.
    pub fn new() -> Self {
        Self::with_settings(DeliverySettings::default())
    }

    /// Harness with custom delivery settings.
    pub fn with_settings(settings: DeliverySettings) -> Self {
        Self::with_platform(platform(), settings)
    }

    /// Harness around a prepared platform.
    pub fn with_platform(platform: Arc<MemoryPlatform>, settings: DeliverySettings) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let engine = engine_in(dir.path(), platform.clone(), settings);
        Self {
            platform,
            engine: Arc::new(engine),
            dir,
        }
    }

    /// Start a fresh engine over the same platform and cache directory.
    pub fn restart(&self) -> DeliveryEngine {
        engine_in(self.dir.path(), self.platform.clone(), self.engine.settings().clone())
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
