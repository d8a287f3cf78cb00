//! Engine wiring shared by the commands.

use anyhow::Context;
use personacast_core::Config;
use personacast_delivery::{
    AvatarIndex, DeliveryEngine, FileAvatarIndex, HttpPlatformClient, MemoryAvatarIndex,
    MemoryPlatform, PlatformClient, StaticPersonaDirectory,
};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Load and validate configuration.
///
/// An explicit path must exist. Without one, the default file is used if
/// present and defaults otherwise.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_or_default(),
    };
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    Ok(config)
}

/// A configured engine and the pieces commands need next to it.
pub struct Runtime {
    /// Loaded configuration.
    pub config: Config,

    /// Delivery engine.
    pub engine: Arc<DeliveryEngine>,

    /// Personas from the config file.
    pub directory: Arc<StaticPersonaDirectory>,

    /// The in-memory platform, for dry runs.
    pub recorder: Option<Arc<MemoryPlatform>>,
}

impl Runtime {
    /// Build an engine that talks to the configured platform API.
    pub fn http(config: Config) -> anyhow::Result<Self> {
        let platform = Arc::new(HttpPlatformClient::from_config(&config)?);
        let index = Arc::new(FileAvatarIndex::from_default_path()?);
        debug!(index = %index.path().display(), "Using avatar index");
        Self::build(config, platform, index, None)
    }

    /// Build an engine that records messages instead of sending them.
    ///
    /// Nothing is persisted; avatar downloads fail and resolve to the
    /// fallback URL.
    pub fn dry_run(config: Config) -> anyhow::Result<Self> {
        let recorder = Arc::new(MemoryPlatform::new());
        Self::build(
            config,
            recorder.clone(),
            Arc::new(MemoryAvatarIndex::new()),
            Some(recorder),
        )
    }

    fn build(
        config: Config,
        platform: Arc<dyn PlatformClient>,
        index: Arc<dyn AvatarIndex>,
        recorder: Option<Arc<MemoryPlatform>>,
    ) -> anyhow::Result<Self> {
        let directory = Arc::new(StaticPersonaDirectory::from_config(&config));
        let engine = DeliveryEngine::builder(platform)
            .config(&config)?
            .avatar_index(index)
            .directory(directory.clone())
            .build()?;

        Ok(Self {
            config,
            engine: Arc::new(engine),
            directory,
            recorder,
        })
    }
}
