//! Persona avatar caching.
//!
//! The [`AvatarManager`] downloads each persona's remote avatar once, keeps
//! the bytes in a local cache directory, and hands out a stable local URL
//! that the gateway serves. Resolution never fails: any problem with the
//! remote image yields the configured fallback URL.

use crate::avatar_index::{AvatarCacheEntry, AvatarIndex};
use crate::error::DeliveryError;
use crate::traits::{FetchOptions, PersonaDirectory, PlatformClient};
use crate::Result;
use chrono::Utc;
use dashmap::DashMap;
use personacast_core::id;
use personacast_core::types::Persona;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default largest avatar accepted (5 MiB).
pub const DEFAULT_MAX_AVATAR_BYTES: u64 = 5 * 1024 * 1024;

/// Default avatar download timeout.
pub const DEFAULT_AVATAR_TIMEOUT: Duration = Duration::from_millis(5000);

/// Extension used when the server does not name the image type.
const DEFAULT_EXTENSION: &str = "png";

/// Avatar manager settings.
#[derive(Debug, Clone)]
pub struct AvatarSettings {
    /// Directory holding cached files.
    pub cache_dir: PathBuf,

    /// Base URL the gateway is reachable at.
    pub public_base_url: String,

    /// URL handed out when resolution fails.
    pub fallback_url: String,

    /// Download bounds.
    pub fetch: FetchOptions,
}

impl AvatarSettings {
    /// Settings with default download bounds.
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        fallback_url: impl Into<String>,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            public_base_url: public_base_url.into(),
            fallback_url: fallback_url.into(),
            fetch: FetchOptions {
                timeout: DEFAULT_AVATAR_TIMEOUT,
                max_bytes: DEFAULT_MAX_AVATAR_BYTES,
            },
        }
    }

    /// Build settings from the `avatar` config section.
    pub fn from_config(config: &personacast_core::Config) -> Result<Self> {
        let cache_dir = config
            .avatar_cache_dir()
            .map_err(|e| DeliveryError::Config(e.to_string()))?;
        Ok(Self {
            cache_dir,
            public_base_url: config.avatar.public_base_url.clone(),
            fallback_url: config.avatar.fallback_url.clone(),
            fetch: FetchOptions {
                timeout: Duration::from_millis(config.avatar.timeout_ms),
                max_bytes: config.avatar.max_bytes,
            },
        })
    }
}

/// Fetches, validates and caches persona avatars.
pub struct AvatarManager {
    platform: Arc<dyn PlatformClient>,
    index: Arc<dyn AvatarIndex>,
    settings: AvatarSettings,
    directory: Option<Arc<dyn PersonaDirectory>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AvatarManager {
    /// Create a manager.
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        index: Arc<dyn AvatarIndex>,
        settings: AvatarSettings,
    ) -> Self {
        Self {
            platform,
            index,
            settings,
            directory: None,
            locks: DashMap::new(),
        }
    }

    /// Write resolved avatar URLs back to a persona directory.
    pub fn with_directory(mut self, directory: Arc<dyn PersonaDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.settings.cache_dir
    }

    /// URL handed out when resolution fails.
    pub fn fallback_url(&self) -> &str {
        &self.settings.fallback_url
    }

    /// Resolve a persona's avatar to a locally served URL.
    ///
    /// Downloads at most once per (persona, remote URL) while the cached file
    /// exists. Returns the fallback URL on any failure.
    pub async fn resolve_avatar(&self, persona_key: &str, remote_url: Option<&str>) -> String {
        let Some(remote_url) = validate_remote_url(remote_url) else {
            debug!(persona = persona_key, "No usable avatar source, using fallback");
            return self.settings.fallback_url.clone();
        };

        let lock = self.key_lock(persona_key);
        let _guard = lock.lock().await;

        if let Some(entry) = self.cached_entry(persona_key, &remote_url).await {
            debug!(persona = persona_key, file = %entry.local_filename, "Avatar cache hit");
            return self.local_url(&entry.local_filename);
        }

        match self.download(persona_key, &remote_url).await {
            Ok(entry) => self.local_url(&entry.local_filename),
            Err(e) => {
                warn!(
                    persona = persona_key,
                    url = %remote_url,
                    category = %e.category(),
                    "Avatar download failed, using fallback: {}",
                    e
                );
                self.settings.fallback_url.clone()
            }
        }
    }

    /// Whether the cached avatar is missing, stale, or differs from the remote.
    ///
    /// Fetches the remote image when a cache entry exists, to compare
    /// checksums. A failed fetch keeps the current file and reports `false`.
    pub async fn needs_refresh(&self, persona_key: &str, remote_url: &str) -> bool {
        let Some(remote_url) = validate_remote_url(Some(remote_url)) else {
            return false;
        };
        let Some(entry) = self.cached_entry(persona_key, &remote_url).await else {
            return true;
        };

        match self.fetch_image(&remote_url).await {
            Ok((bytes, _)) => id::sha256_bytes(&bytes) != entry.checksum,
            Err(e) => {
                debug!(persona = persona_key, "Refresh check fetch failed: {}", e);
                false
            }
        }
    }

    /// Re-download the avatar if [`needs_refresh`](Self::needs_refresh) says so.
    pub async fn refresh(&self, persona_key: &str, remote_url: &str) -> String {
        if self.needs_refresh(persona_key, remote_url).await {
            self.invalidate_entry_only(persona_key).await;
        }
        self.resolve_avatar(persona_key, Some(remote_url)).await
    }

    /// Populate the cache for a persona ahead of its first delivery.
    ///
    /// A persona without an avatar source is assigned the fallback, written
    /// back to the persona directory if one is set. A persona with a source
    /// keeps it; only the cache is populated.
    pub async fn preload(&self, persona: Option<&Persona>) -> Option<String> {
        let persona = persona?;
        let source = persona.avatar_source();
        let url = self.resolve_avatar(persona.key(), source).await;

        if source.is_none() {
            if let Some(directory) = &self.directory {
                if let Err(e) = directory.set_avatar_url(persona.key(), &url).await {
                    warn!(persona = persona.key(), "Avatar write-back failed: {}", e);
                }
            }
        }

        info!(persona = persona.key(), url = %url, "Avatar preloaded");
        Some(url)
    }

    /// Drop a persona's cache entry and its file.
    pub async fn invalidate(&self, persona_key: &str) -> Result<bool> {
        let lock = self.key_lock(persona_key);
        let _guard = lock.lock().await;

        let Some(entry) = self.index.remove(persona_key).await? else {
            return Ok(false);
        };
        remove_file_if_exists(&self.settings.cache_dir.join(&entry.local_filename)).await?;
        debug!(persona = persona_key, "Avatar invalidated");
        Ok(true)
    }

    /// Delete cached files that no index entry refers to.
    ///
    /// Returns the number of files removed.
    pub async fn prune_orphans(&self) -> Result<usize> {
        let referenced: HashSet<String> = self
            .index
            .list()
            .await?
            .into_iter()
            .map(|entry| entry.local_filename)
            .collect();

        let mut dir = match tokio::fs::read_dir(&self.settings.cache_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(item) = dir.next_entry().await? {
            if !item.file_type().await?.is_file() {
                continue;
            }
            let name = item.file_name().to_string_lossy().into_owned();
            if referenced.contains(&name) || !is_cache_filename(&name) {
                continue;
            }
            remove_file_if_exists(&item.path()).await?;
            debug!(file = %name, "Removed orphaned avatar file");
            removed += 1;
        }

        if removed > 0 {
            info!("Pruned {} orphaned avatar files", removed);
        }
        Ok(removed)
    }

    /// All cache entries.
    pub async fn entries(&self) -> Result<Vec<AvatarCacheEntry>> {
        self.index.list().await
    }

    /// Path of a cached file, or `None` if `filename` is not a plain file name.
    pub fn local_path(&self, filename: &str) -> Option<PathBuf> {
        cached_file_path(&self.settings.cache_dir, filename)
    }

    /// Public URL of a cached file.
    pub fn local_url(&self, filename: &str) -> String {
        format!(
            "{}/avatars/{}",
            self.settings.public_base_url.trim_end_matches('/'),
            filename
        )
    }

    /// Forget every index entry. Cached files stay until pruned.
    pub async fn reset(&self) -> Result<()> {
        self.index.clear().await?;
        self.locks.clear();
        Ok(())
    }

    fn key_lock(&self, persona_key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(persona_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// The entry for `persona_key`, if it matches `remote_url` and its file exists.
    async fn cached_entry(&self, persona_key: &str, remote_url: &str) -> Option<AvatarCacheEntry> {
        let entry = match self.index.get(persona_key).await {
            Ok(entry) => entry?,
            Err(e) => {
                warn!(persona = persona_key, "Avatar index read failed: {}", e);
                return None;
            }
        };

        if entry.original_url != remote_url {
            debug!(persona = persona_key, "Avatar source changed");
            return None;
        }

        let path = self.settings.cache_dir.join(&entry.local_filename);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Some(entry),
            _ => {
                debug!(persona = persona_key, file = %entry.local_filename, "Cached avatar file missing");
                None
            }
        }
    }

    async fn invalidate_entry_only(&self, persona_key: &str) {
        if let Err(e) = self.index.remove(persona_key).await {
            warn!(persona = persona_key, "Avatar index remove failed: {}", e);
        }
    }

    async fn fetch_image(&self, remote_url: &str) -> Result<(bytes::Bytes, &'static str)> {
        let fetch = self.settings.fetch;
        let resource = tokio::time::timeout(
            fetch.timeout,
            self.platform.fetch_resource(remote_url, fetch),
        )
        .await
        .map_err(|_| DeliveryError::FetchTimeout(fetch.timeout.as_millis() as u64))??;

        let size = resource.bytes.len() as u64;
        if size > fetch.max_bytes {
            return Err(DeliveryError::ResourceTooLarge {
                size,
                max: fetch.max_bytes,
            });
        }
        if resource.bytes.is_empty() {
            return Err(DeliveryError::UnsupportedContentType("empty body".to_string()));
        }

        let extension = image_extension(resource.content_type.as_deref())?;
        Ok((resource.bytes, extension))
    }

    async fn download(&self, persona_key: &str, remote_url: &str) -> Result<AvatarCacheEntry> {
        let (bytes, extension) = self.fetch_image(remote_url).await?;
        let checksum = id::sha256_bytes(&bytes);
        let filename = cache_filename(persona_key, extension);

        tokio::fs::create_dir_all(&self.settings.cache_dir).await?;
        let path = self.settings.cache_dir.join(&filename);
        let temp_path = self.settings.cache_dir.join(format!("{}.tmp", filename));
        tokio::fs::write(&temp_path, &bytes).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        let previous = self.index.get(persona_key).await.ok().flatten();
        if let Some(previous) = &previous {
            if previous.local_filename != filename {
                remove_file_if_exists(&self.settings.cache_dir.join(&previous.local_filename))
                    .await?;
            }
        }

        let entry = AvatarCacheEntry {
            persona_key: persona_key.to_string(),
            original_url: remote_url.to_string(),
            local_filename: filename,
            checksum,
            downloaded_at: Utc::now(),
        };
        self.index.put(entry.clone()).await?;

        let changed = previous.map_or(true, |p| p.checksum != entry.checksum);
        info!(
            persona = persona_key,
            file = %entry.local_filename,
            bytes = bytes.len(),
            changed,
            "Avatar cached"
        );
        Ok(entry)
    }
}

/// Accept only absolute http(s) URLs.
fn validate_remote_url(remote_url: Option<&str>) -> Option<String> {
    let raw = remote_url.map(str::trim).filter(|s| !s.is_empty())?;
    match url::Url::parse(raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some() => {
            Some(parsed.to_string())
        }
        _ => None,
    }
}

/// Map a content type to a file extension, rejecting non-images.
fn image_extension(content_type: Option<&str>) -> Result<&'static str> {
    let Some(raw) = content_type.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(DEFAULT_EXTENSION);
    };
    let parsed: mime::Mime = raw
        .parse()
        .map_err(|_| DeliveryError::UnsupportedContentType(raw.to_string()))?;

    if parsed.type_() != mime::IMAGE {
        return Err(DeliveryError::UnsupportedContentType(raw.to_string()));
    }

    let extension = match parsed.subtype().as_str() {
        "png" => "png",
        "jpeg" | "jpg" | "pjpeg" => "jpg",
        "gif" => "gif",
        "webp" => "webp",
        "avif" => "avif",
        "bmp" => "bmp",
        _ => mime_guess::get_mime_extensions(&parsed)
            .and_then(|exts| exts.first().copied())
            .unwrap_or(DEFAULT_EXTENSION),
    };
    Ok(extension)
}

/// Deterministic file name for a persona's avatar.
///
/// The slug keeps names readable; the hash keeps distinct keys that
/// normalize alike apart.
fn cache_filename(persona_key: &str, extension: &str) -> String {
    let slug = id::normalize(persona_key);
    let hash = &id::short_hash(persona_key)[..8];
    if slug.is_empty() {
        format!("{}.{}", hash, extension)
    } else {
        format!("{}-{}.{}", slug, hash, extension)
    }
}

/// Whether `name` has the shape [`cache_filename`] produces.
fn is_cache_filename(name: &str) -> bool {
    let Some((stem, extension)) = name.rsplit_once('.') else {
        return false;
    };
    let hash = match stem.rsplit_once('-') {
        Some((slug, hash)) => {
            let slug_ok = !slug.is_empty()
                && slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !slug_ok {
                return false;
            }
            hash
        }
        None => stem,
    };
    hash.len() == 8
        && hash.chars().all(|c| c.is_ascii_hexdigit())
        && !extension.is_empty()
        && extension.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Resolve `filename` inside `cache_dir`, refusing anything but a plain name.
pub fn cached_file_path(cache_dir: &Path, filename: &str) -> Option<PathBuf> {
    let valid = !filename.is_empty()
        && !filename.starts_with('.')
        && !filename.contains(['/', '\\'])
        && !filename.contains("..");
    valid.then(|| cache_dir.join(filename))
}

async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
