//! Avatar metadata index storage.
//!
//! Defines the [`AvatarIndex`] trait and two implementations:
//! [`MemoryAvatarIndex`] for tests and ephemeral processes, and
//! [`FileAvatarIndex`], which keeps every entry in one JSON document.

use crate::error::DeliveryError;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Metadata for one cached avatar file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarCacheEntry {
    /// Persona the avatar belongs to.
    pub persona_key: String,

    /// Remote URL the file was downloaded from.
    pub original_url: String,

    /// File name inside the avatar cache directory.
    pub local_filename: String,

    /// SHA256 of the file contents.
    pub checksum: String,

    /// When the file was downloaded.
    pub downloaded_at: DateTime<Utc>,
}

/// Durable keyed store of avatar cache entries.
#[async_trait]
pub trait AvatarIndex: Send + Sync {
    /// Get the entry for a persona.
    async fn get(&self, persona_key: &str) -> Result<Option<AvatarCacheEntry>>;

    /// Insert or replace the entry for `entry.persona_key`.
    async fn put(&self, entry: AvatarCacheEntry) -> Result<()>;

    /// Remove and return the entry for a persona.
    async fn remove(&self, persona_key: &str) -> Result<Option<AvatarCacheEntry>>;

    /// List all entries.
    async fn list(&self) -> Result<Vec<AvatarCacheEntry>>;

    /// Remove every entry.
    async fn clear(&self) -> Result<()>;
}

/// In-memory avatar index.
#[derive(Debug, Default)]
pub struct MemoryAvatarIndex {
    entries: RwLock<HashMap<String, AvatarCacheEntry>>,
}

impl MemoryAvatarIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AvatarIndex for MemoryAvatarIndex {
    async fn get(&self, persona_key: &str) -> Result<Option<AvatarCacheEntry>> {
        Ok(self.entries.read().await.get(persona_key).cloned())
    }

    async fn put(&self, entry: AvatarCacheEntry) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(entry.persona_key.clone(), entry);
        Ok(())
    }

    async fn remove(&self, persona_key: &str) -> Result<Option<AvatarCacheEntry>> {
        Ok(self.entries.write().await.remove(persona_key))
    }

    async fn list(&self) -> Result<Vec<AvatarCacheEntry>> {
        Ok(self.entries.read().await.values().cloned().collect())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// On-disk document layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexDocument {
    #[serde(default)]
    entries: HashMap<String, AvatarCacheEntry>,
}

/// A file-backed avatar index.
///
/// The whole index is one JSON document, loaded on first use and rewritten
/// atomically (temp file + rename) on every change.
pub struct FileAvatarIndex {
    path: PathBuf,
    entries: Mutex<Option<HashMap<String, AvatarCacheEntry>>>,
}

impl FileAvatarIndex {
    /// Create an index stored at `path`. Nothing is read until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    /// Create an index at the default location (`~/.personacast/avatar-index.json`).
    pub fn from_default_path() -> Result<Self> {
        let path = personacast_core::paths::avatar_index_file()
            .map_err(|e| DeliveryError::Config(e.to_string()))?;
        Ok(Self::new(path))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn load(&self) -> Result<HashMap<String, AvatarCacheEntry>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<IndexDocument>(&content) {
            Ok(doc) => {
                debug!("Loaded {} avatar index entries from {}", doc.entries.len(), self.path.display());
                Ok(doc.entries)
            }
            Err(e) => {
                // Every entry can be re-fetched, so a damaged index starts over.
                warn!("Discarding unreadable avatar index {}: {}", self.path.display(), e);
                Ok(HashMap::new())
            }
        }
    }

    async fn persist(&self, entries: &HashMap<String, AvatarCacheEntry>) -> Result<()> {
        let doc = IndexDocument {
            entries: entries.clone(),
        };
        let content = serde_json::to_string_pretty(&doc)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    /// Run `f` against the loaded entries, persisting if it reports a change.
    async fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, AvatarCacheEntry>) -> (T, bool),
    ) -> Result<T> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let entries = guard
            .as_mut()
            .ok_or_else(|| DeliveryError::Index("index not loaded".to_string()))?;

        let (value, changed) = f(entries);
        if changed {
            self.persist(entries).await?;
        }
        Ok(value)
    }
}

#[async_trait]
impl AvatarIndex for FileAvatarIndex {
    async fn get(&self, persona_key: &str) -> Result<Option<AvatarCacheEntry>> {
        self.with_entries(|entries| (entries.get(persona_key).cloned(), false))
            .await
    }

    async fn put(&self, entry: AvatarCacheEntry) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(entry.persona_key.clone(), entry);
            ((), true)
        })
        .await
    }

    async fn remove(&self, persona_key: &str) -> Result<Option<AvatarCacheEntry>> {
        self.with_entries(|entries| {
            let removed = entries.remove(persona_key);
            let changed = removed.is_some();
            (removed, changed)
        })
        .await
    }

    async fn list(&self) -> Result<Vec<AvatarCacheEntry>> {
        self.with_entries(|entries| (entries.values().cloned().collect(), false))
            .await
    }

    async fn clear(&self) -> Result<()> {
        self.with_entries(|entries| {
            let changed = !entries.is_empty();
            entries.clear();
            ((), changed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, checksum: &str) -> AvatarCacheEntry {
        AvatarCacheEntry {
            persona_key: key.to_string(),
            original_url: format!("https://cdn.test/{}.png", key),
            local_filename: format!("{}.png", key),
            checksum: checksum.to_string(),
            downloaded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_index_crud() {
        let index = MemoryAvatarIndex::new();
        assert!(index.get("aria").await.unwrap().is_none());

        index.put(entry("aria", "a1")).await.unwrap();
        index.put(entry("aria", "a2")).await.unwrap();
        assert_eq!(index.get("aria").await.unwrap().unwrap().checksum, "a2");
        assert_eq!(index.list().await.unwrap().len(), 1);

        assert!(index.remove("aria").await.unwrap().is_some());
        assert!(index.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("avatar-index.json");

        let index = FileAvatarIndex::new(&path);
        index.put(entry("aria", "a1")).await.unwrap();
        index.put(entry("bex", "b1")).await.unwrap();
        index.remove("bex").await.unwrap();

        let reopened = FileAvatarIndex::new(&path);
        let aria = reopened.get("aria").await.unwrap().unwrap();
        assert_eq!(aria.checksum, "a1");
        assert!(reopened.get("bex").await.unwrap().is_none());
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_file_index_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = FileAvatarIndex::new(dir.path().join("none.json"));
        assert!(index.list().await.unwrap().is_empty());
        assert!(!dir.path().join("none.json").exists());
    }

    #[tokio::test]
    async fn test_file_index_discards_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("avatar-index.json");
        std::fs::write(&path, "{ not json").unwrap();

        let index = FileAvatarIndex::new(&path);
        assert!(index.list().await.unwrap().is_empty());

        index.put(entry("aria", "a1")).await.unwrap();
        let reopened = FileAvatarIndex::new(&path);
        assert_eq!(reopened.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_index_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("avatar-index.json");
        let index = FileAvatarIndex::new(&path);
        index.put(entry("aria", "a1")).await.unwrap();
        index.clear().await.unwrap();

        assert!(FileAvatarIndex::new(&path).list().await.unwrap().is_empty());
    }
}
