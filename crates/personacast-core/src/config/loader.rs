//! Configuration loading and persistence.

use super::Config;
use crate::error::ConfigError;
use crate::paths;
use crate::types::Persona;
use std::fs;
use std::path::{Path, PathBuf};

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Load configuration from the default path, falling back to defaults if no file exists.
    pub fn load_or_default() -> Self {
        match Self::load_default() {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => Self::default(),
            Err(e) => {
                tracing::warn!("Ignoring unreadable config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default path.
    pub fn save_default(&self) -> Result<(), ConfigError> {
        let path = paths::config_file()?;
        self.save(&path)
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 doesn't have a serializer, so we use serde_json with pretty print
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        // 1. Delivery limits
        if self.delivery.max_message_length == 0 {
            errors.push("Delivery max_message_length must be greater than 0".to_string());
        }
        if self.delivery.dedup_window_ms == 0 {
            errors.push("Delivery dedup_window_ms must be greater than 0".to_string());
        }
        if self.delivery.signature_prefix_chars == 0 {
            errors.push("Delivery signature_prefix_chars must be greater than 0".to_string());
        }
        if self.delivery.must_not_display_sentinel.is_empty() {
            errors.push("Delivery must_not_display_sentinel must not be empty".to_string());
        }

        // 2. Avatar URLs must parse
        for (name, value) in [
            ("public_base_url", &self.avatar.public_base_url),
            ("fallback_url", &self.avatar.fallback_url),
        ] {
            if url::Url::parse(value).is_err() {
                errors.push(format!("Avatar {} is not a valid URL: '{}'", name, value));
            }
        }
        if self.avatar.max_bytes == 0 {
            errors.push("Avatar max_bytes must be greater than 0".to_string());
        }
        if self.avatar.timeout_ms == 0 {
            errors.push("Avatar timeout_ms must be greater than 0".to_string());
        }

        // 3. Tracking window and threshold
        if self.tracking.window_secs == 0 {
            errors.push("Tracking window_secs must be greater than 0".to_string());
        }
        if self.tracking.escalation_threshold == 0 {
            errors.push("Tracking escalation_threshold must be at least 1".to_string());
        }

        // 4. Platform API
        if url::Url::parse(&self.platform.api_base_url).is_err() {
            errors.push(format!(
                "Platform api_base_url is not a valid URL: '{}'",
                self.platform.api_base_url
            ));
        }
        if self.platform.webhook_name.trim().is_empty() {
            errors.push("Platform webhook_name must not be empty".to_string());
        }

        // 5. Gateway port
        if self.gateway.port == 0 {
            errors.push("Gateway port cannot be 0".to_string());
        }

        // 6. Persona keys
        for key in self.personas.keys() {
            if key.trim().is_empty() {
                errors.push("Persona keys must not be empty".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }

    /// Resolve the avatar cache directory.
    pub fn avatar_cache_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.avatar.cache_dir {
            Some(dir) => Ok(paths::expand_tilde(&dir.to_string_lossy())),
            None => paths::avatars_dir(),
        }
    }

    /// Build a persona from the static persona table.
    pub fn persona(&self, key: &str) -> Option<Persona> {
        self.personas.get(key).map(|entry| Persona {
            full_name: key.to_string(),
            display_name: entry.display_name.clone().unwrap_or_else(|| key.to_string()),
            avatar_url: entry.avatar_url.clone(),
        })
    }
}
