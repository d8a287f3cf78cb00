//! Path resolution utilities.

use crate::error::ConfigError;
use std::path::PathBuf;

/// Get the Personacast base directory (~/.personacast).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine home directory".to_string())
    })?;
    Ok(home.join(".personacast"))
}

/// Get the main config file path (~/.personacast/personacast.json5).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("personacast.json5"))
}

/// Get the avatar cache directory (~/.personacast/avatars).
pub fn avatars_dir() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("avatars"))
}

/// Get the avatar index file path (~/.personacast/avatar-index.json).
///
/// Kept outside the avatar directory so every file in that directory is a
/// cached image.
pub fn avatar_index_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("avatar-index.json"))
}

/// Expand tilde (~) in a path.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
