//! Persona identity types.

use serde::{Deserialize, Serialize};

/// An AI character identity that messages are sent "as".
///
/// `full_name` is the stable identity key and must be unique across the
/// directory. `avatar_url` is the remote source of truth for the avatar
/// image; the delivery engine serves a locally cached copy of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// Stable identity key.
    pub full_name: String,

    /// Name shown on delivered messages.
    pub display_name: String,

    /// Remote avatar source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Persona {
    /// Create a persona whose display name equals its full name.
    pub fn new(full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        Self {
            display_name: full_name.clone(),
            full_name,
            avatar_url: None,
        }
    }

    /// Set the display name.
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Set the remote avatar URL.
    pub fn with_avatar_url(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    /// Identity key used by caches and in-flight tracking.
    pub fn key(&self) -> &str {
        &self.full_name
    }

    /// The avatar source, ignoring blank values.
    pub fn avatar_source(&self) -> Option<&str> {
        self.avatar_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persona_builder() {
        let persona = Persona::new("Aria")
            .with_display_name("Aria ✦")
            .with_avatar_url("https://cdn.example.com/aria.png");

        assert_eq!(persona.key(), "Aria");
        assert_eq!(persona.display_name, "Aria ✦");
        assert_eq!(persona.avatar_source(), Some("https://cdn.example.com/aria.png"));
    }

    #[test]
    fn test_blank_avatar_is_no_source() {
        let persona = Persona::new("Aria").with_avatar_url("   ");
        assert_eq!(persona.avatar_source(), None);
        assert_eq!(Persona::new("Aria").avatar_source(), None);
    }

    #[test]
    fn test_persona_serde_skips_missing_avatar() {
        let json = serde_json::to_value(Persona::new("Aria")).unwrap();
        assert!(json.get("avatar_url").is_none());

        let parsed: Persona =
            serde_json::from_str(r#"{"full_name":"Aria","display_name":"A"}"#).unwrap();
        assert!(parsed.avatar_url.is_none());
    }
}
