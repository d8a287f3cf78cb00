//! Config-backed persona directory.

use crate::traits::PersonaDirectory;
use crate::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use personacast_core::types::Persona;
use personacast_core::Config;
use std::collections::HashMap;

/// A persona directory held in memory.
///
/// Avatar write-backs replace the stored avatar URL.
#[derive(Debug, Default)]
pub struct StaticPersonaDirectory {
    personas: RwLock<HashMap<String, Persona>>,
}

impl StaticPersonaDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the `personas` section of a config.
    pub fn from_config(config: &Config) -> Self {
        let directory = Self::new();
        for key in config.personas.keys() {
            if let Some(persona) = config.persona(key) {
                directory.insert(persona);
            }
        }
        directory
    }

    /// Add or replace a persona.
    pub fn insert(&self, persona: Persona) {
        self.personas
            .write()
            .insert(persona.full_name.clone(), persona);
    }

    /// All personas, sorted by key.
    pub fn list(&self) -> Vec<Persona> {
        let mut personas: Vec<_> = self.personas.read().values().cloned().collect();
        personas.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        personas
    }

    /// Number of personas.
    pub fn len(&self) -> usize {
        self.personas.read().len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.personas.read().is_empty()
    }
}

#[async_trait]
impl PersonaDirectory for StaticPersonaDirectory {
    async fn get_persona(&self, key: &str) -> Option<Persona> {
        self.personas.read().get(key).cloned()
    }

    async fn set_avatar_url(&self, key: &str, avatar_url: &str) -> Result<()> {
        if let Some(persona) = self.personas.write().get_mut(key) {
            persona.avatar_url = Some(avatar_url.to_string());
        }
        Ok(())
    }
}
