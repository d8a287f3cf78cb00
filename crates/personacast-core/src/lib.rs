//! # personacast-core
//!
//! Core types, configuration, and utilities for Personacast.
//!
//! This crate provides functionality shared by every Personacast crate:
//!
//! - **Configuration**: Loading, validation, and persistence of the config file
//! - **Types**: Personas, channel references, and embeds
//! - **Utilities**: Path resolution, ID generation, and content hashing

pub mod config;
pub mod types;
pub mod error;
pub mod paths;
pub mod id;

// Re-exports for convenience
pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
