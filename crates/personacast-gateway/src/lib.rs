//! HTTP gateway for Personacast.
//!
//! This crate provides:
//! - Cached avatar files at `/avatars/{file}`
//! - Persona deliveries over `POST /deliver`
//! - Health and error statistics endpoints

pub mod error;
pub mod server;

pub use error::GatewayError;
pub use server::{DeliverRequest, Gateway, GatewayConfig, GatewayState, PersonaRef};

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
