//! Core types for Personacast.

mod persona;
mod channel;
mod embed;

pub use persona::*;
pub use channel::*;
pub use embed::*;
