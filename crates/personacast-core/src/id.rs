//! ID generation and content hashing utilities.

use sha2::{Digest, Sha256};

/// Generate a short random ID (8 hex characters).
pub fn short_id() -> String {
    let bytes: [u8; 4] = rand::random();
    hex::encode(bytes)
}

/// Generate a SHA256 hash of the input string.
pub fn sha256(input: &str) -> String {
    sha256_bytes(input.as_bytes())
}

/// Generate a SHA256 hash of raw bytes (used as a content checksum).
pub fn sha256_bytes(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// Generate a short hash (first 16 characters of SHA256).
pub fn short_hash(input: &str) -> String {
    sha256(input)[..16].to_string()
}

/// Hash several parts as one value.
///
/// Parts are length-prefixed so `("ab", "c")` and `("a", "bc")` differ.
pub fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Take at most `max_chars` characters from the start of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Normalize an identifier into a filesystem-safe slug.
///
/// - Converts to lowercase
/// - Replaces spaces and dashes with underscores
/// - Removes non-alphanumeric characters (except underscores)
pub fn normalize(id: &str) -> String {
    id.to_lowercase()
        .replace([' ', '-'], "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}
