//! Content hashing helpers shared by the placement compiler and the
//! constitution-injection feature.

use sha2::{Digest, Sha256};

/// First 12 hex characters of SHA-256 over `content`, used for build-ID
/// trailers on compiled `AGENTS.md` files and for the constitution hash.
pub fn short_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

/// Full SHA-256 hex digest, used for installed-file checksums.
pub fn full_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hash_is_twelve_hex_chars() {
        let h = short_hash("hello world");
        assert_eq!(h.len(), 12);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn short_hash_is_deterministic() {
        assert_eq!(short_hash("same input"), short_hash("same input"));
        assert_ne!(short_hash("a"), short_hash("b"));
    }
}
