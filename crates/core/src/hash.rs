//! Content hashing and the composite tile payload hash.
//!
//! Determinism is the load-bearing property here: identical bytes must
//! always hash identically so the blob store can act as a lock-free
//! content-addressed cache once a hash is known.

use crate::coord::TileCoord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters used for short hashes (blob keys, ETags).
pub const SHORT_HEX_LEN: usize = 16;

/// A SHA-256 content hash over raw tile bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Compute the hash of a byte slice.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encode as lowercase hex.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// The short hex prefix used as a blob key suffix and ETag source.
    pub fn short_hex(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(SHORT_HEX_LEN);
        hex
    }

    /// Parse from a full hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != 64 {
            return Err(crate::Error::InvalidHash(format!(
                "expected 64 hex chars, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex_str =
                std::str::from_utf8(chunk).map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
            bytes[i] = u8::from_str_radix(hex_str, 16)
                .map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..SHORT_HEX_LEN])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Composite hash over everything that makes a stored tile what it is.
///
/// Changes whenever the algorithm version, content version, byte content,
/// or generation seed changes, which makes invalidation checks a cheap
/// string comparison instead of a byte comparison.
pub fn payload_hash(algo_version: u32, content_ver: i64, bytes_hash: &str, seed: &str) -> String {
    ContentHash::compute(format!("v{algo_version}:{content_ver}:{bytes_hash}:{seed}").as_bytes())
        .to_hex()
}

/// Deterministic 8-hex-char generation seed for a coordinate, style, and
/// prompt. The same request always reproduces the same seed.
pub fn generation_seed(coord: TileCoord, style: &str, prompt: &str) -> String {
    let mut hex = ContentHash::compute(
        format!("{}:{}:{}:{style}:{prompt}", coord.z, coord.x, coord.y).as_bytes(),
    )
    .to_hex();
    hex.truncate(8);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_deterministic() {
        let a = ContentHash::compute(b"tile bytes");
        let b = ContentHash::compute(b"tile bytes");
        assert_eq!(a, b);
        assert_ne!(a, ContentHash::compute(b"tile byteZ"));
    }

    #[test]
    fn test_short_hex_len() {
        let hash = ContentHash::compute(b"abc");
        assert_eq!(hash.short_hex().len(), SHORT_HEX_LEN);
        assert!(hash.to_hex().starts_with(&hash.short_hex()));
    }

    #[test]
    fn test_hex_roundtrip() {
        let hash = ContentHash::compute(b"roundtrip");
        let parsed = ContentHash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn test_payload_hash_changes_on_any_input() {
        let base = payload_hash(1, 1, "aabb", "feed");
        assert_eq!(base, payload_hash(1, 1, "aabb", "feed"));
        assert_ne!(base, payload_hash(2, 1, "aabb", "feed"));
        assert_ne!(base, payload_hash(1, 2, "aabb", "feed"));
        assert_ne!(base, payload_hash(1, 1, "aabc", "feed"));
        assert_ne!(base, payload_hash(1, 1, "aabb", "dead"));
    }

    #[test]
    fn test_generation_seed_stable() {
        let coord = TileCoord::new(2, 3, 3);
        let seed = generation_seed(coord, "cubist-earthy-v1", "p");
        assert_eq!(seed.len(), 8);
        assert_eq!(seed, generation_seed(coord, "cubist-earthy-v1", "p"));
        assert_ne!(seed, generation_seed(coord, "cubist-earthy-v1", "q"));
    }
}
