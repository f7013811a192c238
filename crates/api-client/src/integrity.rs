use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded SHA-256 digest of a piece of algorithm source.
///
/// The server hashes every submission the same way, so comparing its answer
/// with `ContentHash::of` on the local copy proves the code arrived intact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wraps a digest received from the server. Hex case is normalised.
    pub fn new(hex_digest: impl AsRef<str>) -> Self {
        Self(hex_digest.as_ref().trim().to_ascii_lowercase())
    }

    /// Computes the digest of `source` (UTF-8 bytes).
    pub fn of(source: &str) -> Self {
        let digest = Sha256::digest(source.as_bytes());
        Self(hex::encode(digest))
    }

    pub fn matches(&self, other: &ContentHash) -> bool {
        self.0 == other.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
