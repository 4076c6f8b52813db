//! Content fingerprints and composite cache keys.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use thiserror::Error;

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Lowercase hex SHA-256 digest of some content.
///
/// Always exactly [`DIGEST_HEX_LEN`] characters. Construct via [`fingerprint`] or
/// [`Digest::parse`]; there is no way to build one from arbitrary text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DigestParseError {
    #[error("digest must be {DIGEST_HEX_LEN} hex characters, got {0}")]
    Length(usize),
    #[error("digest contains non-hex character {0:?}")]
    NotHex(char),
}

impl Digest {
    /// Parse a hex digest. Uppercase input is normalized to lowercase.
    pub fn parse(value: &str) -> Result<Self, DigestParseError> {
        let value = value.trim();
        if value.len() != DIGEST_HEX_LEN {
            return Err(DigestParseError::Length(value.chars().count()));
        }
        if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(DigestParseError::NotHex(bad));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `n` hex characters, for log lines and shard directories.
    #[must_use]
    pub fn short(&self, n: usize) -> &str {
        &self.0[..n.min(DIGEST_HEX_LEN)]
    }
}

impl TryFrom<String> for Digest {
    type Error = DigestParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(value: Digest) -> Self {
        value.0
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 over the UTF-8 bytes of `text`.
///
/// Any byte-level change, including a single numeric literal, yields a different
/// digest. The empty string is a valid input.
#[must_use]
pub fn fingerprint(text: &str) -> Digest {
    fingerprint_bytes(text.as_bytes())
}

#[must_use]
pub fn fingerprint_bytes(bytes: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Digest(hex_encode(&hasher.finalize()))
}

/// Hex encoding helper.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ============================================================================
// Cache Key
// ============================================================================

/// Composite key identifying one cached proof.
///
/// Two keys are equal only when digest, algorithm and toolchain version are all
/// equal. The algorithm is kept as a plain string so the cache stays usable for
/// algorithm tags outside [`crate::Algorithm`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    digest: Digest,
    algorithm: String,
    toolchain_version: String,
}

impl CacheKey {
    #[must_use]
    pub fn new(
        digest: Digest,
        algorithm: impl Into<String>,
        toolchain_version: impl Into<String>,
    ) -> Self {
        Self {
            digest,
            algorithm: algorithm.into(),
            toolchain_version: toolchain_version.into(),
        }
    }

    #[must_use]
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    #[must_use]
    pub fn toolchain_version(&self) -> &str {
        &self.toolchain_version
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.digest.short(12),
            self.algorithm,
            self.toolchain_version
        )
    }
}
