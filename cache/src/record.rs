//! On-disk record format and storage identifiers.

use chrono::{DateTime, SecondsFormat, Utc};
use proofstack_types::{ArtifactOrigin, CacheKey, Digest, ProofArtifact, hex_encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::{CacheEntry, CacheReadError};

/// Current record format version. Records with any other version are misses.
pub const RECORD_VERSION: u32 = 1;

const STORAGE_DOMAIN: &[u8] = b"proofstack.cache-key.v1";

/// Derive the storage identifier for a composite key.
///
/// SHA-256 over a domain tag followed by each key component prefixed with its
/// byte length. Length prefixes make the encoding injective: no choice of
/// characters inside an algorithm or toolchain tag can make two different keys
/// share a record.
#[must_use]
pub fn storage_id(key: &CacheKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(STORAGE_DOMAIN);
    for part in [
        key.digest().as_str(),
        key.algorithm(),
        key.toolchain_version(),
    ] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hex_encode(&hasher.finalize())
}

/// Persisted form of a [`CacheEntry`].
///
/// The full key is stored alongside the proof so a read can confirm it is
/// looking at the record it asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CacheRecord {
    pub version: u32,
    pub digest: Digest,
    pub algorithm: String,
    pub toolchain_version: String,
    pub proof: String,
    pub origin: ArtifactOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    /// RFC3339, second precision.
    pub created_at: String,
}

impl CacheRecord {
    pub fn new(key: &CacheKey, artifact: &ProofArtifact, now: DateTime<Utc>) -> Self {
        Self {
            version: RECORD_VERSION,
            digest: key.digest().clone(),
            algorithm: key.algorithm().to_string(),
            toolchain_version: key.toolchain_version().to_string(),
            proof: artifact.proof().to_string(),
            origin: artifact.origin(),
            degraded_reason: artifact.degraded_reason().map(str::to_string),
            created_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Validate against the requested key and convert.
    pub fn into_entry(self, requested: &CacheKey) -> Result<CacheEntry, CacheReadError> {
        if self.version != RECORD_VERSION {
            return Err(CacheReadError::VersionMismatch {
                found: self.version,
            });
        }

        let stored = CacheKey::new(self.digest, self.algorithm, self.toolchain_version);
        if &stored != requested {
            return Err(CacheReadError::KeyMismatch {
                stored: stored.to_string(),
            });
        }

        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|_| CacheReadError::BadTimestamp(self.created_at.clone()))?
            .with_timezone(&Utc);

        let artifact = match self.origin {
            ArtifactOrigin::Oracle => ProofArtifact::Proven { proof: self.proof },
            ArtifactOrigin::Degraded => ProofArtifact::Degraded {
                proof: self.proof,
                reason: self.degraded_reason.unwrap_or_default(),
            },
        };

        Ok(CacheEntry {
            key: stored,
            artifact,
            created_at,
        })
    }
}
