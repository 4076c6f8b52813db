//! Core domain types for proofstack.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the pipeline: the cache, the oracle
//! client, and the orchestrator all agree on these definitions.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod artifact;
mod digest;
mod spec;

pub use artifact::{ArtifactOrigin, PLACEHOLDER_PROOF, ProofArtifact};
pub use digest::{
    CacheKey, DIGEST_HEX_LEN, Digest, DigestParseError, fingerprint, fingerprint_bytes, hex_encode,
};
pub use spec::{Algorithm, AlgorithmParseError, SafetySpecification};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Toolchain Version
// ============================================================================

/// Version tag of the formal verification toolchain a proof was produced against.
///
/// Participates in the cache key: a proof obtained for one toolchain must never
/// be served for another. The unpinned default is [`ToolchainVersion::UNPINNED`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToolchainVersion(String);

#[derive(Debug, Error)]
#[error("toolchain version must not be empty")]
pub struct EmptyToolchainVersion;

impl ToolchainVersion {
    /// Tag used when the caller does not pin a toolchain.
    pub const UNPINNED: &'static str = "latest";

    pub fn new(value: impl Into<String>) -> Result<Self, EmptyToolchainVersion> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(EmptyToolchainVersion);
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn latest() -> Self {
        Self(Self::UNPINNED.to_string())
    }

    /// Whether this version is an explicit pin rather than the floating default.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.0 != Self::UNPINNED
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ToolchainVersion {
    fn default() -> Self {
        Self::latest()
    }
}

impl TryFrom<String> for ToolchainVersion {
    type Error = EmptyToolchainVersion;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ToolchainVersion> for String {
    fn from(value: ToolchainVersion) -> Self {
        value.0
    }
}

impl std::fmt::Display for ToolchainVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// API Key
// ============================================================================

/// Credential for the proof oracle. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKey(<redacted>)")
    }
}

impl ApiKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}
