//! Canonical specification text.
//!
//! The canonical text is what gets hashed into the cache key and what the
//! oracle is asked to complete, so it must be a pure function of the
//! specification and algorithm. It starts with a header binding the
//! canonical-format version and the algorithm tag; bumping
//! [`CANONICAL_FORMAT_VERSION`] whenever rendering changes invalidates every
//! previously cached proof.

use proofstack_types::{Algorithm, CacheKey, Digest, SafetySpecification, ToolchainVersion, fingerprint};

/// Version of the canonical rendering. Part of the hashed text.
pub const CANONICAL_FORMAT_VERSION: u32 = 1;

/// Renders a specification into formal-language source.
///
/// Implementations must be deterministic: equal inputs, byte-identical output.
pub trait SpecRenderer: Send + Sync {
    fn render(&self, spec: &SafetySpecification, algorithm: Algorithm) -> String;
}

/// Rendered, algorithm-tagged specification text with its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalText {
    text: String,
    algorithm: Algorithm,
    digest: Digest,
}

impl CanonicalText {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    #[must_use]
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Composite cache key for this text under `toolchain`.
    #[must_use]
    pub fn cache_key(&self, toolchain: &ToolchainVersion) -> CacheKey {
        CacheKey::new(
            self.digest.clone(),
            self.algorithm.as_str(),
            toolchain.as_str(),
        )
    }
}

/// Render `spec` for `algorithm` and fingerprint the result.
pub fn canonicalize(
    renderer: &dyn SpecRenderer,
    spec: &SafetySpecification,
    algorithm: Algorithm,
) -> CanonicalText {
    let mut text = format!(
        "-- proofstack canonical-format: {CANONICAL_FORMAT_VERSION}\n-- algorithm: {algorithm}\n\n"
    );
    text.push_str(&renderer.render(spec, algorithm));
    let digest = fingerprint(&text);
    CanonicalText {
        text,
        algorithm,
        digest,
    }
}
