//! Proof artifacts returned by the oracle or substituted in degraded mode.

use serde::{Deserialize, Serialize};

/// Proof text substituted when the oracle cannot be reached.
pub const PLACEHOLDER_PROOF: &str = "simp [h_guard]";

/// Where an artifact's proof text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrigin {
    /// Returned by the proof oracle.
    Oracle,
    /// Placeholder substituted after an oracle failure.
    Degraded,
}

impl ArtifactOrigin {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Oracle => "oracle",
            Self::Degraded => "degraded",
        }
    }
}

/// Opaque proof text, tagged with its provenance.
///
/// The proof text is never parsed. The tag lets compliance reporting flag a run
/// whose "proof" is really the degraded-mode placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum ProofArtifact {
    #[serde(rename = "oracle")]
    Proven { proof: String },
    Degraded { proof: String, reason: String },
}

impl ProofArtifact {
    #[must_use]
    pub fn proven(proof: impl Into<String>) -> Self {
        Self::Proven {
            proof: proof.into(),
        }
    }

    /// Placeholder artifact recording why the oracle could not be used.
    #[must_use]
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self::Degraded {
            proof: PLACEHOLDER_PROOF.to_string(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn proof(&self) -> &str {
        match self {
            Self::Proven { proof } | Self::Degraded { proof, .. } => proof,
        }
    }

    #[must_use]
    pub const fn origin(&self) -> ArtifactOrigin {
        match self {
            Self::Proven { .. } => ArtifactOrigin::Oracle,
            Self::Degraded { .. } => ArtifactOrigin::Degraded,
        }
    }

    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    #[must_use]
    pub fn degraded_reason(&self) -> Option<&str> {
        match self {
            Self::Proven { .. } => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_artifact_carries_placeholder_and_reason() {
        let artifact = ProofArtifact::degraded("connection refused");
        assert_eq!(artifact.proof(), PLACEHOLDER_PROOF);
        assert_eq!(artifact.origin(), ArtifactOrigin::Degraded);
        assert_eq!(artifact.degraded_reason(), Some("connection refused"));
    }

    #[test]
    fn serialized_tag_distinguishes_origins() {
        let proven = serde_json::to_value(ProofArtifact::proven("linarith")).unwrap();
        assert_eq!(proven["origin"], "oracle");
        assert_eq!(proven["proof"], "linarith");

        let degraded = serde_json::to_value(ProofArtifact::degraded("timeout")).unwrap();
        assert_eq!(degraded["origin"], "degraded");
        assert_eq!(degraded["reason"], "timeout");
    }
}
