//! Offline oracles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use proofstack_types::{PLACEHOLDER_PROOF, ProofArtifact};

use crate::{OracleError, OracleFut, ProofOracle};

/// Returns a fixed proof without any network access. Counts calls.
#[derive(Debug)]
pub struct MockOracle {
    proof: String,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockOracle {
    #[must_use]
    pub fn new() -> Self {
        Self::with_proof(PLACEHOLDER_PROOF)
    }

    #[must_use]
    pub fn with_proof(proof: impl Into<String>) -> Self {
        Self {
            proof: proof.into(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep this long before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `complete` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl ProofOracle for MockOracle {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn complete<'a>(&'a self, _canonical: &'a str) -> OracleFut<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(ProofArtifact::proven(self.proof.clone()))
        })
    }
}

/// Fails every call. Counts calls.
#[derive(Debug)]
pub struct UnavailableOracle {
    reason: String,
    calls: AtomicUsize,
}

impl UnavailableOracle {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProofOracle for UnavailableOracle {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn complete<'a>(&'a self, _canonical: &'a str) -> OracleFut<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reason = self.reason.clone();
        Box::pin(async move { Err(OracleError::Unavailable(reason)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_counts_calls_and_returns_proven() {
        let oracle = MockOracle::new();
        assert_eq!(oracle.calls(), 0);
        let artifact = oracle.complete("x").await.unwrap();
        assert!(!artifact.is_degraded());
        assert_eq!(artifact.proof(), PLACEHOLDER_PROOF);
        oracle.complete("y").await.unwrap();
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test]
    async fn unavailable_always_fails() {
        let oracle = UnavailableOracle::new("no network");
        let err = oracle.complete("x").await.unwrap_err();
        assert!(matches!(err, OracleError::Unavailable(ref r) if r == "no network"));
        assert_eq!(oracle.calls(), 1);
    }
}
