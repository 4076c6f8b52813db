//! Client side of the external proof-completion service.
//!
//! # Architecture
//!
//! - [`ProofOracle`] - the seam the pipeline calls through; one request per cache miss
//! - [`ChatCompletionsOracle`] - OpenAI-compatible chat-completions client (Fireworks by default)
//! - [`MockOracle`] / [`UnavailableOracle`] - offline stand-ins for tests and degraded-mode rehearsal
//!
//! # Error Handling
//!
//! Every failure mode (transport, non-2xx status, malformed body, timeout,
//! broken stream) is an [`OracleError`]. Callers never abort on one: they
//! substitute [`fallback_artifact`], which is tagged as degraded so reports can
//! tell it apart from a real proof.
//!
//! # Streaming
//!
//! [`ProofOracle::complete_streaming`] reports [`OracleProgress`] on an `mpsc`
//! channel while the completion arrives. The final artifact contract is the
//! same as [`ProofOracle::complete`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use proofstack_types::ProofArtifact;
use thiserror::Error;
use tokio::sync::mpsc;

mod chat;
mod mock;
pub mod retry;
mod sse;
mod wire;

pub use chat::{
    ChatCompletionsOracle, DEFAULT_MAX_TOKENS, DEFAULT_ORACLE_MODEL, DEFAULT_ORACLE_URL,
    DEFAULT_STREAM_IDLE_TIMEOUT, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT,
    OracleSettings,
};
pub use mock::{MockOracle, UnavailableOracle};
pub use retry::RetryConfig;

pub type OracleFut<'a> = Pin<Box<dyn Future<Output = Result<ProofArtifact, OracleError>> + Send + 'a>>;

/// Incremental progress from a streaming completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleProgress {
    Started,
    Delta(String),
    Finished,
}

/// The oracle could not produce a proof.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),
    #[error("oracle did not answer within {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("oracle stream interrupted: {0}")]
    StreamInterrupted(String),
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// External proof-completion service.
///
/// Implementations must be safe to share across concurrent pipeline runs.
pub trait ProofOracle: Send + Sync {
    /// Short identifier for logs and manifests.
    fn name(&self) -> &'static str;

    /// Request a proof for `canonical`. Exactly one logical request per call.
    fn complete<'a>(&'a self, canonical: &'a str) -> OracleFut<'a>;

    /// Like [`complete`](Self::complete), reporting progress while it runs.
    ///
    /// The default sends `Started`, awaits `complete`, then `Finished` on success.
    fn complete_streaming<'a>(
        &'a self,
        canonical: &'a str,
        progress: mpsc::Sender<OracleProgress>,
    ) -> OracleFut<'a> {
        Box::pin(async move {
            let _ = progress.send(OracleProgress::Started).await;
            let result = self.complete(canonical).await;
            if result.is_ok() {
                let _ = progress.send(OracleProgress::Finished).await;
            }
            result
        })
    }
}

/// Placeholder artifact substituted for a failed oracle call.
pub fn fallback_artifact(oracle: &str, error: &OracleError) -> ProofArtifact {
    tracing::warn!(oracle, %error, "Proof oracle unavailable; substituting placeholder proof");
    ProofArtifact::degraded(error.to_string())
}
