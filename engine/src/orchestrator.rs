//! The pipeline state machine.
//!
//! ```text
//! Serializing -> CacheLookup -> Hit  -----------------------------> ArtifactGeneration -> Bundling -> Done
//!                            \-> Miss -> OracleCall -> CacheStore -/
//! ```
//!
//! With cache reuse disabled the lookup is skipped and the run goes straight
//! from `Serializing` to `OracleCall`; the result is still stored.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{AbortHandle, Abortable};
use proofstack_cache::ProofCache;
use proofstack_oracle::{
    DEFAULT_TIMEOUT, OracleError, OracleProgress, ProofOracle, fallback_artifact,
};
use proofstack_types::{Algorithm, Digest, ProofArtifact, SafetySpecification, ToolchainVersion};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::attestation::{AttestationBundler, BundleHandle, BundleInput};
use crate::canonical::{CanonicalText, SpecRenderer, canonicalize};
use crate::error::PipelineError;
use crate::guard::{GuardGenerator, GuardInput};
use crate::lean::LeanRenderer;
use crate::state::{CacheOutcome, Stage, StageTrace};

const ORACLE_PROGRESS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Upper bound on the oracle stage; exceeding it degrades the run.
    pub oracle_timeout: Duration,
    /// Use the oracle's streaming variant and forward its progress.
    pub streaming: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            oracle_timeout: DEFAULT_TIMEOUT,
            streaming: false,
        }
    }
}

/// Observability events emitted while a run progresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    StageEntered(Stage),
    CacheResolved(CacheOutcome),
    Oracle(OracleProgress),
}

/// One pipeline invocation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub spec: SafetySpecification,
    /// Overrides `spec.algorithm` when set.
    pub algorithm: Option<Algorithm>,
    pub toolchain_version: ToolchainVersion,
    pub allow_cache_reuse: bool,
}

impl RunRequest {
    pub fn new(spec: SafetySpecification) -> Self {
        Self {
            spec,
            algorithm: None,
            toolchain_version: ToolchainVersion::latest(),
            allow_cache_reuse: true,
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn with_toolchain(mut self, toolchain: ToolchainVersion) -> Self {
        self.toolchain_version = toolchain;
        self
    }

    pub fn allow_cache_reuse(mut self, allow: bool) -> Self {
        self.allow_cache_reuse = allow;
        self
    }

    #[must_use]
    pub fn effective_algorithm(&self) -> Algorithm {
        self.algorithm.unwrap_or(self.spec.algorithm)
    }
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub bundle: BundleHandle,
    pub cache: CacheOutcome,
    pub artifact: ProofArtifact,
    pub digest: Digest,
    pub algorithm: Algorithm,
    pub toolchain: ToolchainVersion,
    pub stages: Vec<Stage>,
}

impl RunReport {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.artifact.is_degraded()
    }
}

/// Sequences canonicalization, cache, oracle and downstream generation.
///
/// Cheap to clone; clones share the cache directory and collaborators.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    cache: ProofCache,
    oracle: Arc<dyn ProofOracle>,
    renderer: Arc<dyn SpecRenderer>,
    guard: Arc<dyn GuardGenerator>,
    bundler: Arc<dyn AttestationBundler>,
    options: PipelineOptions,
    events: Option<mpsc::Sender<PipelineEvent>>,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("cache", &self.cache.dir())
            .field("oracle", &self.oracle.name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    pub fn new(
        cache: ProofCache,
        oracle: Arc<dyn ProofOracle>,
        guard: Arc<dyn GuardGenerator>,
        bundler: Arc<dyn AttestationBundler>,
    ) -> Self {
        Self {
            cache,
            oracle,
            renderer: Arc::new(LeanRenderer),
            guard,
            bundler,
            options: PipelineOptions::default(),
            events: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn SpecRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Send [`PipelineEvent`]s to `events`. A full channel applies backpressure
    /// to the run; a closed one is ignored.
    pub fn with_events(mut self, events: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn cache(&self) -> &ProofCache {
        &self.cache
    }

    #[must_use]
    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    /// Render `spec` exactly as a run would, without touching the cache.
    #[must_use]
    pub fn canonicalize(&self, spec: &SafetySpecification, algorithm: Algorithm) -> CanonicalText {
        canonicalize(self.renderer.as_ref(), spec, algorithm)
    }

    /// Execute one run to completion.
    ///
    /// Only guard generation and bundling can fail the run. Oracle failures
    /// degrade the artifact and cache failures are logged.
    pub async fn run(&self, request: &RunRequest) -> Result<RunReport, PipelineError> {
        let mut trace = StageTrace::new();
        self.emit(PipelineEvent::StageEntered(Stage::Serializing)).await;

        let algorithm = request.effective_algorithm();
        let canonical = self.canonicalize(&request.spec, algorithm);
        let key = canonical.cache_key(&request.toolchain_version);

        let cached = if request.allow_cache_reuse {
            self.enter(&mut trace, Stage::CacheLookup).await;
            // The cache logs rejected records itself.
            self.cache.get(&key)
        } else {
            None
        };

        let (artifact, outcome) = match cached {
            Some(artifact) => (artifact, CacheOutcome::Hit),
            None => {
                self.enter(&mut trace, Stage::OracleCall).await;
                let artifact = self.call_oracle(canonical.as_str()).await;

                self.enter(&mut trace, Stage::CacheStore).await;
                if let Err(error) = self.cache.put(&key, &artifact) {
                    warn!(key = %key, %error, "Failed to store proof; continuing without caching");
                }

                let outcome = if request.allow_cache_reuse {
                    CacheOutcome::Miss
                } else {
                    CacheOutcome::Bypassed
                };
                (artifact, outcome)
            }
        };

        info!(
            digest = %canonical.digest().short(12),
            algorithm = %algorithm,
            toolchain = %request.toolchain_version,
            cache = %outcome,
            origin = artifact.origin().as_str(),
            "Proof cache {outcome}"
        );
        if outcome == CacheOutcome::Hit
            && let Some(reason) = artifact.degraded_reason()
        {
            warn!(key = %key, reason, "Reusing a degraded proof from the cache");
        }
        self.emit(PipelineEvent::CacheResolved(outcome)).await;

        self.enter(&mut trace, Stage::ArtifactGeneration).await;
        let guard = self
            .guard
            .generate(&GuardInput {
                spec: &request.spec,
                digest: canonical.digest(),
                algorithm,
                artifact: &artifact,
            })
            .map_err(|source| PipelineError::StageFailed {
                stage: Stage::ArtifactGeneration,
                source,
            })?;

        self.enter(&mut trace, Stage::Bundling).await;
        let bundle = self
            .bundler
            .bundle(&BundleInput {
                spec: &request.spec,
                canonical: &canonical,
                toolchain: &request.toolchain_version,
                artifact: &artifact,
                cache: outcome,
                guard: &guard,
            })
            .map_err(|source| PipelineError::StageFailed {
                stage: Stage::Bundling,
                source,
            })?;

        self.enter(&mut trace, Stage::Done).await;
        Ok(RunReport {
            bundle,
            cache: outcome,
            artifact,
            digest: canonical.digest().clone(),
            algorithm,
            toolchain: request.toolchain_version.clone(),
            stages: trace.into_stages(),
        })
    }

    /// Like [`run`](Self::run), but cancellable through the returned handle.
    ///
    /// Aborting yields [`PipelineError::Cancelled`] at the next stage boundary.
    /// A cache entry stored before the abort is kept.
    pub fn run_abortable(
        &self,
        request: RunRequest,
    ) -> (
        AbortHandle,
        impl Future<Output = Result<RunReport, PipelineError>> + Send + 'static,
    ) {
        let (handle, registration) = AbortHandle::new_pair();
        let this = self.clone();
        let fut = async move {
            match Abortable::new(this.run(&request), registration).await {
                Ok(result) => result,
                Err(_aborted) => {
                    info!("Pipeline run cancelled");
                    Err(PipelineError::Cancelled)
                }
            }
        };
        (handle, fut)
    }

    async fn call_oracle(&self, canonical: &str) -> ProofArtifact {
        let name = self.oracle.name();
        let limit = self.options.oracle_timeout;

        let result = if self.options.streaming {
            let (tx, mut rx) = mpsc::channel(ORACLE_PROGRESS_CAPACITY);
            let call = tokio::time::timeout(limit, self.oracle.complete_streaming(canonical, tx));
            let forward = async {
                while let Some(progress) = rx.recv().await {
                    self.emit(PipelineEvent::Oracle(progress)).await;
                }
            };
            let (result, ()) = tokio::join!(call, forward);
            result
        } else {
            tokio::time::timeout(limit, self.oracle.complete(canonical)).await
        };

        match result {
            Ok(Ok(artifact)) => artifact,
            Ok(Err(error)) => fallback_artifact(name, &error),
            Err(_elapsed) => fallback_artifact(name, &OracleError::Timeout(limit)),
        }
    }

    async fn enter(&self, trace: &mut StageTrace, stage: Stage) {
        trace.enter(stage);
        self.emit(PipelineEvent::StageEntered(stage)).await;
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event).await;
        }
    }
}
