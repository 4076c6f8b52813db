//! Wiring resolved settings into a ready orchestrator.

use std::sync::Arc;

use proofstack_cache::ProofCache;
use proofstack_config::{OracleMode, ResolvedSettings};
use proofstack_oracle::{
    ChatCompletionsOracle, MockOracle, OracleError, ProofOracle, UnavailableOracle,
};

use crate::attestation::DirectoryBundler;
use crate::guard::CGuardGenerator;
use crate::orchestrator::{PipelineOptions, PipelineOrchestrator};

pub fn build_oracle(mode: &OracleMode) -> Result<Arc<dyn ProofOracle>, OracleError> {
    Ok(match mode {
        OracleMode::Mock => Arc::new(MockOracle::new()),
        OracleMode::Http(settings) => Arc::new(ChatCompletionsOracle::new(settings.clone())?),
        OracleMode::Offline { reason } => {
            tracing::warn!(%reason, "No proof oracle configured; runs will be degraded");
            Arc::new(UnavailableOracle::new(reason.clone()))
        }
    })
}

/// Orchestrator with the default Lean renderer, C guard and directory bundler.
///
/// An unusable cache directory is not an error here; runs proceed uncached.
pub fn orchestrator_from_settings(
    settings: &ResolvedSettings,
) -> Result<PipelineOrchestrator, OracleError> {
    let cache = ProofCache::open(&settings.cache);
    let oracle = build_oracle(&settings.oracle)?;
    Ok(PipelineOrchestrator::new(
        cache,
        oracle,
        Arc::new(CGuardGenerator::new(&settings.guard_dir)),
        Arc::new(DirectoryBundler::new(&settings.output_dir)),
    )
    .with_options(PipelineOptions {
        oracle_timeout: settings.oracle_timeout,
        streaming: settings.streaming,
    }))
}
