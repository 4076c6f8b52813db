//! Proof pipeline for proofstack.
//!
//! A run turns a [`SafetySpecification`](proofstack_types::SafetySpecification)
//! into an attestation bundle:
//!
//! 1. **Serializing** - [`canonicalize`] renders the spec through a
//!    [`SpecRenderer`] (Lean 4 by default) and fingerprints the result.
//! 2. **CacheLookup** - the digest, algorithm and toolchain version form the
//!    cache key. A hit skips the oracle entirely.
//! 3. **OracleCall / CacheStore** - on a miss the oracle is called once under a
//!    timeout and its result, genuine or degraded, is stored.
//! 4. **ArtifactGeneration / Bundling** - a [`GuardGenerator`] and an
//!    [`AttestationBundler`] run exactly once, on either branch.
//!
//! Only the last two stages can fail a run. Everything upstream degrades.

mod attestation;
mod bootstrap;
mod canonical;
mod error;
mod guard;
mod lean;
mod orchestrator;
mod state;

pub use attestation::{
    AttestationBundler, BUNDLE_FORMAT_VERSION, BundleHandle, BundleInput, BundleManifest,
    DirectoryBundler, LEAN_FILE, MANIFEST_FILE, PROOF_FILE, SPEC_FILE, list_artifacts,
    read_manifest,
};
pub use bootstrap::{build_oracle, orchestrator_from_settings};
pub use canonical::{CANONICAL_FORMAT_VERSION, CanonicalText, SpecRenderer, canonicalize};
pub use error::{ArtifactError, PipelineError};
pub use guard::{
    CGuardGenerator, GUARD_FILE, GeneratedGuard, GuardGenerator, GuardInput, render_c_guard,
};
pub use lean::{LeanRenderer, insert_proof};
pub use orchestrator::{
    PipelineEvent, PipelineOptions, PipelineOrchestrator, RunReport, RunRequest,
};
pub use state::{CacheOutcome, Stage};
