//! End-to-end pipeline scenarios with offline oracles.

use std::sync::Arc;

use proofstack_engine::{
    CacheOutcome, GUARD_FILE, LEAN_FILE, MANIFEST_FILE, PROOF_FILE, RunRequest, SPEC_FILE, Stage,
    list_artifacts, read_manifest,
};
use proofstack_oracle::{MockOracle, UnavailableOracle};
use proofstack_types::{ArtifactOrigin, PLACEHOLDER_PROOF, ToolchainVersion};

use crate::common::{Workspace, cartpole_spec};

#[tokio::test]
async fn failing_oracle_still_produces_complete_bundle() {
    let ws = Workspace::new();
    let oracle = Arc::new(UnavailableOracle::new("service unreachable"));
    let pipeline = ws.pipeline(oracle.clone());

    let report = pipeline
        .run(&RunRequest::new(cartpole_spec("2.4")))
        .await
        .unwrap();

    assert_eq!(report.stages.last(), Some(&Stage::Done));
    assert!(report.is_degraded());
    assert_eq!(report.artifact.proof(), PLACEHOLDER_PROOF);

    let files = list_artifacts(&report.bundle.path).unwrap();
    for name in [GUARD_FILE, LEAN_FILE, MANIFEST_FILE, PROOF_FILE, SPEC_FILE] {
        assert!(files.contains_key(name), "missing {name}");
    }

    let manifest = read_manifest(&report.bundle.path).unwrap();
    assert!(manifest.degraded);
    assert_eq!(manifest.origin, ArtifactOrigin::Degraded);
    assert_eq!(
        manifest.degraded_reason.as_deref(),
        Some("oracle unavailable: service unreachable")
    );

    let proof = std::fs::read_to_string(report.bundle.path.join(PROOF_FILE)).unwrap();
    assert_eq!(proof, PLACEHOLDER_PROOF);
    assert_eq!(oracle.calls(), 1);
}

#[tokio::test]
async fn identical_second_run_is_a_hit_with_zero_oracle_calls() {
    let ws = Workspace::new();
    let oracle = Arc::new(MockOracle::with_proof("nlinarith [h_guard]"));
    let pipeline = ws.pipeline(oracle.clone());
    let request = RunRequest::new(cartpole_spec("2.4"))
        .with_toolchain(ToolchainVersion::new("v4.9.0").unwrap());

    let first = pipeline.run(&request).await.unwrap();
    assert_eq!(first.cache, CacheOutcome::Miss);
    assert_eq!(oracle.calls(), 1);

    let second = pipeline.run(&request).await.unwrap();
    assert_eq!(second.cache, CacheOutcome::Hit);
    assert_eq!(oracle.calls(), 1);
    assert_eq!(second.digest, first.digest);
    assert_eq!(second.artifact, first.artifact);

    let lean = std::fs::read_to_string(second.bundle.path.join(LEAN_FILE)).unwrap();
    assert!(lean.contains("  nlinarith [h_guard]\n"));
    assert_eq!(read_manifest(&second.bundle.path).unwrap().cache, CacheOutcome::Hit);
}

#[tokio::test]
async fn hit_survives_a_new_orchestrator_instance() {
    let ws = Workspace::new();
    let first_oracle = Arc::new(MockOracle::new());
    ws.pipeline(first_oracle.clone())
        .run(&RunRequest::new(cartpole_spec("2.4")))
        .await
        .unwrap();

    let second_oracle = Arc::new(MockOracle::new());
    let report = ws
        .pipeline(second_oracle.clone())
        .run(&RunRequest::new(cartpole_spec("2.4")))
        .await
        .unwrap();

    assert_eq!(report.cache, CacheOutcome::Hit);
    assert_eq!(first_oracle.calls(), 1);
    assert_eq!(second_oracle.calls(), 0);
}

#[tokio::test]
async fn mutated_bound_is_never_served_from_cache() {
    let ws = Workspace::new();
    let oracle = Arc::new(MockOracle::new());
    let pipeline = ws.pipeline(oracle.clone());

    let safe = pipeline
        .run(&RunRequest::new(cartpole_spec("2.4")))
        .await
        .unwrap();
    let loosened = pipeline
        .run(&RunRequest::new(cartpole_spec("2.5")))
        .await
        .unwrap();

    assert_ne!(safe.digest, loosened.digest);
    assert_eq!(loosened.cache, CacheOutcome::Miss);
    assert_eq!(oracle.calls(), 2);
}

#[tokio::test]
async fn disabling_reuse_still_feeds_future_runs() {
    let ws = Workspace::new();
    let oracle = Arc::new(MockOracle::new());
    let pipeline = ws.pipeline(oracle.clone());
    let request = RunRequest::new(cartpole_spec("2.4"));

    let bypassed = pipeline
        .run(&request.clone().allow_cache_reuse(false))
        .await
        .unwrap();
    assert_eq!(bypassed.cache, CacheOutcome::Bypassed);
    assert!(!bypassed.stages.contains(&Stage::CacheLookup));

    let reused = pipeline.run(&request).await.unwrap();
    assert_eq!(reused.cache, CacheOutcome::Hit);
    assert_eq!(oracle.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_on_one_key_both_complete() {
    let ws = Workspace::new();
    let oracle = Arc::new(MockOracle::new());
    let left = ws.pipeline_named(oracle.clone(), "left");
    let right = ws.pipeline_named(oracle.clone(), "right");
    let request = RunRequest::new(cartpole_spec("2.4"));

    let (_, left_run) = left.run_abortable(request.clone());
    let (_, right_run) = right.run_abortable(request.clone());
    let (a, b) = tokio::join!(tokio::spawn(left_run), tokio::spawn(right_run));
    let (a, b) = (a.unwrap().unwrap(), b.unwrap().unwrap());

    assert_eq!(a.digest, b.digest);
    assert!(oracle.calls() >= 1 && oracle.calls() <= 2);
    assert_eq!(ws.cache().len().unwrap(), 1);
    assert!(ws.cache().get(&request_key(&left, &request)).is_some());
}

fn request_key(
    pipeline: &proofstack_engine::PipelineOrchestrator,
    request: &RunRequest,
) -> proofstack_types::CacheKey {
    pipeline
        .canonicalize(&request.spec, request.effective_algorithm())
        .cache_key(&request.toolchain_version)
}
