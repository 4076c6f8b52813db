//! Pipeline runs against a mocked chat-completions endpoint.

use std::sync::Arc;
use std::time::Duration;

use proofstack_engine::{CacheOutcome, PipelineEvent, PipelineOptions, RunRequest};
use proofstack_oracle::{ChatCompletionsOracle, OracleProgress};
use proofstack_types::ArtifactOrigin;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{
    COMPLETIONS_PATH, Workspace, cartpole_spec, mount_completion, mount_status,
    mount_streaming_completion, oracle_settings,
};

#[tokio::test]
async fn oracle_receives_canonical_text_once_per_miss() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(header("authorization", "Bearer fw-test"))
        .and(body_partial_json(serde_json::json!({
            "model": "fireworks/deepseek-prover-v2",
            "temperature": 0.0,
            "max_tokens": 2048
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "linarith [h_guard]" },
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let oracle = Arc::new(ChatCompletionsOracle::new(oracle_settings(&server)).unwrap());
    let pipeline = ws.pipeline(oracle);
    let request = RunRequest::new(cartpole_spec("2.4"));

    let first = pipeline.run(&request).await.unwrap();
    assert_eq!(first.artifact.origin(), ArtifactOrigin::Oracle);
    assert_eq!(first.artifact.proof(), "linarith [h_guard]");

    let second = pipeline.run(&request).await.unwrap();
    assert_eq!(second.cache, CacheOutcome::Hit);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    let user = body["messages"][1]["content"].as_str().unwrap();
    assert!(user.starts_with("-- proofstack canonical-format: 1\n-- algorithm: ppo\n"));
    assert!(user.contains("|σ.cart_position| ≤ 2.4"));
}

#[tokio::test]
async fn server_errors_degrade_the_run() {
    let server = MockServer::start().await;
    mount_status(&server, 503, "overloaded").await;

    let ws = Workspace::new();
    let oracle = Arc::new(ChatCompletionsOracle::new(oracle_settings(&server)).unwrap());
    let report = ws
        .pipeline(oracle)
        .run(&RunRequest::new(cartpole_spec("2.4")))
        .await
        .unwrap();

    assert!(report.is_degraded());
    assert_eq!(
        report.artifact.degraded_reason(),
        Some("oracle returned HTTP 503: overloaded")
    );
    assert!(report.bundle.manifest.degraded);
    // One initial attempt plus one retry.
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn unreachable_oracle_degrades_the_run() {
    let server = MockServer::start().await;
    let settings = oracle_settings(&server);
    drop(server);

    let ws = Workspace::new();
    let oracle = Arc::new(ChatCompletionsOracle::new(settings).unwrap());
    let report = ws
        .pipeline(oracle)
        .run(&RunRequest::new(cartpole_spec("2.4")))
        .await
        .unwrap();

    assert!(report.is_degraded());
    assert!(report.bundle.path.join("manifest.json").is_file());
}

#[tokio::test]
async fn pipeline_timeout_bounds_a_hanging_oracle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(30))
                .set_body_string("{}"),
        )
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let oracle = Arc::new(ChatCompletionsOracle::new(oracle_settings(&server)).unwrap());
    let pipeline = ws.pipeline(oracle).with_options(PipelineOptions {
        oracle_timeout: Duration::from_millis(200),
        streaming: false,
    });

    let report = pipeline
        .run(&RunRequest::new(cartpole_spec("2.4")))
        .await
        .unwrap();
    assert!(report.is_degraded());
    assert_eq!(report.cache, CacheOutcome::Miss);
}

#[tokio::test]
async fn streaming_run_reports_deltas_and_caches_the_full_proof() {
    let server = MockServer::start().await;
    mount_streaming_completion(&server, &["intro σ hσ\n", "simp [h_guard]"]).await;

    let ws = Workspace::new();
    let oracle = Arc::new(ChatCompletionsOracle::new(oracle_settings(&server)).unwrap());
    let (tx, mut rx) = mpsc::channel(64);
    let pipeline = ws
        .pipeline(oracle)
        .with_options(PipelineOptions {
            streaming: true,
            ..PipelineOptions::default()
        })
        .with_events(tx);

    let request = RunRequest::new(cartpole_spec("2.4"));
    let report = pipeline.run(&request).await.unwrap();
    assert_eq!(report.artifact.proof(), "intro σ hσ\nsimp [h_guard]");

    let cached = ws
        .cache()
        .get(
            &pipeline
                .canonicalize(&request.spec, request.effective_algorithm())
                .cache_key(&request.toolchain_version),
        )
        .unwrap();
    assert_eq!(cached, report.artifact);

    drop(pipeline);
    let mut deltas = Vec::new();
    while let Some(event) = rx.recv().await {
        if let PipelineEvent::Oracle(OracleProgress::Delta(text)) = event {
            deltas.push(text);
        }
    }
    assert_eq!(deltas, vec!["intro σ hσ\n", "simp [h_guard]"]);
}

#[tokio::test]
async fn empty_completion_is_not_cached_as_genuine() {
    let server = MockServer::start().await;
    mount_completion(&server, "").await;

    let ws = Workspace::new();
    let oracle = Arc::new(ChatCompletionsOracle::new(oracle_settings(&server)).unwrap());
    let report = ws
        .pipeline(oracle)
        .run(&RunRequest::new(cartpole_spec("2.4")))
        .await
        .unwrap();

    assert!(report.is_degraded());
    assert!(
        report
            .artifact
            .degraded_reason()
            .unwrap()
            .starts_with("malformed oracle response")
    );
}
