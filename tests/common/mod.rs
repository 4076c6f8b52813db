//! Shared test utilities and fixtures
//!
//! Common infrastructure for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use proofstack_cache::{CacheSettings, ProofCache};
use proofstack_engine::{CGuardGenerator, DirectoryBundler, PipelineOrchestrator};
use proofstack_oracle::{OracleSettings, ProofOracle, RetryConfig};
use proofstack_types::{ApiKey, SafetySpecification};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const COMPLETIONS_PATH: &str = "/inference/v1/chat/completions";

/// Isolated cache, guard and bundle directories for one test.
pub struct Workspace {
    root: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.path().join(".proofstack_cache")
    }

    pub fn bundle_dir(&self) -> PathBuf {
        self.root.path().join("attestation_bundle")
    }

    pub fn cache(&self) -> ProofCache {
        ProofCache::new(&CacheSettings {
            dir: self.cache_dir(),
        })
        .expect("open cache")
    }

    pub fn pipeline(&self, oracle: Arc<dyn ProofOracle>) -> PipelineOrchestrator {
        self.pipeline_named(oracle, "attestation_bundle")
    }

    /// Pipeline sharing this workspace's cache but with its own output dirs.
    pub fn pipeline_named(&self, oracle: Arc<dyn ProofOracle>, name: &str) -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            self.cache(),
            oracle,
            Arc::new(CGuardGenerator::new(self.root.path().join(format!("{name}_guard")))),
            Arc::new(DirectoryBundler::new(self.root.path().join(name))),
        )
    }
}

/// Cart-pole spec with a single tunable position bound.
pub fn cartpole_spec(bound: &str) -> SafetySpecification {
    SafetySpecification::default()
        .with_invariant(format!("|σ.cart_position| ≤ {bound}"))
        .with_invariant("|σ.pole_angle| ≤ 0.2095")
        .with_guard("|a.force| ≤ 10.0")
        .with_lemma("bounded_force")
}

/// Oracle settings pointed at a mock server, with fast retries.
pub fn oracle_settings(server: &MockServer) -> OracleSettings {
    OracleSettings::new(ApiKey::new("fw-test"))
        .with_url(format!("{}{COMPLETIONS_PATH}", server.uri()))
        .with_timeout(Duration::from_secs(5))
        .with_retry(RetryConfig {
            max_retries: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter_factor: 0.0,
        })
}

/// Mount a non-streaming chat-completions response.
pub async fn mount_completion(server: &MockServer, content: &str) {
    let body = serde_json::json!({
        "id": "cmpl-test",
        "object": "chat.completion",
        "model": "fireworks/deepseek-prover-v2",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    });

    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mount a streaming SSE chat-completions response.
pub async fn mount_streaming_completion(server: &MockServer, chunks: &[&str]) {
    let mut sse_body = String::new();
    for chunk in chunks {
        let data = serde_json::json!({
            "choices": [{ "index": 0, "delta": { "content": chunk }, "finish_reason": null }]
        });
        sse_body.push_str(&format!("data: {data}\n\n"));
    }
    sse_body.push_str("data: [DONE]\n\n");

    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(sse_body)
                .insert_header("content-type", "text/event-stream"),
        )
        .mount(server)
        .await;
}

/// Mount an error status for every request.
pub async fn mount_status(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}
