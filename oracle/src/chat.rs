//! OpenAI-compatible chat-completions oracle.
//!
//! One POST per completion: a fixed system instruction plus the canonical
//! specification text as the user message. The proof is read from
//! `choices[0].message.content` (or accumulated from `choices[0].delta.content`
//! when streaming) and never interpreted.

use std::time::Duration;

use proofstack_types::{ApiKey, ProofArtifact};
use tokio::sync::mpsc;

use crate::retry::{self, RetryConfig, RetryOutcome};
use crate::wire::{ChatRequest, ChatResponse};
use crate::{OracleError, OracleFut, OracleProgress, ProofOracle, sse};

pub const DEFAULT_ORACLE_URL: &str = "https://api.fireworks.ai/inference/v1/chat/completions";
pub const DEFAULT_ORACLE_MODEL: &str = "fireworks/deepseek-prover-v2";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are DeepSeek Prover. Produce Lean4 proofs; no natural-language.";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_TEMPERATURE: f32 = 0.0;
pub const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

const CONNECT_TIMEOUT_SECS: u64 = 30;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;
const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Resolved client settings. No optional fields: defaults are applied by the
/// config layer or [`OracleSettings::new`].
#[derive(Debug, Clone)]
pub struct OracleSettings {
    pub url: String,
    pub model: String,
    pub api_key: ApiKey,
    pub system_prompt: String,
    /// Upper bound on the whole call, retries included.
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    pub retry: RetryConfig,
    pub stream_idle_timeout: Duration,
}

impl OracleSettings {
    #[must_use]
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            url: DEFAULT_ORACLE_URL.to_string(),
            model: DEFAULT_ORACLE_MODEL.to_string(),
            api_key,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            retry: RetryConfig::default(),
            stream_idle_timeout: DEFAULT_STREAM_IDLE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ChatCompletionsOracle {
    client: reqwest::Client,
    settings: OracleSettings,
}

impl ChatCompletionsOracle {
    pub fn new(settings: OracleSettings) -> Result<Self, OracleError> {
        let client = base_client_builder().build().map_err(OracleError::Client)?;
        Ok(Self { client, settings })
    }

    #[must_use]
    pub fn settings(&self) -> &OracleSettings {
        &self.settings
    }

    async fn send(&self, canonical: &str, stream: bool) -> Result<reqwest::Response, OracleError> {
        let settings = &self.settings;
        let body = ChatRequest::new(
            &settings.model,
            &settings.system_prompt,
            canonical,
            settings.temperature,
            settings.max_tokens,
            stream,
        );

        tracing::debug!(
            url = %settings.url,
            model = %settings.model,
            stream,
            canonical_bytes = canonical.len(),
            "Sending oracle request"
        );

        let outcome = retry::send_with_retry(
            || {
                let request = self
                    .client
                    .post(&settings.url)
                    .bearer_auth(settings.api_key.expose_secret())
                    .json(&body);
                if stream {
                    request.header("Accept", "text/event-stream")
                } else {
                    request.timeout(settings.timeout)
                }
            },
            &settings.retry,
        )
        .await;

        match outcome {
            RetryOutcome::Success(response) => Ok(response),
            RetryOutcome::HttpError(response) => {
                let status = response.status().as_u16();
                let body = read_capped_error_body(response).await;
                Err(OracleError::Status { status, body })
            }
            RetryOutcome::ConnectionError { attempts, source } => {
                Err(OracleError::Transport { attempts, source })
            }
        }
    }

    async fn request_completion(&self, canonical: &str) -> Result<ProofArtifact, OracleError> {
        let response = self.send(canonical, false).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| OracleError::MalformedResponse(format!("unreadable body: {e}")))?;
        let parsed: ChatResponse = serde_json::from_slice(&bytes)
            .map_err(|e| OracleError::MalformedResponse(e.to_string()))?;
        let content = parsed.into_content().ok_or_else(|| {
            OracleError::MalformedResponse("response has no choices[0].message.content".to_string())
        })?;
        proven(content)
    }

    async fn stream_completion(
        &self,
        canonical: &str,
        progress: &mpsc::Sender<OracleProgress>,
    ) -> Result<ProofArtifact, OracleError> {
        let _ = progress.send(OracleProgress::Started).await;
        let response = self.send(canonical, true).await?;
        let text =
            sse::collect_completion(response, progress, self.settings.stream_idle_timeout).await?;
        proven(text)
    }
}

fn proven(content: String) -> Result<ProofArtifact, OracleError> {
    if content.trim().is_empty() {
        return Err(OracleError::MalformedResponse("empty completion".to_string()));
    }
    Ok(ProofArtifact::proven(content))
}

impl ProofOracle for ChatCompletionsOracle {
    fn name(&self) -> &'static str {
        "chat-completions"
    }

    fn complete<'a>(&'a self, canonical: &'a str) -> OracleFut<'a> {
        Box::pin(async move {
            let limit = self.settings.timeout;
            tokio::time::timeout(limit, self.request_completion(canonical))
                .await
                .unwrap_or(Err(OracleError::Timeout(limit)))
        })
    }

    fn complete_streaming<'a>(
        &'a self,
        canonical: &'a str,
        progress: mpsc::Sender<OracleProgress>,
    ) -> OracleFut<'a> {
        Box::pin(async move {
            let limit = self.settings.timeout;
            let result = tokio::time::timeout(limit, self.stream_completion(canonical, &progress))
                .await
                .unwrap_or(Err(OracleError::Timeout(limit)));
            if result.is_ok() {
                let _ = progress.send(OracleProgress::Finished).await;
            }
            result
        })
    }
}

fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
}

async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}
