//! HTTP retry policy with exponential backoff.
//!
//! # Retry Policy
//!
//! - Max retries: 2 (3 total attempts)
//! - Initial delay: 500ms
//! - Max delay: 8 seconds
//! - Jitter: down-jitter up to 25% (multiplier in [0.75, 1.0])
//!
//! # Retryable Conditions
//!
//! - HTTP 408, 409, 429, 5xx
//! - Connection errors
//! - `x-should-retry: true` forces retry, `x-should-retry: false` forbids it
//!
//! Every attempt carries the same `Idempotency-Key` so the oracle provider can
//! deduplicate a completion that succeeded server-side but whose response was lost.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode, header::HeaderMap};
use uuid::Uuid;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries (not counting the initial request).
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Jitter factor for down-jitter (0.25 = up to 25% reduction).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_factor: 0.25,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no backoff.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Parse `Retry-After-Ms` or `Retry-After` headers.
///
/// Returns `Some(duration)` only for values in `(0, 60s)`.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    if let Some(val) = headers.get("retry-after-ms")
        && let Ok(s) = val.to_str()
        && let Ok(ms) = s.parse::<f64>()
        && ms.is_finite()
        && ms > 0.0
    {
        let duration = Duration::from_secs_f64(ms / 1000.0);
        if duration < Duration::from_secs(60) {
            return Some(duration);
        }
    }

    if let Some(val) = headers.get("retry-after")
        && let Ok(s) = val.to_str()
        && let Ok(secs) = s.trim().parse::<u64>()
    {
        let duration = Duration::from_secs(secs);
        if duration > Duration::ZERO && duration < Duration::from_secs(60) {
            return Some(duration);
        }
    }

    None
}

/// Whether a response status is worth another attempt.
#[must_use]
pub fn should_retry(status: StatusCode, headers: &HeaderMap) -> bool {
    if let Some(val) = headers.get("x-should-retry")
        && let Ok(s) = val.to_str()
    {
        if s.eq_ignore_ascii_case("true") {
            return true;
        }
        if s.eq_ignore_ascii_case("false") {
            return false;
        }
    }

    matches!(status.as_u16(), 408 | 409 | 429 | 500..=599)
}

/// Delay before retry number `backoff_step + 1`.
///
/// `Retry-After` wins when present and sane; otherwise exponential backoff with
/// down-jitter.
#[must_use]
pub fn calculate_retry_delay(
    backoff_step: u32,
    config: &RetryConfig,
    headers: Option<&HeaderMap>,
) -> Duration {
    if let Some(headers) = headers
        && let Some(delay) = parse_retry_after(headers)
    {
        return delay;
    }

    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(backoff_step.min(30) as i32);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter = 1.0 - rand::random::<f64>() * config.jitter_factor;
    Duration::from_secs_f64(capped * jitter)
}

#[must_use]
pub fn generate_idempotency_key() -> String {
    format!("proofstack-{}", Uuid::new_v4())
}

/// Outcome of [`send_with_retry`].
///
/// Structurally separates success from failure so an error response can't be
/// mistaken for a completion.
#[derive(Debug)]
pub enum RetryOutcome {
    /// 2xx response.
    Success(Response),
    /// Non-2xx response after exhausting retries, kept for error-body inspection.
    HttpError(Response),
    /// Transport failure. `attempts` counts every request sent.
    ConnectionError {
        attempts: u32,
        source: reqwest::Error,
    },
}

/// Send a request with automatic retries.
///
/// `build_request` is called once per attempt.
pub async fn send_with_retry<F>(build_request: F, config: &RetryConfig) -> RetryOutcome
where
    F: Fn() -> RequestBuilder,
{
    let idempotency_key = generate_idempotency_key();
    let mut retry_count = 0u32;

    loop {
        let request = build_request()
            .header("X-Retry-Count", retry_count.to_string())
            .header("Idempotency-Key", &idempotency_key);
        let retries_left = retry_count < config.max_retries;

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return RetryOutcome::Success(response);
                }
                if !retries_left || !should_retry(status, response.headers()) {
                    return RetryOutcome::HttpError(response);
                }

                let delay = calculate_retry_delay(retry_count, config, Some(response.headers()));
                tracing::debug!(
                    status = %status,
                    retry_count = retry_count + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying oracle request after error status"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if !retries_left || !is_retryable_error(&e) {
                    return RetryOutcome::ConnectionError {
                        attempts: retry_count + 1,
                        source: e,
                    };
                }

                let delay = calculate_retry_delay(retry_count, config, None);
                tracing::debug!(
                    error = %e,
                    retry_count = retry_count + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying oracle request after connection error"
                );
                tokio::time::sleep(delay).await;
            }
        }

        retry_count += 1;
    }
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}
