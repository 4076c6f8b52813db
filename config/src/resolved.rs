//! Resolved, invariant-safe settings.
//!
//! Converts the optional, boundary-level [`ProofstackConfig`] into concrete
//! values so the pipeline never deals with `Option` defaults.

use std::path::PathBuf;
use std::time::Duration;

use proofstack_cache::CacheSettings;
use proofstack_oracle::{
    DEFAULT_MAX_TOKENS, DEFAULT_ORACLE_MODEL, DEFAULT_ORACLE_URL, DEFAULT_STREAM_IDLE_TIMEOUT,
    DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT, OracleSettings, RetryConfig,
};
use proofstack_types::{Algorithm, ApiKey, ToolchainVersion};

use crate::{ConfigError, OracleConfig, PipelineConfig, ProofstackConfig, expand_env_vars};

/// Fallback source for the oracle API key.
pub const API_KEY_ENV: &str = "FIREWORKS_API_KEY";

const DEFAULT_OUTPUT_DIR: &str = "attestation_bundle";
const DEFAULT_GUARD_DIR: &str = "guard_output";
const MAX_TEMPERATURE: f32 = 2.0;

/// Which oracle a run talks to.
#[derive(Debug, Clone)]
pub enum OracleMode {
    /// Offline mock returning a fixed proof.
    Mock,
    /// Network oracle.
    Http(OracleSettings),
    /// No credentials: every oracle call fails and runs degrade.
    Offline { reason: String },
}

#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub cache: CacheSettings,
    pub allow_cache_reuse: bool,
    pub oracle: OracleMode,
    pub streaming: bool,
    /// Upper bound on one oracle call, retries included.
    pub oracle_timeout: Duration,
    /// Overrides the algorithm tag of loaded specifications. The command line
    /// overrides this in turn.
    pub algorithm: Option<Algorithm>,
    pub toolchain_version: ToolchainVersion,
    pub output_dir: PathBuf,
    pub guard_dir: PathBuf,
}

impl Default for ResolvedSettings {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            allow_cache_reuse: true,
            oracle: OracleMode::Offline {
                reason: format!("no API key configured (set {API_KEY_ENV})"),
            },
            streaming: false,
            oracle_timeout: DEFAULT_TIMEOUT,
            algorithm: None,
            toolchain_version: ToolchainVersion::latest(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            guard_dir: PathBuf::from(DEFAULT_GUARD_DIR),
        }
    }
}

impl ResolvedSettings {
    pub fn from_config(config: &ProofstackConfig) -> Result<Self, ConfigError> {
        Self::from_config_with_env(config, |name| std::env::var(name).ok())
    }

    /// Resolve with an explicit environment lookup, used for the API key fallback.
    pub fn from_config_with_env(
        config: &ProofstackConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Some(cache) = &config.cache {
            if let Some(dir) = non_blank(cache.dir.as_deref()) {
                settings.cache.dir = PathBuf::from(dir);
            }
            settings.allow_cache_reuse = cache.allow_reuse;
        }

        let default_oracle = OracleConfig::default();
        let oracle = config.oracle.as_ref().unwrap_or(&default_oracle);
        settings.streaming = oracle.streaming;
        settings.oracle_timeout = resolve_timeout(oracle.timeout_seconds)?;
        settings.oracle = resolve_oracle(oracle, settings.oracle_timeout, &lookup)?;

        let default_pipeline = PipelineConfig::default();
        let pipeline = config.pipeline.as_ref().unwrap_or(&default_pipeline);
        if let Some(algo) = non_blank(pipeline.algorithm.as_deref()) {
            let algo = Algorithm::parse(&algo)
                .map_err(|e| ConfigError::invalid("pipeline.algorithm", e.to_string()))?;
            settings.algorithm = Some(algo);
        }
        if let Some(version) = non_blank(pipeline.toolchain_version.as_deref()) {
            settings.toolchain_version = ToolchainVersion::new(version)
                .map_err(|e| ConfigError::invalid("pipeline.toolchain_version", e.to_string()))?;
        }
        if let Some(dir) = non_blank(pipeline.output_dir.as_deref()) {
            settings.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_blank(pipeline.guard_dir.as_deref()) {
            settings.guard_dir = PathBuf::from(dir);
        }

        Ok(settings)
    }
}

fn resolve_timeout(seconds: Option<u64>) -> Result<Duration, ConfigError> {
    match seconds {
        None => Ok(DEFAULT_TIMEOUT),
        Some(0) => Err(ConfigError::invalid(
            "oracle.timeout_seconds",
            "must be greater than zero",
        )),
        Some(secs) => Ok(Duration::from_secs(secs)),
    }
}

fn resolve_oracle(
    oracle: &OracleConfig,
    timeout: Duration,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<OracleMode, ConfigError> {
    if oracle.mock {
        return Ok(OracleMode::Mock);
    }

    let key = non_blank(oracle.api_key.as_deref())
        .or_else(|| lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()));
    let Some(key) = key else {
        return Ok(OracleMode::Offline {
            reason: format!("no API key configured (set {API_KEY_ENV} or oracle.api_key)"),
        });
    };

    let temperature = oracle.temperature.unwrap_or(DEFAULT_TEMPERATURE);
    if !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
        return Err(ConfigError::invalid(
            "oracle.temperature",
            format!("{temperature} is outside 0.0..={MAX_TEMPERATURE}"),
        ));
    }

    let max_tokens = oracle.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    if max_tokens == 0 {
        return Err(ConfigError::invalid("oracle.max_tokens", "must be greater than zero"));
    }

    let mut retry = RetryConfig::default();
    if let Some(max_retries) = oracle.max_retries {
        retry.max_retries = max_retries;
    }

    let stream_idle_timeout = match oracle.stream_idle_timeout_seconds {
        Some(0) | None => DEFAULT_STREAM_IDLE_TIMEOUT,
        Some(secs) => Duration::from_secs(secs),
    };

    Ok(OracleMode::Http(OracleSettings {
        url: non_blank(oracle.url.as_deref()).unwrap_or_else(|| DEFAULT_ORACLE_URL.to_string()),
        model: non_blank(oracle.model.as_deref())
            .unwrap_or_else(|| DEFAULT_ORACLE_MODEL.to_string()),
        api_key: ApiKey::new(key),
        system_prompt: non_blank(oracle.system_prompt.as_deref())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        timeout,
        max_tokens,
        temperature,
        retry,
        stream_idle_timeout,
    }))
}

/// Env-expanded, trimmed value; `None` when absent or blank.
fn non_blank(value: Option<&str>) -> Option<String> {
    let expanded = expand_env_vars(value?);
    let trimmed = expanded.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
