//! Configuration loading for proofstack.
//!
//! The TOML file is located by, in order:
//! 1. `PROOFSTACK_CONFIG` (must exist if set)
//! 2. `./proofstack.toml`
//! 3. `~/.proofstack/config.toml`
//!
//! A missing file is not an error: every setting has a default. String values
//! may reference environment variables as `${VAR}`.
//!
//! ```toml
//! [cache]
//! dir = ".proofstack_cache"
//! allow_reuse = true
//!
//! [oracle]
//! api_key = "${FIREWORKS_API_KEY}"
//! timeout_seconds = 120
//! streaming = false
//!
//! [pipeline]
//! algorithm = "ppo"
//! toolchain_version = "latest"
//! output_dir = "attestation_bundle"
//! ```

mod resolved;
mod spec_file;

use std::path::{Path, PathBuf};
use std::{env, fs, io};

use serde::Deserialize;
use thiserror::Error;

pub use resolved::{API_KEY_ENV, OracleMode, ResolvedSettings};
pub use spec_file::{SpecFileError, load_spec};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "PROOFSTACK_CONFIG";
/// Project-local config file name.
pub const LOCAL_CONFIG_FILE: &str = "proofstack.toml";

pub(crate) const fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct ProofstackConfig {
    pub cache: Option<CacheConfig>,
    pub oracle: Option<OracleConfig>,
    pub pipeline: Option<PipelineConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Cache directory. Default: `.proofstack_cache` under the working directory.
    pub dir: Option<String>,
    /// Serve cached proofs. When false the oracle is always called, but results
    /// are still stored.
    #[serde(default = "default_true")]
    pub allow_reuse: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            allow_reuse: true,
        }
    }
}

#[derive(Default, Deserialize)]
pub struct OracleConfig {
    pub url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub system_prompt: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub max_retries: Option<u32>,
    pub stream_idle_timeout_seconds: Option<u64>,
    /// Use the streaming endpoint and report progress.
    #[serde(default)]
    pub streaming: bool,
    /// Use the offline mock oracle instead of the network.
    #[serde(default)]
    pub mock: bool,
}

// Manual Debug impl to prevent leaking the API key in logs.
impl std::fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleConfig")
            .field("url", &self.url)
            .field("model", &self.model)
            .field(
                "api_key",
                &if self.api_key.is_some() {
                    "[REDACTED]"
                } else {
                    "None"
                },
            )
            .field("system_prompt", &self.system_prompt)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("stream_idle_timeout_seconds", &self.stream_idle_timeout_seconds)
            .field("streaming", &self.streaming)
            .field("mock", &self.mock)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PipelineConfig {
    /// Algorithm applied to every spec file unless the command line names one.
    pub algorithm: Option<String>,
    /// Toolchain pin. Default: `latest` (unpinned).
    pub toolchain_version: Option<String>,
    pub output_dir: Option<String>,
    pub guard_dir: Option<String>,
}

/// Expand `${VAR}` references. Unset variables expand to the empty string.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

impl ProofstackConfig {
    /// Load from the discovered location. `Ok(None)` when no file exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        if let Some(explicit) = env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Self::load_from(Path::new(&explicit)).map(Some);
        }

        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    /// Load from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(source) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, source);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "Loaded config");
                Ok(config)
            }
            Err(source) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, source);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
}

/// Path of the config file that [`ProofstackConfig::load`] would read,
/// ignoring `PROOFSTACK_CONFIG`.
pub fn config_path() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    dirs::home_dir().map(|home| home.join(".proofstack").join("config.toml"))
}
