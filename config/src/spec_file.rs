//! Safety specification files.
//!
//! `.json` files are read as JSON, anything else as TOML:
//!
//! ```toml
//! algorithm = "ppo"
//! invariants = ["abs(x) <= 2.4", "abs(theta) <= 0.21"]
//! guard = ["abs(x) <= 2.4"]
//! lemmas = ["bounded_action"]
//! ```

use std::io;
use std::path::{Path, PathBuf};

use proofstack_types::SafetySpecification;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecFileError {
    #[error("failed to read specification {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid TOML specification {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid JSON specification {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub fn load_spec(path: &Path) -> Result<SafetySpecification, SpecFileError> {
    let content = std::fs::read_to_string(path).map_err(|source| SpecFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content).map_err(|source| SpecFileError::Json {
            path: path.to_path_buf(),
            source,
        })
    } else {
        toml::from_str(&content).map_err(|source| SpecFileError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }
}
