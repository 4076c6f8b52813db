use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::state::Stage;

/// Guard generation or bundling could not write its output.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ArtifactError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// A run did not produce a bundle.
///
/// Oracle and cache failures never surface here; they degrade the run instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline failed during {stage}: {source}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: ArtifactError,
    },
    #[error("pipeline run was cancelled")]
    Cancelled,
}

impl PipelineError {
    /// The stage that failed, if the run got far enough to fail in one.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            Self::Cancelled => None,
        }
    }
}
