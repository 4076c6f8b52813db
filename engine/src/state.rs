//! Pipeline stages and the legal transitions between them.

use serde::{Deserialize, Serialize};

/// One stage of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Serializing,
    CacheLookup,
    OracleCall,
    CacheStore,
    ArtifactGeneration,
    Bundling,
    Done,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Serializing => "serializing",
            Self::CacheLookup => "cache_lookup",
            Self::OracleCall => "oracle_call",
            Self::CacheStore => "cache_store",
            Self::ArtifactGeneration => "artifact_generation",
            Self::Bundling => "bundling",
            Self::Done => "done",
        }
    }

    /// Whether a run may move from `self` directly to `next`.
    ///
    /// `Serializing -> OracleCall` is the path taken when cache reuse is
    /// disabled and the lookup is skipped.
    #[must_use]
    pub const fn can_transition_to(self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Self::Serializing, Self::CacheLookup | Self::OracleCall)
                | (Self::CacheLookup, Self::ArtifactGeneration | Self::OracleCall)
                | (Self::OracleCall, Self::CacheStore)
                | (Self::CacheStore, Self::ArtifactGeneration)
                | (Self::ArtifactGeneration, Self::Bundling)
                | (Self::Bundling, Self::Done)
        )
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the cache participated in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
    /// A stored artifact was reused; the oracle was not called.
    Hit,
    /// No usable entry; the oracle was called and its result stored.
    Miss,
    /// Reuse was disabled for this run; the lookup was skipped.
    Bypassed,
}

impl CacheOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Bypassed => "bypassed",
        }
    }
}

impl std::fmt::Display for CacheOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered record of the stages a run entered.
#[derive(Debug, Clone, Default)]
pub(crate) struct StageTrace {
    stages: Vec<Stage>,
}

impl StageTrace {
    pub(crate) fn new() -> Self {
        Self {
            stages: vec![Stage::Serializing],
        }
    }

    pub(crate) fn current(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Serializing)
    }

    pub(crate) fn enter(&mut self, next: Stage) {
        debug_assert!(
            self.current().can_transition_to(next),
            "illegal stage transition {} -> {next}",
            self.current()
        );
        tracing::debug!(from = %self.current(), to = %next, "Pipeline stage transition");
        self.stages.push(next);
    }

    pub(crate) fn into_stages(self) -> Vec<Stage> {
        self.stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_and_miss_paths_are_legal() {
        let hit = [
            Stage::Serializing,
            Stage::CacheLookup,
            Stage::ArtifactGeneration,
            Stage::Bundling,
            Stage::Done,
        ];
        let miss = [
            Stage::Serializing,
            Stage::CacheLookup,
            Stage::OracleCall,
            Stage::CacheStore,
            Stage::ArtifactGeneration,
            Stage::Bundling,
            Stage::Done,
        ];
        for path in [&hit[..], &miss[..]] {
            assert!(path.windows(2).all(|w| w[0].can_transition_to(w[1])));
        }
    }

    #[test]
    fn oracle_result_must_be_stored() {
        assert!(!Stage::OracleCall.can_transition_to(Stage::ArtifactGeneration));
        assert!(!Stage::CacheLookup.can_transition_to(Stage::Bundling));
        assert!(!Stage::Done.can_transition_to(Stage::Serializing));
        assert!(Stage::Done.is_terminal());
    }

    #[test]
    fn trace_records_entered_stages() {
        let mut trace = StageTrace::new();
        trace.enter(Stage::OracleCall);
        trace.enter(Stage::CacheStore);
        assert_eq!(trace.current(), Stage::CacheStore);
        assert_eq!(
            trace.into_stages(),
            vec![Stage::Serializing, Stage::OracleCall, Stage::CacheStore]
        );
    }

    #[test]
    fn outcomes_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&CacheOutcome::Bypassed).unwrap(),
            "\"bypassed\""
        );
        assert_eq!(Stage::ArtifactGeneration.to_string(), "artifact_generation");
    }
}
