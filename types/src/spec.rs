//! Safety specifications and the algorithms they are attached to.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RL algorithm whose policy a specification constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Ppo,
    Sac,
    Ddpg,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown algorithm {0:?} (expected one of: ppo, sac, ddpg)")]
pub struct AlgorithmParseError(pub String);

impl Algorithm {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ppo => "ppo",
            Self::Sac => "sac",
            Self::Ddpg => "ddpg",
        }
    }

    #[must_use]
    pub const fn all() -> &'static [Algorithm] {
        &[Self::Ppo, Self::Sac, Self::Ddpg]
    }

    /// Parse an algorithm tag (case-insensitive).
    pub fn parse(value: &str) -> Result<Self, AlgorithmParseError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ppo" => Ok(Self::Ppo),
            "sac" => Ok(Self::Sac),
            "ddpg" => Ok(Self::Ddpg),
            _ => Err(AlgorithmParseError(value.to_string())),
        }
    }
}

impl std::str::FromStr for Algorithm {
    type Err = AlgorithmParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Safety requirements attached to a control policy.
///
/// Order of every list is significant: it is preserved verbatim into the
/// canonical text, so reordering two invariants is a different specification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SafetySpecification {
    #[serde(default)]
    pub invariants: Vec<String>,
    #[serde(default, alias = "guard")]
    pub guards: Vec<String>,
    #[serde(default)]
    pub lemmas: Vec<String>,
    #[serde(default)]
    pub algorithm: Algorithm,
}

impl SafetySpecification {
    #[must_use]
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_invariant(mut self, predicate: impl Into<String>) -> Self {
        self.invariants.push(predicate.into());
        self
    }

    #[must_use]
    pub fn with_guard(mut self, predicate: impl Into<String>) -> Self {
        self.guards.push(predicate.into());
        self
    }

    #[must_use]
    pub fn with_lemma(mut self, name: impl Into<String>) -> Self {
        self.lemmas.push(name.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty() && self.guards.is_empty() && self.lemmas.is_empty()
    }
}
