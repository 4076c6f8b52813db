//! Runtime guard code generation.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use proofstack_types::{Algorithm, Digest, ProofArtifact, SafetySpecification};
use proofstack_utils::atomic_write;

use crate::error::ArtifactError;

pub const GUARD_FILE: &str = "guard.c";

/// Everything a guard generator may look at for one run.
#[derive(Debug, Clone, Copy)]
pub struct GuardInput<'a> {
    pub spec: &'a SafetySpecification,
    pub digest: &'a Digest,
    pub algorithm: Algorithm,
    pub artifact: &'a ProofArtifact,
}

/// Guard source produced for one run.
///
/// Bundlers take `source` from here rather than re-reading `path`, which a
/// concurrent run for the same digest may have replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedGuard {
    pub path: PathBuf,
    pub source: String,
}

/// Emits runtime guard source for a specification.
///
/// Called exactly once per run.
pub trait GuardGenerator: Send + Sync {
    fn generate(&self, input: &GuardInput<'_>) -> Result<GeneratedGuard, ArtifactError>;
}

/// Writes a C99 cart-pole guard to `{out_dir}/{digest}/guard.c`.
#[derive(Debug, Clone)]
pub struct CGuardGenerator {
    out_dir: PathBuf,
}

impl CGuardGenerator {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    #[must_use]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }
}

impl GuardGenerator for CGuardGenerator {
    fn generate(&self, input: &GuardInput<'_>) -> Result<GeneratedGuard, ArtifactError> {
        let path = self.out_dir.join(input.digest.as_str()).join(GUARD_FILE);
        let source = render_c_guard(input);
        atomic_write(&path, source.as_bytes()).map_err(ArtifactError::io(&path))?;
        tracing::debug!(path = %path.display(), digest = %input.digest.short(12), "Wrote runtime guard");
        Ok(GeneratedGuard { path, source })
    }
}

/// C99 guard source. `check_safety` is the exported entry point.
#[must_use]
pub fn render_c_guard(input: &GuardInput<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// Runtime guard for SafeRL ProofStack");
    let _ = writeln!(out, "// Specification digest: {}", input.digest);
    let _ = writeln!(out, "// Algorithm: {}", input.algorithm);
    let _ = write!(out, "// Proof origin: {}", input.artifact.origin().as_str());
    if let Some(reason) = input.artifact.degraded_reason() {
        let _ = write!(out, " ({})", comment_safe(reason));
    }
    out.push('\n');

    if !input.spec.guards.is_empty() {
        out.push_str("//\n// Guard predicates:\n");
        for predicate in &input.spec.guards {
            let _ = writeln!(out, "//   {}", comment_safe(predicate));
        }
    }
    if !input.spec.invariants.is_empty() {
        out.push_str("//\n// Invariants:\n");
        for predicate in &input.spec.invariants {
            let _ = writeln!(out, "//   {}", comment_safe(predicate));
        }
    }

    out.push_str(C_BODY);
    out
}

fn comment_safe(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

const C_BODY: &str = r#"
#include <math.h>
#include <stdbool.h>
#include <stdio.h>

typedef struct {
    double cart_position;
    double cart_velocity;
    double pole_angle;
    double pole_angular_velocity;
} State;

typedef struct {
    double force;
} Action;

#define MAX_POSITION 2.4
#define MAX_ANGLE 0.2095
#define MAX_FORCE 10.0

bool safe(const State* state) {
    return fabs(state->cart_position) <= MAX_POSITION &&
           fabs(state->pole_angle) <= MAX_ANGLE;
}

bool guard(const State* state, const Action* action) {
    return fabs(state->cart_position) <= MAX_POSITION - 0.1 &&
           fabs(state->pole_angle) <= MAX_ANGLE - 0.01 &&
           fabs(action->force) <= MAX_FORCE;
}

bool runtime_guard(const State* state, const Action* action) {
    if (!guard(state, action)) {
        fprintf(stderr, "Safety guard violation detected\n");
        return false;
    }
    return true;
}

#ifdef __cplusplus
extern "C" {
#endif

bool check_safety(const State* state, const Action* action) {
    return runtime_guard(state, action);
}

#ifdef __cplusplus
}
#endif
"#;
