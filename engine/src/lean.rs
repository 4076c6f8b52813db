//! Lean 4 rendering of cart-pole safety specifications.

use proofstack_types::{Algorithm, SafetySpecification};

use crate::canonical::SpecRenderer;

/// Proof obligation placeholder emitted by the renderer, one per line.
const PLACEHOLDER_LINE: &str = "  sorry";

/// Default [`SpecRenderer`]: a self-contained Lean 4 module with one safety
/// theorem per algorithm and a `sorry` proof for each obligation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeanRenderer;

impl SpecRenderer for LeanRenderer {
    fn render(&self, spec: &SafetySpecification, algorithm: Algorithm) -> String {
        let algo = algorithm.as_str();
        let upper = algo.to_ascii_uppercase();
        let mut out = String::new();

        out.push_str(&format!(
            "-- SafeRL ProofStack: {upper} Safety Specification\n\
             \n\
             import Mathlib.Data.Real.Basic\n\
             import Mathlib.Analysis.NormedSpace.Basic\n\
             \n\
             structure State where\n\
             \x20 cart_position : ℝ\n\
             \x20 cart_velocity : ℝ\n\
             \x20 pole_angle : ℝ\n\
             \x20 pole_angular_velocity : ℝ\n\
             \n\
             structure Action where\n\
             \x20 force : ℝ\n\
             \n\
             def Policy := State → Action\n\
             \n\
             axiom step : State → State → Prop\n\
             axiom {algo}_policy : Policy\n\
             \n\
             def safe_action (a : Action) : Prop :=\n\
             \x20 |a.force| ≤ 10.0\n\
             \n\
             def invariant (σ : State) : Prop :=\n\
             \x20 |σ.cart_position| ≤ 2.4 ∧\n\
             \x20 |σ.pole_angle| ≤ 0.2095\n\n"
        ));

        out.push_str("-- Safety invariants (must always hold)\n");
        out.push_str(&render_invariants(&spec.invariants));
        out.push_str("\n\n-- Guard conditions (checked before actions)\n");
        out.push_str(&render_guards(&spec.guards));
        out.push_str("\n\n-- Safety lemmas\n");
        out.push_str(&render_lemmas(&spec.lemmas));

        out.push_str(&format!(
            "\n\n-- {upper}-specific safety theorem\n\
             theorem safe_{algo}_policy : ∀ σ, invariant σ → safe_action ({algo}_policy σ) := by\n\
             {PLACEHOLDER_LINE}\n"
        ));
        out
    }
}

fn render_invariants(invariants: &[String]) -> String {
    if invariants.is_empty() {
        return "def default_invariant (σ : State) : Prop :=\n  \
                |σ.cart_position| ≤ 2.4 ∧\n  \
                |σ.pole_angle| ≤ 0.2095"
            .to_string();
    }
    invariants
        .iter()
        .enumerate()
        .map(|(i, inv)| format!("def invariant_{i} (σ : State) : Prop :=\n  {}", single_line(inv)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_guards(guards: &[String]) -> String {
    if guards.is_empty() {
        return "def default_guard (σ : State) (a : Action) : Prop :=\n  \
                |σ.cart_position| ≤ 2.3 ∧\n  \
                |σ.pole_angle| ≤ 0.2 ∧\n  \
                |a.force| ≤ 10.0"
            .to_string();
    }
    guards
        .iter()
        .enumerate()
        .map(|(i, g)| {
            format!(
                "def guard_{i} (σ : State) (a : Action) : Prop :=\n  {}",
                single_line(g)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_lemmas(lemmas: &[String]) -> String {
    if lemmas.is_empty() {
        return format!(
            "lemma position_step_bound : ∀ σ σ', step σ σ' → |σ'.cart_position - σ.cart_position| ≤ 0.1 := by\n\
             {PLACEHOLDER_LINE}\n\
             \n\
             lemma angle_step_preserved : ∀ σ σ', step σ σ' → |σ'.pole_angle| ≤ |σ.pole_angle| + 0.01 := by\n\
             {PLACEHOLDER_LINE}"
        );
    }
    lemmas
        .iter()
        .map(|name| {
            let name = single_line(name);
            format!(
                "axiom {name}_property : State → State → Prop\n\
                 lemma {name} : ∀ σ σ', step σ σ' → {name}_property σ σ' := by\n\
                 {PLACEHOLDER_LINE}"
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Predicates are embedded on one line so they can never forge a placeholder line.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Substitute `proof` for every placeholder obligation in rendered text.
///
/// Multi-line proofs are re-indented under the `by`. If the text has no
/// placeholder, the proof is appended as a trailing comment block.
pub fn insert_proof(rendered: &str, proof: &str) -> String {
    let indented = proof
        .trim_end()
        .lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut replaced = false;
    let mut out = String::with_capacity(rendered.len() + proof.len());
    for line in rendered.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == PLACEHOLDER_LINE {
            replaced = true;
            out.push_str(&indented);
            if line.ends_with('\n') {
                out.push('\n');
            }
        } else {
            out.push_str(line);
        }
    }

    if !replaced {
        out.push_str("\n\n-- Generated proof:\n");
        out.push_str(proof);
        out.push('\n');
    }
    out
}
