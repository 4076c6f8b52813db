//! Content-addressing and cache-key properties, checked through the public crates.

use std::collections::HashSet;

use proofstack_engine::{LeanRenderer, canonicalize};
use proofstack_types::{
    Algorithm, CacheKey, DIGEST_HEX_LEN, ProofArtifact, SafetySpecification, ToolchainVersion,
    fingerprint,
};

use crate::common::{Workspace, cartpole_spec};

#[test]
fn distinct_texts_have_distinct_fingerprints() {
    let mut corpus: Vec<String> = vec![
        String::new(),
        " ".to_string(),
        "bound <= 2.4".to_string(),
        "bound <= 2.5".to_string(),
        "bound <= 2.4 ".to_string(),
        "ℝ → ℝ, α ≤ β".to_string(),
        "ℝ → ℝ, α ≤ γ".to_string(),
    ];
    for i in 0..200 {
        corpus.push(format!("|σ.cart_position| ≤ {}.{i}", i % 7));
    }

    let digests: HashSet<_> = corpus.iter().map(|s| fingerprint(s)).collect();
    assert_eq!(digests.len(), corpus.len());
}

#[test]
fn empty_text_has_valid_fixed_length_digest() {
    let digest = fingerprint("");
    assert_eq!(digest.as_str().len(), DIGEST_HEX_LEN);
    assert!(digest.as_str().bytes().all(|b| b.is_ascii_hexdigit()));
    assert_eq!(digest, fingerprint(""));
}

#[test]
fn round_trip_and_idempotent_put() {
    let ws = Workspace::new();
    let cache = ws.cache();
    let key = CacheKey::new(fingerprint("bound <= 2.4"), "ppo", "latest");
    let artifact = ProofArtifact::proven("linarith");

    cache.put(&key, &artifact).unwrap();
    assert_eq!(cache.get(&key), Some(artifact.clone()));

    cache.put(&key, &artifact).unwrap();
    assert_eq!(cache.get(&key), Some(artifact));
    assert_eq!(cache.len().unwrap(), 1);
}

#[test]
fn algorithm_and_version_never_cross_resolve() {
    let ws = Workspace::new();
    let cache = ws.cache();
    let digest = fingerprint("bound <= 2.4");

    let ppo = CacheKey::new(digest.clone(), "ppo", "v1");
    let sac = CacheKey::new(digest.clone(), "sac", "v1");
    let ppo_v2 = CacheKey::new(digest, "ppo", "v2");

    cache.put(&ppo, &ProofArtifact::proven("ppo proof")).unwrap();
    assert_eq!(cache.get(&sac), None);
    assert_eq!(cache.get(&ppo_v2), None);

    cache.put(&sac, &ProofArtifact::proven("sac proof")).unwrap();
    assert_eq!(cache.get(&ppo).unwrap().proof(), "ppo proof");
    assert_eq!(cache.get(&sac).unwrap().proof(), "sac proof");
}

#[test]
fn mutated_spec_misses_against_original_entry() {
    let ws = Workspace::new();
    let cache = ws.cache();
    let toolchain = ToolchainVersion::latest();

    let original = canonicalize(&LeanRenderer, &cartpole_spec("2.4"), Algorithm::Ppo);
    let mutated = canonicalize(&LeanRenderer, &cartpole_spec("2.5"), Algorithm::Ppo);
    assert_ne!(original.digest(), mutated.digest());

    cache
        .put(&original.cache_key(&toolchain), &ProofArtifact::proven("linarith"))
        .unwrap();
    assert!(cache.get(&mutated.cache_key(&toolchain)).is_none());
    assert!(cache.get(&original.cache_key(&toolchain)).is_some());
}

#[test]
fn plain_text_mutation_changes_fingerprint() {
    assert_ne!(fingerprint("bound <= 2.4"), fingerprint("bound <= 2.5"));
}

#[test]
fn unicode_spec_round_trips_byte_for_byte() {
    let ws = Workspace::new();
    let spec = SafetySpecification::default().with_invariant("ℝ → ℝ, α ≤ β");
    let canonical = canonicalize(&LeanRenderer, &spec, Algorithm::Ddpg);
    assert!(canonical.as_str().contains("ℝ → ℝ, α ≤ β"));

    let key = canonical.cache_key(&ToolchainVersion::latest());
    let proof = "intro σ; exact ⟨le_refl _, by norm_num⟩ -- ℝ → ℝ, α ≤ β";
    ws.cache().put(&key, &ProofArtifact::proven(proof)).unwrap();

    let stored = ws.cache().get(&key).unwrap();
    assert_eq!(stored.proof().as_bytes(), proof.as_bytes());
}

#[test]
fn entries_survive_reopening_the_cache() {
    let ws = Workspace::new();
    let key = CacheKey::new(fingerprint("persist"), "sac", "v4.9.0");
    ws.cache()
        .put(&key, &ProofArtifact::degraded("oracle unavailable: offline"))
        .unwrap();

    let reopened = ws.cache();
    let artifact = reopened.get(&key).unwrap();
    assert!(artifact.is_degraded());
    assert_eq!(artifact.degraded_reason(), Some("oracle unavailable: offline"));
}

#[test]
fn delimiter_characters_do_not_alias_keys() {
    let ws = Workspace::new();
    let cache = ws.cache();
    let digest = fingerprint("x");
    let a = CacheKey::new(digest.clone(), "ppo:v1", "2");
    let b = CacheKey::new(digest, "ppo", "v1:2");

    cache.put(&a, &ProofArtifact::proven("a")).unwrap();
    assert_eq!(cache.get(&b), None);
    assert_ne!(cache.entry_path(&a), cache.entry_path(&b));
}

#[test]
fn clear_removes_everything() {
    let ws = Workspace::new();
    let cache = ws.cache();
    for algo in Algorithm::all() {
        let key = CacheKey::new(fingerprint("spec"), algo.as_str(), "latest");
        cache.put(&key, &ProofArtifact::proven("p")).unwrap();
    }
    assert_eq!(cache.clear().unwrap(), Algorithm::all().len());
    assert!(cache.is_empty().unwrap());
}
