//! Attestation bundles.
//!
//! A bundle is the deliverable of a run: the proved Lean module, the raw proof,
//! the runtime guard, the input specification and a manifest tying them together
//! with content hashes. Files are assembled in a staging directory and renamed
//! into place as a unit, so a bundle directory that exists is always complete.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use proofstack_types::{
    Algorithm, ArtifactOrigin, Digest, ProofArtifact, SafetySpecification, ToolchainVersion,
    fingerprint_bytes,
};
use proofstack_utils::StagedDir;
use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalText;
use crate::error::ArtifactError;
use crate::guard::{GUARD_FILE, GeneratedGuard};
use crate::lean::insert_proof;
use crate::state::CacheOutcome;

pub const BUNDLE_FORMAT_VERSION: u32 = 1;

pub const LEAN_FILE: &str = "safety_proof.lean";
pub const PROOF_FILE: &str = "proof.txt";
pub const SPEC_FILE: &str = "spec.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Inputs for one bundling call.
#[derive(Debug, Clone, Copy)]
pub struct BundleInput<'a> {
    pub spec: &'a SafetySpecification,
    pub canonical: &'a CanonicalText,
    pub toolchain: &'a ToolchainVersion,
    pub artifact: &'a ProofArtifact,
    pub cache: CacheOutcome,
    pub guard: &'a GeneratedGuard,
}

/// Packages a run's artifacts. Called exactly once per run.
pub trait AttestationBundler: Send + Sync {
    fn bundle(&self, input: &BundleInput<'_>) -> Result<BundleHandle, ArtifactError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub format_version: u32,
    pub digest: Digest,
    pub algorithm: Algorithm,
    pub toolchain_version: String,
    pub cache: CacheOutcome,
    pub origin: ArtifactOrigin,
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    /// File name to SHA-256 of its contents. Excludes the manifest itself.
    pub files: BTreeMap<String, Digest>,
    pub created_at: String,
}

/// Location of a published bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleHandle {
    pub path: PathBuf,
    pub manifest: BundleManifest,
}

/// Publishes bundles as a directory at a fixed location, replacing the previous one.
#[derive(Debug, Clone)]
pub struct DirectoryBundler {
    out_dir: PathBuf,
}

impl DirectoryBundler {
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

impl AttestationBundler for DirectoryBundler {
    fn bundle(&self, input: &BundleInput<'_>) -> Result<BundleHandle, ArtifactError> {
        let staged = StagedDir::new(&self.out_dir).map_err(ArtifactError::io(&self.out_dir))?;
        let mut files = BTreeMap::new();

        let lean = insert_proof(input.canonical.as_str(), input.artifact.proof());
        write_file(staged.path(), LEAN_FILE, lean.as_bytes(), &mut files)?;
        write_file(
            staged.path(),
            PROOF_FILE,
            input.artifact.proof().as_bytes(),
            &mut files,
        )?;

        write_file(
            staged.path(),
            GUARD_FILE,
            input.guard.source.as_bytes(),
            &mut files,
        )?;

        let spec_json =
            serde_json::to_vec_pretty(input.spec).map_err(|source| ArtifactError::Serialize {
                what: "specification",
                source,
            })?;
        write_file(staged.path(), SPEC_FILE, &spec_json, &mut files)?;

        let manifest = BundleManifest {
            format_version: BUNDLE_FORMAT_VERSION,
            digest: input.canonical.digest().clone(),
            algorithm: input.canonical.algorithm(),
            toolchain_version: input.toolchain.as_str().to_string(),
            cache: input.cache,
            origin: input.artifact.origin(),
            degraded: input.artifact.is_degraded(),
            degraded_reason: input.artifact.degraded_reason().map(str::to_string),
            files,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        let manifest_json =
            serde_json::to_vec_pretty(&manifest).map_err(|source| ArtifactError::Serialize {
                what: "bundle manifest",
                source,
            })?;
        let manifest_path = staged.path().join(MANIFEST_FILE);
        fs::write(&manifest_path, manifest_json).map_err(ArtifactError::io(&manifest_path))?;

        let path = staged.publish().map_err(ArtifactError::io(&self.out_dir))?;
        tracing::debug!(path = %path.display(), files = manifest.files.len() + 1, "Published attestation bundle");
        Ok(BundleHandle { path, manifest })
    }
}

fn write_file(
    dir: &Path,
    name: &str,
    bytes: &[u8],
    hashes: &mut BTreeMap<String, Digest>,
) -> Result<(), ArtifactError> {
    let path = dir.join(name);
    fs::write(&path, bytes).map_err(ArtifactError::io(&path))?;
    hashes.insert(name.to_string(), fingerprint_bytes(bytes));
    Ok(())
}

/// File name to size in bytes for every regular file in a bundle directory.
pub fn list_artifacts(bundle_dir: &Path) -> io::Result<BTreeMap<String, u64>> {
    let mut artifacts = BTreeMap::new();
    for entry in fs::read_dir(bundle_dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_file() {
            artifacts.insert(entry.file_name().to_string_lossy().into_owned(), meta.len());
        }
    }
    Ok(artifacts)
}

/// Read back the manifest of a published bundle.
pub fn read_manifest(bundle_dir: &Path) -> Result<BundleManifest, ArtifactError> {
    let path = bundle_dir.join(MANIFEST_FILE);
    let bytes = fs::read(&path).map_err(ArtifactError::io(&path))?;
    serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Serialize {
        what: "bundle manifest",
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::canonicalize;
    use crate::lean::LeanRenderer;

    struct Fixture {
        _root: tempfile::TempDir,
        out: PathBuf,
        guard: GeneratedGuard,
        spec: SafetySpecification,
        canonical: CanonicalText,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let guard = GeneratedGuard {
            path: root.path().join("guard.c"),
            source: "bool check_safety(void);\n".to_string(),
        };
        let spec = SafetySpecification::default().with_invariant("ℝ → ℝ, α ≤ β");
        let canonical = canonicalize(&LeanRenderer, &spec, Algorithm::Ppo);
        Fixture {
            out: root.path().join("bundle"),
            _root: root,
            guard,
            spec,
            canonical,
        }
    }

    #[test]
    fn bundle_contains_every_artifact_and_hashes() {
        let f = fixture();
        let artifact = ProofArtifact::proven("linarith");
        let handle = DirectoryBundler::new(&f.out)
            .bundle(&BundleInput {
                spec: &f.spec,
                canonical: &f.canonical,
                toolchain: &ToolchainVersion::latest(),
                artifact: &artifact,
                cache: CacheOutcome::Miss,
                guard: &f.guard,
            })
            .unwrap();

        assert_eq!(handle.path, f.out);
        let listed = list_artifacts(&handle.path).unwrap();
        let names: Vec<_> = listed.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![GUARD_FILE, MANIFEST_FILE, PROOF_FILE, LEAN_FILE, SPEC_FILE]
        );

        let lean = fs::read_to_string(handle.path.join(LEAN_FILE)).unwrap();
        assert!(lean.contains("  linarith\n"));
        assert!(!lean.lines().any(|l| l == "  sorry"));

        let manifest = read_manifest(&handle.path).unwrap();
        assert_eq!(manifest, handle.manifest);
        assert_eq!(manifest.digest, *f.canonical.digest());
        assert_eq!(manifest.origin, ArtifactOrigin::Oracle);
        assert!(!manifest.degraded);
        assert_eq!(
            manifest.files[PROOF_FILE],
            fingerprint_bytes(b"linarith")
        );
    }

    #[test]
    fn degraded_artifact_is_flagged_in_manifest() {
        let f = fixture();
        let artifact = ProofArtifact::degraded("oracle did not answer within 120s");
        let handle = DirectoryBundler::new(&f.out)
            .bundle(&BundleInput {
                spec: &f.spec,
                canonical: &f.canonical,
                toolchain: &ToolchainVersion::latest(),
                artifact: &artifact,
                cache: CacheOutcome::Bypassed,
                guard: &f.guard,
            })
            .unwrap();

        assert!(handle.manifest.degraded);
        assert_eq!(handle.manifest.origin, ArtifactOrigin::Degraded);
        assert_eq!(
            handle.manifest.degraded_reason.as_deref(),
            Some("oracle did not answer within 120s")
        );
        assert_eq!(handle.manifest.cache, CacheOutcome::Bypassed);
    }

    #[test]
    fn bundled_guard_comes_from_the_run_not_the_disk() {
        let f = fixture();
        fs::write(&f.guard.path, "// written by another run\n").unwrap();
        let artifact = ProofArtifact::proven("linarith");
        let handle = DirectoryBundler::new(&f.out)
            .bundle(&BundleInput {
                spec: &f.spec,
                canonical: &f.canonical,
                toolchain: &ToolchainVersion::latest(),
                artifact: &artifact,
                cache: CacheOutcome::Miss,
                guard: &f.guard,
            })
            .unwrap();

        let bundled = fs::read_to_string(handle.path.join(GUARD_FILE)).unwrap();
        assert_eq!(bundled, f.guard.source);
        assert_eq!(
            handle.manifest.files[GUARD_FILE],
            fingerprint_bytes(f.guard.source.as_bytes())
        );
    }

    #[test]
    fn failed_bundle_leaves_no_directory() {
        let f = fixture();
        let blocker = f.out.with_file_name("blocker");
        fs::write(&blocker, "").unwrap();
        let out = blocker.join("bundle");
        let artifact = ProofArtifact::proven("linarith");
        let err = DirectoryBundler::new(&out)
            .bundle(&BundleInput {
                spec: &f.spec,
                canonical: &f.canonical,
                toolchain: &ToolchainVersion::latest(),
                artifact: &artifact,
                cache: CacheOutcome::Miss,
                guard: &f.guard,
            })
            .unwrap_err();

        assert!(matches!(err, ArtifactError::Io { .. }));
        assert!(!out.exists());
        assert!(!f.out.exists());
    }
}
