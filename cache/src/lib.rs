//! Durable content-addressed proof cache.
//!
//! - Composite keys: (spec digest, algorithm, toolchain version)
//! - Path layout: `{cache_dir}/{first2}/{storage_id}.json`
//! - Versioned record format with the full key stored inline
//! - Atomic writes (temp + rename), last write wins
//! - Unreadable or mismatched records read as a miss
//!
//! All methods take `&self` and hold no in-memory state, so one `ProofCache`
//! can be shared behind an `Arc` and several processes can use the same
//! directory at once.

mod record;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use proofstack_types::{CacheKey, ProofArtifact};
use proofstack_utils::{AtomicWriteOptions, FileSyncPolicy, atomic_write_with_options};
use thiserror::Error;
use tracing::{debug, warn};

pub use record::{RECORD_VERSION, storage_id};
use record::CacheRecord;

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = ".proofstack_cache";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub dir: PathBuf,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_CACHE_DIR),
        }
    }
}

/// A validated cache record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub artifact: ProofArtifact,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a [`ProofCache::lookup`].
#[derive(Debug)]
pub enum CacheResult {
    Hit(CacheEntry),
    /// No record for this key.
    Miss,
    /// A record exists but cannot be used. Callers treat this as a miss.
    Corrupted(CacheReadError),
}

impl CacheResult {
    /// Collapse to the artifact, treating corruption as a miss.
    #[must_use]
    pub fn into_artifact(self) -> Option<ProofArtifact> {
        match self {
            Self::Hit(entry) => Some(entry.artifact),
            Self::Miss | Self::Corrupted(_) => None,
        }
    }
}

/// Why a stored record was rejected.
#[derive(Debug, Error)]
pub enum CacheReadError {
    #[error("record unreadable: {0}")]
    Unreadable(#[source] io::Error),
    #[error("record malformed: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("record format version {found} (expected {RECORD_VERSION})")]
    VersionMismatch { found: u32 },
    #[error("record belongs to a different key ({stored})")]
    KeyMismatch { stored: String },
    #[error("record has invalid timestamp {0:?}")]
    BadTimestamp(String),
}

#[derive(Debug, Error)]
#[error("failed to open cache directory {path}: {source}")]
pub struct CacheOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Error)]
pub enum CacheWriteError {
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Disk-backed proof cache.
#[derive(Debug, Clone)]
pub struct ProofCache {
    dir: PathBuf,
}

impl ProofCache {
    /// Open (creating if needed) the cache directory.
    pub fn new(settings: &CacheSettings) -> Result<Self, CacheOpenError> {
        let dir = settings.dir.clone();
        fs::create_dir_all(&dir).map_err(|source| CacheOpenError {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Like [`new`](Self::new), but an unusable directory only logs a warning.
    ///
    /// Lookups against such a cache miss and stores fail, which the pipeline
    /// already tolerates.
    pub fn open(settings: &CacheSettings) -> Self {
        match Self::new(settings) {
            Ok(cache) => cache,
            Err(error) => {
                warn!(%error, "Proof cache unavailable; runs will not reuse or store proofs");
                Self {
                    dir: settings.dir.clone(),
                }
            }
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Look up a key, reporting why a present record was rejected.
    pub fn lookup(&self, key: &CacheKey) -> CacheResult {
        let path = self.entry_path(key);

        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return CacheResult::Miss,
            Err(e) => return corrupted(&path, CacheReadError::Unreadable(e)),
        };

        let record: CacheRecord = match serde_json::from_str(&content) {
            Ok(r) => r,
            Err(e) => return corrupted(&path, CacheReadError::Malformed(e)),
        };

        // Rejected records are left in place; the caller's next put overwrites them.
        match record.into_entry(key) {
            Ok(entry) => {
                debug!(key = %key, origin = entry.artifact.origin().as_str(), "Cache hit");
                CacheResult::Hit(entry)
            }
            Err(e) => corrupted(&path, e),
        }
    }

    /// Cached artifact for `key`, if any usable record exists.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<ProofArtifact> {
        self.lookup(key).into_artifact()
    }

    /// Store `artifact` under `key`, replacing any previous record.
    ///
    /// Readers never observe a partially written record.
    pub fn put(&self, key: &CacheKey, artifact: &ProofArtifact) -> Result<(), CacheWriteError> {
        let record = CacheRecord::new(key, artifact, Utc::now());
        let bytes = serde_json::to_vec_pretty(&record)?;
        let path = self.entry_path(key);

        atomic_write_with_options(
            &path,
            &bytes,
            AtomicWriteOptions {
                file_sync: FileSyncPolicy::SyncAll,
                create_parent: true,
            },
        )?;

        debug!(key = %key, origin = artifact.origin().as_str(), "Cache store");
        Ok(())
    }

    /// Remove the record for `key`. Returns whether one existed.
    pub fn invalidate(&self, key: &CacheKey) -> io::Result<bool> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove every record. Returns the number of records removed.
    ///
    /// Stray temp files from interrupted writes are removed too but not counted.
    pub fn clear(&self) -> io::Result<usize> {
        let mut removed = 0;
        for shard in self.shards()? {
            for file in fs::read_dir(&shard)?.flatten() {
                let path = file.path();
                if !path.is_file() {
                    continue;
                }
                match fs::remove_file(&path) {
                    Ok(()) if is_record(&path) => removed += 1,
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
            // A concurrent writer may have repopulated the shard.
            let _ = fs::remove_dir(&shard);
        }
        debug!(dir = %self.dir.display(), removed, "Cache cleared");
        Ok(removed)
    }

    /// Number of records on disk, including ones that would read as corrupted.
    pub fn len(&self) -> io::Result<usize> {
        let mut count = 0;
        for shard in self.shards()? {
            count += fs::read_dir(&shard)?
                .flatten()
                .filter(|f| is_record(&f.path()))
                .count();
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        self.len().map(|n| n == 0)
    }

    /// Path of the record for `key`.
    ///
    /// Layout: `{cache_dir}/{first2}/{storage_id}.json`
    #[must_use]
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let id = storage_id(key);
        self.dir.join(&id[..2]).join(format!("{id}.json"))
    }

    fn shards(&self) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect())
    }
}

fn is_record(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "json")
}

fn corrupted(path: &Path, error: CacheReadError) -> CacheResult {
    warn!(path = %path.display(), "Ignoring cache record: {error}");
    CacheResult::Corrupted(error)
}
