//! Directory-level counterpart to [`crate::atomic_write`].
//!
//! Files are assembled in a hidden staging directory next to the destination and
//! the whole directory is renamed into place by [`StagedDir::publish`]. Dropping a
//! `StagedDir` without publishing removes the staging directory, so a failure
//! half-way through never leaves a destination that looks complete.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::TempDir;

#[derive(Debug)]
pub struct StagedDir {
    staging: TempDir,
    dest: PathBuf,
}

impl StagedDir {
    pub fn new(dest: impl Into<PathBuf>) -> io::Result<Self> {
        let dest = dest.into();
        let parent = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "staged".to_string());
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{name}.staging-"))
            .tempdir_in(&parent)?;

        Ok(Self { staging, dest })
    }

    /// Directory to write staged files into.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.staging.path()
    }

    /// Move the staged directory to its destination, replacing any previous one.
    ///
    /// Another publisher racing for the same destination can land between
    /// moving the old directory aside and renaming ours in; that case is retried.
    pub fn publish(self) -> io::Result<PathBuf> {
        let mut replaced = Vec::new();
        let mut attempts = 0;

        loop {
            if self.dest.exists() {
                let aside = aside_path(&self.dest);
                match fs::rename(&self.dest, &aside) {
                    Ok(()) => replaced.push(aside),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }

            match fs::rename(self.staging.path(), &self.dest) {
                Ok(()) => break,
                Err(_) if attempts < MAX_PUBLISH_ATTEMPTS && self.dest.exists() => {
                    attempts += 1;
                }
                Err(e) => {
                    if let Some(aside) = replaced.pop()
                        && !self.dest.exists()
                    {
                        let _ = fs::rename(aside, &self.dest);
                    }
                    return Err(e);
                }
            }
        }

        for aside in replaced {
            if let Err(e) = fs::remove_dir_all(&aside) {
                tracing::warn!(path = %aside.display(), "Failed to remove replaced directory: {e}");
            }
        }

        tracing::debug!(path = %self.dest.display(), "Published staged directory");
        // `staging` now points at a path that no longer exists; its drop is a no-op.
        Ok(self.dest)
    }
}

const MAX_PUBLISH_ATTEMPTS: usize = 8;

fn aside_path(dest: &Path) -> PathBuf {
    static PUBLISHES: AtomicU64 = AtomicU64::new(0);
    let seq = PUBLISHES.fetch_add(1, Ordering::Relaxed);
    sibling_with_suffix(dest, &format!("previous-{}-{seq}", std::process::id()))
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{suffix}"));
    path.with_file_name(name)
}
