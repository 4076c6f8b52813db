//! Shared infrastructure utilities for proofstack.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`staged_dir`**: Crash-safe directory publication (stage + rename)

pub mod atomic_write;
pub mod staged_dir;

pub use atomic_write::{AtomicWriteOptions, FileSyncPolicy, atomic_write, atomic_write_with_options};
pub use staged_dir::StagedDir;
