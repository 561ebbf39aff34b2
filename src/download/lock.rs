//! One job per output path.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};

/// Registry of final paths that a job is currently writing.
#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    held: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path` until the returned guard is dropped.
    pub fn acquire(&self, path: &Path) -> Result<PathGuard> {
        if !self.lock().insert(path.to_path_buf()) {
            return Err(Error::PathBusy(path.to_path_buf()));
        }
        Ok(PathGuard {
            locks: self.clone(),
            path: path.to_path_buf(),
        })
    }

    pub fn is_held(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        // the set stays consistent even if a holder panicked
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases its path on drop.
#[derive(Debug)]
pub struct PathGuard {
    locks: PathLocks,
    path: PathBuf,
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        self.locks.lock().remove(&self.path);
    }
}
