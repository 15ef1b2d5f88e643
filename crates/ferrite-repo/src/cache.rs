//! The process-wide repository registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::{RepoError, Repository};

/// One cache slot: the shared instance and how many holders it has.
struct Slot {
    repo: Arc<Repository>,
    holders: usize,
}

/// Registry keyed by canonical git-dir path.
///
/// `open` either hands out the existing instance (bumping its count) or
/// opens and registers a new one; `close` drops a count and evicts the
/// slot when the last holder is gone. All three transitions happen under
/// one lock, so register/open/unregister are atomic with respect to one
/// another.
#[derive(Default)]
pub struct RepoCache {
    slots: Mutex<HashMap<PathBuf, Slot>>,
}

impl RepoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or share) the repository at `git_dir`.
    pub fn open(&self, git_dir: impl AsRef<Path>) -> Result<Arc<Repository>, RepoError> {
        let canonical = canonicalize(git_dir.as_ref())?;
        let mut slots = self.slots.lock().unwrap();
        if let Some(slot) = slots.get_mut(&canonical) {
            slot.holders += 1;
            return Ok(Arc::clone(&slot.repo));
        }

        let repo = Arc::new(Repository::open(&canonical)?);
        slots.insert(
            canonical,
            Slot {
                repo: Arc::clone(&repo),
                holders: 1,
            },
        );
        Ok(repo)
    }

    /// Release one hold. The slot disappears when the count hits zero.
    pub fn close(&self, repo: &Arc<Repository>) {
        let mut slots = self.slots.lock().unwrap();
        let key = repo.git_dir().to_path_buf();
        if let Some(slot) = slots.get_mut(&key) {
            slot.holders -= 1;
            if slot.holders == 0 {
                slots.remove(&key);
            }
        }
    }

    /// How many distinct repositories are registered.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf, RepoError> {
    path.canonicalize().map_err(|_| RepoError::NotFound(path.to_path_buf()))
}
