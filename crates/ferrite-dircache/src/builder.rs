//! Building and editing caches.
//!
//! `DirCacheBuilder` rebuilds from scratch: feed entries in any order,
//! it sorts once and verifies uniqueness. `DirCacheEditor` mutates an
//! existing cache path by path, keeping the sort invariant and
//! invalidating the cache tree along every touched path.

use bstr::BStr;

use crate::entry::{DirCacheEntry, Stage};
use crate::{DirCache, DirCacheError};

/// Bulk construction of a fresh cache.
#[derive(Debug, Default)]
pub struct DirCacheBuilder {
    entries: Vec<DirCacheEntry>,
    version: u32,
}

impl DirCacheBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            version: 2,
        }
    }

    /// Target a specific on-disk version (2, 3 or 4).
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn add(&mut self, entry: DirCacheEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Sort, verify uniqueness of `(path, stage)`, and produce the cache.
    pub fn finish(mut self) -> Result<DirCache, DirCacheError> {
        self.entries.sort_by(|a, b| a.key().cmp(&b.key()));
        for pair in self.entries.windows(2) {
            if pair[0].key() == pair[1].key() {
                return Err(DirCacheError::OutOfOrder(
                    pair[0].path.to_string(),
                    pair[1].path.to_string(),
                ));
            }
        }
        let mut cache = DirCache::new();
        cache.set_version(self.version);
        *cache.entries_mut() = self.entries;
        Ok(cache)
    }
}

/// Path-level mutation of an existing cache.
pub struct DirCacheEditor<'a> {
    cache: &'a mut DirCache,
}

impl<'a> DirCacheEditor<'a> {
    pub fn new(cache: &'a mut DirCache) -> Self {
        Self { cache }
    }

    /// Insert or replace the entry at `(path, stage)`.
    pub fn upsert(&mut self, entry: DirCacheEntry) {
        self.invalidate(entry.path.as_ref());
        let entries = self.cache.entries_mut();
        match entries.binary_search_by(|e| e.key().cmp(&entry.key())) {
            Ok(at) => entries[at] = entry,
            Err(at) => entries.insert(at, entry),
        }
    }

    /// Remove the entry at `(path, stage)`. Returns whether one existed.
    pub fn remove(&mut self, path: &BStr, stage: Stage) -> bool {
        match self.cache.position(path, stage) {
            Some(at) => {
                self.invalidate(path);
                self.cache.entries_mut().remove(at);
                true
            }
            None => false,
        }
    }

    /// Replace a stage-0 entry with conflict stages 1–3.
    pub fn set_conflict(
        &mut self,
        base: Option<DirCacheEntry>,
        ours: Option<DirCacheEntry>,
        theirs: Option<DirCacheEntry>,
    ) {
        let path = base
            .as_ref()
            .or(ours.as_ref())
            .or(theirs.as_ref())
            .map(|e| e.path.clone());
        let Some(path) = path else { return };

        self.remove(path.as_ref(), Stage::Merged);
        for (entry, stage) in [
            (base, Stage::Base),
            (ours, Stage::Ours),
            (theirs, Stage::Theirs),
        ] {
            if let Some(entry) = entry {
                self.upsert(entry.at_stage(stage));
            }
        }
    }

    /// Collapse conflict stages back to one stage-0 entry.
    pub fn resolve(&mut self, resolution: DirCacheEntry) {
        let path = resolution.path.clone();
        for stage in [Stage::Base, Stage::Ours, Stage::Theirs] {
            self.remove(path.as_ref(), stage);
        }
        self.upsert(resolution.at_stage(Stage::Merged));
    }

    fn invalidate(&mut self, path: &BStr) {
        if let Some(tree) = self.cache.cache_tree_mut() {
            tree.invalidate(path);
        }
    }
}
