//! The directory cache (`.git/index`).
//!
//! An on-disk snapshot mediating between working tree and next commit:
//! entries sorted by (path, stage), a TREE extension caching subtree
//! ids, and a trailing checksum. Rewrites are atomic: new content goes
//! to `index.lock`, then renames over the file.

mod builder;
mod entry;
mod read;
mod resolve_undo;
mod tree_ext;
mod write;

pub use builder::{DirCacheBuilder, DirCacheEditor};
pub use entry::{DirCacheEntry, EntryFlags, Stage, StatData};
pub use resolve_undo::{ResolveUndo, ResolveUndoEntry};
pub use tree_ext::{CacheTree, CacheTreeNode};

use std::path::{Path, PathBuf};

use bstr::BStr;
use ferrite_hash::Oid;

/// Errors of the dir-cache layer.
#[derive(Debug, thiserror::Error)]
pub enum DirCacheError {
    #[error("bad index header: {0}")]
    BadHeader(String),

    #[error("unsupported index version {0}")]
    BadVersion(u32),

    #[error("index checksum mismatch")]
    ChecksumMismatch,

    #[error("bad index entry at byte {at}: {reason}")]
    BadEntry { at: usize, reason: String },

    #[error("index entries out of order: {0} then {1}")]
    OutOfOrder(String, String),

    #[error("cannot write a tree from an unmerged index")]
    Unmerged,

    #[error("bad {sig} extension: {reason}")]
    BadExtension { sig: String, reason: String },

    #[error(transparent)]
    Lock(#[from] ferrite_util::UtilError),

    #[error(transparent)]
    Odb(#[from] ferrite_odb::OdbError),

    #[error(transparent)]
    Object(#[from] ferrite_object::ObjectError),

    #[error(transparent)]
    Id(#[from] ferrite_hash::IdError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An unknown extension preserved byte-for-byte for round-trips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExtension {
    pub signature: [u8; 4],
    pub payload: Vec<u8>,
}

/// The in-memory directory cache.
#[derive(Debug, Default)]
pub struct DirCache {
    version: u32,
    entries: Vec<DirCacheEntry>,
    cache_tree: Option<CacheTree>,
    resolve_undo: Option<ResolveUndo>,
    unknown_extensions: Vec<RawExtension>,
}

impl DirCache {
    /// An empty cache that writes as version 2.
    pub fn new() -> Self {
        Self {
            version: 2,
            ..Default::default()
        }
    }

    /// Read `path`; a missing file is an empty cache.
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, DirCacheError> {
        let file = match std::fs::File::open(path.as_ref()) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        let map = unsafe { memmap2::Mmap::map(&file)? };
        read::parse(&map)
    }

    /// Rewrite `path` atomically under its lock file.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), DirCacheError> {
        write::write(self, path.as_ref())
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DirCacheEntry] {
        &self.entries
    }

    /// The entry at `(path, stage)`.
    pub fn get(&self, path: &BStr, stage: Stage) -> Option<&DirCacheEntry> {
        self.position(path, stage).map(|at| &self.entries[at])
    }

    /// Every stage present for `path`.
    pub fn stages_of(&self, path: &BStr) -> Vec<&DirCacheEntry> {
        self.entries
            .iter()
            .filter(|e| e.path.as_slice() == &path[..])
            .collect()
    }

    /// Does any path carry a conflict stage?
    pub fn has_conflicts(&self) -> bool {
        self.entries.iter().any(|e| e.stage != Stage::Merged)
    }

    pub fn cache_tree(&self) -> Option<&CacheTree> {
        self.cache_tree.as_ref()
    }

    pub fn set_cache_tree(&mut self, tree: Option<CacheTree>) {
        self.cache_tree = tree;
    }

    pub fn resolve_undo(&self) -> Option<&ResolveUndo> {
        self.resolve_undo.as_ref()
    }

    pub fn set_resolve_undo(&mut self, reuc: Option<ResolveUndo>) {
        self.resolve_undo = reuc;
    }

    pub fn unknown_extensions(&self) -> &[RawExtension] {
        &self.unknown_extensions
    }

    /// Build the tree objects this cache describes, writing new trees to
    /// `store` and reusing ids from valid cache-tree nodes.
    pub fn write_tree(&mut self, store: &ferrite_odb::ObjectStore) -> Result<Oid, DirCacheError> {
        write::write_tree(self, store)
    }

    pub(crate) fn position(&self, path: &BStr, stage: Stage) -> Option<usize> {
        self.entries
            .binary_search_by(|e| {
                e.path
                    .as_slice()
                    .cmp(&path[..])
                    .then(e.stage.as_byte().cmp(&stage.as_byte()))
            })
            .ok()
    }

    pub(crate) fn from_parts(
        version: u32,
        entries: Vec<DirCacheEntry>,
        cache_tree: Option<CacheTree>,
        resolve_undo: Option<ResolveUndo>,
        unknown_extensions: Vec<RawExtension>,
    ) -> Self {
        Self {
            version,
            entries,
            cache_tree,
            resolve_undo,
            unknown_extensions,
        }
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Vec<DirCacheEntry> {
        &mut self.entries
    }

    pub(crate) fn cache_tree_mut(&mut self) -> &mut Option<CacheTree> {
        &mut self.cache_tree
    }

    pub(crate) fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}

/// The conventional location of the index inside a git dir.
pub fn index_path(git_dir: &Path) -> PathBuf {
    git_dir.join("index")
}
