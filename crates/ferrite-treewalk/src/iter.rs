//! The closed set of tree sources.
//!
//! Every source answers one question: "list the directory level at this
//! path prefix, in tree order". The walk in `walk.rs` drives any mix of
//! them in lock-step.

use std::path::PathBuf;

use bstr::{BString, ByteSlice};
use ferrite_hash::{HashKind, ObjectHasher, Oid};
use ferrite_object::{tree_entry_cmp, EntryMode, ObjectKind, Tree};
use ferrite_odb::ObjectStore;

use crate::TreeWalkError;

/// One positioned entry of a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterEntry {
    pub mode: EntryMode,
    pub name: BString,
    /// The entry's object id. A dir-cache subtree has none (the cache
    /// stores blobs; subtree ids live in the TREE extension only).
    pub oid: Option<Oid>,
}

impl IterEntry {
    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }

    /// Git tree-order comparison (directories sort with a virtual `/`).
    pub fn cmp_order(&self, other: &IterEntry) -> std::cmp::Ordering {
        tree_entry_cmp(&self.name, self.is_tree(), &other.name, other.is_tree())
    }
}

/// A tree source. The set is closed: these four are the only shapes the
/// walk knows how to descend into.
pub enum TreeIter<'a> {
    /// Nothing at any level (the "compare against an absent side").
    Empty,
    /// A tree object (and its subtrees) from the object store.
    Canonical { store: &'a ObjectStore, root: Oid },
    /// The dir-cache, viewed as a tree.
    DirCache {
        cache: &'a ferrite_dircache::DirCache,
    },
    /// Files on disk under a root directory. `.git` is never listed;
    /// blobs hash during listing so ids compare across sources.
    Worktree { root: PathBuf },
}

impl<'a> TreeIter<'a> {
    pub fn empty() -> Self {
        TreeIter::Empty
    }

    pub fn canonical(store: &'a ObjectStore, root: Oid) -> Self {
        TreeIter::Canonical { store, root }
    }

    pub fn dircache(cache: &'a ferrite_dircache::DirCache) -> Self {
        TreeIter::DirCache { cache }
    }

    pub fn worktree(root: impl Into<PathBuf>) -> Self {
        TreeIter::Worktree { root: root.into() }
    }

    /// Materialize the directory level at `prefix` (`""` or ending in
    /// `/`). For canonical sources descending a level, `subtree` names
    /// the tree object to open; `None` means the root.
    pub(crate) fn open_level(
        &self,
        prefix: &[u8],
        subtree: Option<&Oid>,
    ) -> Result<Vec<IterEntry>, TreeWalkError> {
        match self {
            TreeIter::Empty => Ok(Vec::new()),
            TreeIter::Canonical { store, root } => {
                let tree_oid = subtree.copied().unwrap_or(*root);
                canonical_level(store, &tree_oid)
            }
            TreeIter::DirCache { cache } => Ok(dircache_level(cache, prefix)),
            TreeIter::Worktree { root } => {
                let dir = if prefix.is_empty() {
                    root.clone()
                } else {
                    root.join(String::from_utf8_lossy(&prefix[..prefix.len() - 1]).as_ref())
                };
                worktree_level(&dir)
            }
        }
    }
}

fn canonical_level(store: &ObjectStore, tree: &Oid) -> Result<Vec<IterEntry>, TreeWalkError> {
    let data = store.open_object(tree, Some(ObjectKind::Tree))?;
    let parsed = Tree::parse(&data.data)?;
    Ok(parsed
        .entries()
        .iter()
        .map(|e| IterEntry {
            mode: e.mode,
            name: e.name.clone(),
            oid: Some(e.oid),
        })
        .collect())
}

fn dircache_level(cache: &ferrite_dircache::DirCache, prefix: &[u8]) -> Vec<IterEntry> {
    let mut entries: Vec<IterEntry> = Vec::new();
    let mut last_dir: Option<BString> = None;

    for entry in cache.entries() {
        if !entry.path.starts_with(prefix) {
            continue;
        }
        let rest = &entry.path[prefix.len()..];
        match rest.find_byte(b'/') {
            None => entries.push(IterEntry {
                mode: entry.mode,
                name: BString::from(rest),
                oid: Some(entry.oid),
            }),
            Some(slash) => {
                // Same-directory paths are contiguous in index order, so
                // one look-back suffices to deduplicate.
                let dir = BString::from(&rest[..slash]);
                if last_dir.as_ref() != Some(&dir) {
                    entries.push(IterEntry {
                        mode: EntryMode::Directory,
                        name: dir.clone(),
                        oid: None,
                    });
                    last_dir = Some(dir);
                }
            }
        }
    }

    entries.sort_by(|a, b| a.cmp_order(b));
    entries
}

fn worktree_level(dir: &std::path::Path) -> Result<Vec<IterEntry>, TreeWalkError> {
    let mut entries = Vec::new();
    let listing = match std::fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
        Err(e) => return Err(e.into()),
    };

    for dirent in listing {
        let dirent = dirent?;
        let name = BString::from(dirent.file_name().to_string_lossy().as_bytes());
        if name == ".git" {
            continue;
        }
        let meta = dirent.metadata()?;
        let path = dirent.path();

        let (mode, oid) = if meta.file_type().is_symlink() {
            let target = std::fs::read_link(&path)?;
            let bytes = target.to_string_lossy().into_owned().into_bytes();
            (
                EntryMode::Symlink,
                Some(ObjectHasher::object_id(HashKind::Sha1, "blob", &bytes)?),
            )
        } else if meta.is_dir() {
            (EntryMode::Directory, None)
        } else {
            let content = std::fs::read(&path)?;
            (
                executable_mode(&meta),
                Some(ObjectHasher::object_id(HashKind::Sha1, "blob", &content)?),
            )
        };

        entries.push(IterEntry { mode, name, oid });
    }

    entries.sort_by(|a, b| a.cmp_order(b));
    Ok(entries)
}

#[cfg(unix)]
fn executable_mode(meta: &std::fs::Metadata) -> EntryMode {
    use std::os::unix::fs::PermissionsExt;
    if meta.permissions().mode() & 0o111 != 0 {
        EntryMode::Executable
    } else {
        EntryMode::Regular
    }
}

#[cfg(not(unix))]
fn executable_mode(_meta: &std::fs::Metadata) -> EntryMode {
    EntryMode::Regular
}
