//! Pairing paths across two trees.

use bstr::BString;
use ferrite_hash::Oid;
use ferrite_object::EntryMode;
use ferrite_odb::ObjectStore;
use ferrite_treewalk::{TreeIter, TreeWalk};

use crate::DiffError;

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Deleted,
    Modified,
    /// Rewritten from `old_path`; carries the similarity score (100 =
    /// exact content match).
    Renamed { score: u8 },
    /// Mode flip with identical content (644 ↔ 755).
    ModeChanged,
}

/// One changed path between two trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub kind: ChangeKind,
    pub old_path: Option<BString>,
    pub new_path: Option<BString>,
    pub old_mode: Option<EntryMode>,
    pub new_mode: Option<EntryMode>,
    pub old_oid: Option<Oid>,
    pub new_oid: Option<Oid>,
}

impl DiffEntry {
    /// The path to display (new side wins for renames).
    pub fn path(&self) -> &BString {
        self.new_path
            .as_ref()
            .or(self.old_path.as_ref())
            .expect("a diff entry has at least one path")
    }
}

/// Compare two trees recursively, producing one entry per changed blob
/// path. `None` stands for the empty tree on that side.
pub fn tree_diff(
    store: &ObjectStore,
    old: Option<&Oid>,
    new: Option<&Oid>,
) -> Result<Vec<DiffEntry>, DiffError> {
    let old_iter = match old {
        Some(oid) => TreeIter::canonical(store, *oid),
        None => TreeIter::empty(),
    };
    let new_iter = match new {
        Some(oid) => TreeIter::canonical(store, *oid),
        None => TreeIter::empty(),
    };

    let mut walk = TreeWalk::new(vec![old_iter, new_iter])?;
    let mut entries = Vec::new();

    while let Some(step) = walk.next()? {
        let old_entry = step.entry(0).cloned();
        let new_entry = step.entry(1).cloned();

        // Unchanged subtree: same id on both sides, skip wholesale.
        if step.is_subtree() {
            let same = match (&old_entry, &new_entry) {
                (Some(o), Some(n)) => o.oid.is_some() && o.oid == n.oid,
                _ => false,
            };
            if !same {
                walk.enter_subtree()?;
            }
            continue;
        }

        match (old_entry, new_entry) {
            (None, Some(added)) if !added.is_tree() => entries.push(DiffEntry {
                kind: ChangeKind::Added,
                old_path: None,
                new_path: Some(step.path.clone()),
                old_mode: None,
                new_mode: Some(added.mode),
                old_oid: None,
                new_oid: added.oid,
            }),
            (Some(deleted), None) if !deleted.is_tree() => entries.push(DiffEntry {
                kind: ChangeKind::Deleted,
                old_path: Some(step.path.clone()),
                new_path: None,
                old_mode: Some(deleted.mode),
                new_mode: None,
                old_oid: deleted.oid,
                new_oid: None,
            }),
            (Some(before), Some(after)) => {
                if before.oid == after.oid && before.mode == after.mode {
                    continue;
                }
                let kind = if before.oid == after.oid {
                    ChangeKind::ModeChanged
                } else {
                    ChangeKind::Modified
                };
                entries.push(DiffEntry {
                    kind,
                    old_path: Some(step.path.clone()),
                    new_path: Some(step.path.clone()),
                    old_mode: Some(before.mode),
                    new_mode: Some(after.mode),
                    old_oid: before.oid,
                    new_oid: after.oid,
                });
            }
            _ => {}
        }
    }

    Ok(entries)
}
