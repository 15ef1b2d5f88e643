//! Multi-ref transactions for atomic pushes.
//!
//! Two-phase: take every lock and verify every expectation first, then
//! commit all writes. Any failure in phase one releases every lock with
//! nothing changed, which is the all-or-nothing the `atomic` push
//! capability promises.

use std::io::Write;
use std::path::Path;

use bstr::BString;
use ferrite_hash::Oid;
use ferrite_util::{Ident, LockError, LockFile, UtilError};

use crate::packed::PackedRefs;
use crate::reflog::{self, ReflogEntry};
use crate::update::UpdateOutcome;
use crate::{loose, Ref, RefError, RefName};

/// What one edit in a transaction does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefEditKind {
    /// Create; the ref must not exist.
    Create { new: Oid },
    /// Update; the stored value must equal `old`.
    Update { old: Oid, new: Oid },
    /// Delete; the stored value must equal `old`.
    Delete { old: Oid },
}

/// One named edit.
#[derive(Debug, Clone)]
pub struct RefEdit {
    pub name: RefName,
    pub kind: RefEditKind,
    pub message: Option<BString>,
}

/// An all-or-nothing batch of ref edits.
#[derive(Debug, Default)]
pub struct Transaction {
    edits: Vec<RefEdit>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, edit: RefEdit) -> &mut Self {
        self.edits.push(edit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn edits(&self) -> &[RefEdit] {
        &self.edits
    }

    /// Apply every edit or none.
    ///
    /// Returns per-edit outcomes in input order. If any expectation or
    /// lock fails, the failing outcome is reported for that edit,
    /// `NotAttempted` for every other, and the store is untouched.
    pub fn commit(
        self,
        git_dir: &Path,
        who: Option<&Ident>,
    ) -> Result<Vec<UpdateOutcome>, RefError> {
        if self.edits.is_empty() {
            return Ok(Vec::new());
        }

        let packed = PackedRefs::load(git_dir)?;

        // Phase 1: all locks, all checks.
        let mut locks: Vec<LockFile> = Vec::with_capacity(self.edits.len());
        let mut stored: Vec<Option<Oid>> = Vec::with_capacity(self.edits.len());

        for (at, edit) in self.edits.iter().enumerate() {
            let target = loose::ref_path(git_dir, &edit.name);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let lock = match LockFile::take(&target) {
                Ok(lock) => lock,
                Err(UtilError::Lock(LockError::Held { .. })) => {
                    return Ok(failed_at(&self.edits, at, UpdateOutcome::LockFailure));
                }
                Err(e) => return Err(e.into()),
            };

            let current = match loose::read(git_dir, &edit.name)? {
                Some(Ref::Direct { target, .. }) => Some(target),
                Some(Ref::Symbolic { .. }) => {
                    return Err(RefError::InvalidTarget(edit.name.to_string()));
                }
                None => packed.find(&edit.name).map(|r| r.oid),
            };

            let expected = match &edit.kind {
                RefEditKind::Create { .. } => None,
                RefEditKind::Update { old, .. } | RefEditKind::Delete { old } => Some(*old),
            };
            if current != expected {
                return Ok(failed_at(
                    &self.edits,
                    at,
                    UpdateOutcome::Rejected { stored: current },
                ));
            }

            locks.push(lock);
            stored.push(current);
        }

        // Phase 2: commit everything. Failures here are I/O level; the
        // earlier edits stay applied, like C git's receive-pack.
        let mut outcomes = Vec::with_capacity(self.edits.len());
        let mut deleted_any = false;
        for (edit, lock) in self.edits.iter().zip(locks.into_iter()) {
            match &edit.kind {
                RefEditKind::Create { new } | RefEditKind::Update { new, .. } => {
                    let mut lock = lock;
                    lock.write_all(format!("{}\n", new.to_hex()).as_bytes())?;
                    lock.commit()?;
                    outcomes.push(match edit.kind {
                        RefEditKind::Create { .. } => UpdateOutcome::New,
                        _ => UpdateOutcome::FastForward,
                    });
                }
                RefEditKind::Delete { .. } => {
                    lock.discard()?;
                    loose::delete(git_dir, &edit.name)?;
                    deleted_any = true;
                    outcomes.push(UpdateOutcome::Forced);
                }
            }
        }

        if deleted_any {
            let mut rewritten = packed.clone();
            let mut changed = false;
            for edit in &self.edits {
                if matches!(edit.kind, RefEditKind::Delete { .. }) {
                    changed |= rewritten.remove(&edit.name);
                }
            }
            if changed {
                rewritten.store(git_dir)?;
            }
        }

        if let Some(who) = who {
            for (at, edit) in self.edits.iter().enumerate() {
                let Some(message) = &edit.message else { continue };
                let new = match &edit.kind {
                    RefEditKind::Create { new } | RefEditKind::Update { new, .. } => *new,
                    RefEditKind::Delete { .. } => Oid::ZERO_SHA1,
                };
                reflog::append(
                    git_dir,
                    &edit.name,
                    &ReflogEntry {
                        old: stored[at].unwrap_or(Oid::ZERO_SHA1),
                        new,
                        who: who.clone(),
                        message: message.clone(),
                    },
                )?;
            }
        }

        Ok(outcomes)
    }
}

fn failed_at(edits: &[RefEdit], at: usize, failure: UpdateOutcome) -> Vec<UpdateOutcome> {
    (0..edits.len())
        .map(|i| {
            if i == at {
                failure.clone()
            } else {
                UpdateOutcome::NotAttempted
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RefStore;

    fn oid(n: u8) -> Oid {
        let mut raw = [0u8; 20];
        raw[19] = n;
        Oid::from_raw(&raw, ferrite_hash::HashKind::Sha1).unwrap()
    }

    fn name(s: &str) -> RefName {
        RefName::new(s).unwrap()
    }

    #[test]
    fn all_edits_apply_together() {
        let dir = tempfile::tempdir().unwrap();
        let store = RefStore::new(dir.path());
        store.update(name("refs/heads/main"), oid(1)).apply().unwrap();

        let mut tx = Transaction::new();
        tx.add(RefEdit {
            name: name("refs/heads/main"),
            kind: RefEditKind::Update {
                old: oid(1),
                new: oid(2),
            },
            message: None,
        });
        tx.add(RefEdit {
            name: name("refs/heads/topic"),
            kind: RefEditKind::Create { new: oid(3) },
            message: None,
        });

        let outcomes = tx.commit(dir.path(), None).unwrap();
        assert!(outcomes.iter().all(|o| o.is_success()));
        assert_eq!(store.resolve(&name("refs/heads/main")).unwrap(), Some(oid(2)));
        assert_eq!(store.resolve(&name("refs/heads/topic")).unwrap(), Some(oid(3)));
    }

    #[test]
    fn one_stale_expectation_blocks_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = RefStore::new(dir.path());
        store.update(name("refs/heads/main"), oid(1)).apply().unwrap();

        let mut tx = Transaction::new();
        tx.add(RefEdit {
            name: name("refs/heads/topic"),
            kind: RefEditKind::Create { new: oid(3) },
            message: None,
        });
        tx.add(RefEdit {
            name: name("refs/heads/main"),
            kind: RefEditKind::Update {
                old: oid(9), // stale
                new: oid(2),
            },
            message: None,
        });

        let outcomes = tx.commit(dir.path(), None).unwrap();
        assert_eq!(outcomes[0], UpdateOutcome::NotAttempted);
        assert!(matches!(outcomes[1], UpdateOutcome::Rejected { .. }));

        // Nothing changed, including the edit that would have succeeded.
        assert_eq!(store.resolve(&name("refs/heads/main")).unwrap(), Some(oid(1)));
        assert_eq!(store.resolve(&name("refs/heads/topic")).unwrap(), None);
    }

    #[test]
    fn delete_within_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let store = RefStore::new(dir.path());
        store.update(name("refs/heads/gone"), oid(4)).apply().unwrap();

        let mut tx = Transaction::new();
        tx.add(RefEdit {
            name: name("refs/heads/gone"),
            kind: RefEditKind::Delete { old: oid(4) },
            message: None,
        });
        let outcomes = tx.commit(dir.path(), None).unwrap();
        assert!(outcomes[0].is_success());
        assert_eq!(store.resolve(&name("refs/heads/gone")).unwrap(), None);
    }

    #[test]
    fn empty_transaction_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Transaction::new().commit(dir.path(), None).unwrap().is_empty());
    }
}
