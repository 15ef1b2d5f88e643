//! Single-ref compare-and-set updates.
//!
//! The update protocol: take `<ref>.lock`, re-read the stored value,
//! verify the caller's expectation, write and rename, then log. Every
//! way that can go wrong maps onto one outcome code; callers switch on
//! the code instead of unpicking error chains.

use std::io::Write;
use std::path::Path;

use bstr::BString;
use ferrite_hash::Oid;
use ferrite_util::{Ident, LockFile, LockError, UtilError};

use crate::packed::PackedRefs;
use crate::{loose, reflog, Ref, RefError, RefName};

/// What a ref update ended as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Preconditions failed before the lock was even tried.
    NotAttempted,
    /// Another writer holds `<ref>.lock`.
    LockFailure,
    /// Stored value already equals the new value.
    NoChange,
    /// Created a ref that did not exist.
    New,
    /// Moved forward; the old value is an ancestor of the new.
    FastForward,
    /// Overwrote a non-ancestor value because force was set.
    Forced,
    /// The compare-and-set expectation did not hold.
    Rejected { stored: Option<Oid> },
    /// Filesystem trouble mid-protocol.
    IoFailure,
    /// The ref moved to a new name.
    Renamed,
}

impl UpdateOutcome {
    /// Did the store change (or legitimately not need to)?
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            UpdateOutcome::NoChange
                | UpdateOutcome::New
                | UpdateOutcome::FastForward
                | UpdateOutcome::Forced
                | UpdateOutcome::Renamed
        )
    }
}

/// A prepared update of one ref.
pub struct RefUpdate<'a> {
    git_dir: &'a Path,
    name: RefName,
    /// `None` deletes the ref.
    new: Option<Oid>,
    /// `None`: unconditional. `Some(None)`: must not exist.
    /// `Some(Some(x))`: stored value must be exactly `x`.
    expected: Option<Option<Oid>>,
    /// Whether the caller proved old→new is a fast-forward.
    fast_forward: bool,
    force: bool,
    log: Option<(Ident, BString)>,
}

impl<'a> RefUpdate<'a> {
    pub fn new(git_dir: &'a Path, name: RefName, new: Oid) -> Self {
        Self {
            git_dir,
            name,
            new: Some(new),
            expected: None,
            fast_forward: true,
            force: false,
            log: None,
        }
    }

    pub fn delete(git_dir: &'a Path, name: RefName) -> Self {
        Self {
            git_dir,
            name,
            new: None,
            expected: None,
            fast_forward: false,
            force: false,
            log: None,
        }
    }

    /// Require the stored value to equal `old` (zero/None: must not exist).
    pub fn expect(mut self, old: Option<Oid>) -> Self {
        self.expected = Some(old);
        self
    }

    /// Mark whether the caller verified ancestry old→new.
    pub fn fast_forward(mut self, is_ff: bool) -> Self {
        self.fast_forward = is_ff;
        self
    }

    /// Permit non-fast-forward updates.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Append a reflog line on success.
    pub fn with_log(mut self, who: Ident, message: impl Into<BString>) -> Self {
        self.log = Some((who, message.into()));
        self
    }

    /// Run the protocol. I/O failures surface as outcome codes; only
    /// invariant breakage (bad names, malformed files) is an `Err`.
    pub fn apply(self) -> Result<UpdateOutcome, RefError> {
        let lock_target = loose::ref_path(self.git_dir, &self.name);
        if let Some(parent) = lock_target.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return Ok(UpdateOutcome::IoFailure);
            }
        }

        let mut lock = match LockFile::take(&lock_target) {
            Ok(lock) => lock,
            Err(UtilError::Lock(LockError::Held { .. })) => {
                return Ok(UpdateOutcome::LockFailure)
            }
            Err(_) => return Ok(UpdateOutcome::IoFailure),
        };

        // Re-read under the lock; the value may have moved since the
        // caller sampled it.
        let packed = PackedRefs::load(self.git_dir)?;
        let stored = match loose::read(self.git_dir, &self.name)? {
            Some(Ref::Direct { target, .. }) => Some(target),
            Some(Ref::Symbolic { .. }) => {
                // CAS on a symbolic ref is a config error, not a race.
                let _ = lock.discard();
                return Err(RefError::InvalidTarget(self.name.to_string()));
            }
            None => packed.find(&self.name).map(|r| r.oid),
        };

        if let Some(expected) = &self.expected {
            if *expected != stored {
                let _ = lock.discard();
                return Ok(UpdateOutcome::Rejected { stored });
            }
        }

        let outcome = match (stored, self.new) {
            (stored, Some(new)) => {
                if stored == Some(new) {
                    let _ = lock.discard();
                    UpdateOutcome::NoChange
                } else if stored.is_some() && !self.fast_forward && !self.force {
                    let _ = lock.discard();
                    return Ok(UpdateOutcome::Rejected { stored });
                } else {
                    if lock
                        .write_all(format!("{}\n", new.to_hex()).as_bytes())
                        .is_err()
                    {
                        return Ok(UpdateOutcome::IoFailure);
                    }
                    if lock.commit().is_err() {
                        return Ok(UpdateOutcome::IoFailure);
                    }
                    match stored {
                        None => UpdateOutcome::New,
                        Some(_) if self.fast_forward => UpdateOutcome::FastForward,
                        Some(_) => UpdateOutcome::Forced,
                    }
                }
            }
            (Some(_), None) => {
                // Delete: drop the loose file and purge any packed entry.
                let _ = lock.discard();
                if loose::delete(self.git_dir, &self.name).is_err() {
                    return Ok(UpdateOutcome::IoFailure);
                }
                if packed.find(&self.name).is_some() {
                    let mut rewritten = packed.clone();
                    rewritten.remove(&self.name);
                    if rewritten.store(self.git_dir).is_err() {
                        return Ok(UpdateOutcome::IoFailure);
                    }
                }
                UpdateOutcome::Forced
            }
            (None, None) => {
                let _ = lock.discard();
                UpdateOutcome::NoChange
            }
        };

        if outcome.is_success() {
            if let Some((who, message)) = &self.log {
                let entry = reflog::ReflogEntry {
                    old: stored.unwrap_or(Oid::ZERO_SHA1),
                    new: self.new.unwrap_or(Oid::ZERO_SHA1),
                    who: who.clone(),
                    message: message.clone(),
                };
                reflog::append(self.git_dir, &self.name, &entry)?;
            }
        }

        Ok(outcome)
    }
}

/// Move a ref to a new name, preserving its value and logging both ends.
pub(crate) fn rename(
    git_dir: &Path,
    from: &RefName,
    to: &RefName,
    who: Option<&Ident>,
) -> Result<UpdateOutcome, RefError> {
    let value = match loose::read(git_dir, from)? {
        Some(Ref::Direct { target, .. }) => target,
        Some(Ref::Symbolic { .. }) => {
            return Err(RefError::InvalidTarget(from.to_string()))
        }
        None => match PackedRefs::load(git_dir)?.find(from) {
            Some(packed) => packed.oid,
            None => return Err(RefError::NotFound(from.to_string())),
        },
    };

    let create = RefUpdate::new(git_dir, to.clone(), value).expect(None);
    let create = match who {
        Some(who) => create.with_log(
            who.clone(),
            format!("rename: renamed {} to {}", from, to),
        ),
        None => create,
    };
    match create.apply()? {
        UpdateOutcome::New => {}
        other => return Ok(other),
    }

    match RefUpdate::delete(git_dir, from.clone())
        .expect(Some(value))
        .apply()?
    {
        outcome if outcome.is_success() => Ok(UpdateOutcome::Renamed),
        outcome => Ok(outcome),
    }
}
