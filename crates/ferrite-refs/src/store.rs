//! The ref store facade: resolution with loose-over-packed precedence
//! and bounded symbolic chasing.

use std::path::{Path, PathBuf};

use ferrite_hash::Oid;
use ferrite_util::Ident;

use crate::packed::PackedRefs;
use crate::update::{self, RefUpdate, UpdateOutcome};
use crate::{loose, Ref, RefError, RefName, MAX_SYMREF_DEPTH};

/// Refs of one git directory.
pub struct RefStore {
    git_dir: PathBuf,
}

impl RefStore {
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        Self {
            git_dir: git_dir.as_ref().to_path_buf(),
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Read one ref without following symbolic targets.
    pub fn read(&self, name: &RefName) -> Result<Option<Ref>, RefError> {
        if let Some(found) = loose::read(&self.git_dir, name)? {
            return Ok(Some(found));
        }
        Ok(PackedRefs::load(&self.git_dir)?
            .find(name)
            .map(|packed| Ref::Direct {
                name: packed.name.clone(),
                target: packed.oid,
            }))
    }

    /// Resolve a name to an object id, following symbolic refs up to
    /// [`MAX_SYMREF_DEPTH`]. `Ok(None)` for an unborn ref (HEAD in a
    /// fresh repository).
    pub fn resolve(&self, name: &RefName) -> Result<Option<Oid>, RefError> {
        let mut current = name.clone();
        for _ in 0..MAX_SYMREF_DEPTH {
            match self.read(&current)? {
                Some(Ref::Direct { target, .. }) => return Ok(Some(target)),
                Some(Ref::Symbolic { target, .. }) => current = target,
                None => return Ok(None),
            }
        }
        Err(RefError::InvalidTarget(name.to_string()))
    }

    /// Resolve HEAD; `Ok(None)` when unborn.
    pub fn head(&self) -> Result<Option<Oid>, RefError> {
        self.resolve(&RefName::new("HEAD")?)
    }

    /// The branch HEAD points at, if HEAD is symbolic.
    pub fn head_target(&self) -> Result<Option<RefName>, RefError> {
        match self.read(&RefName::new("HEAD")?)? {
            Some(Ref::Symbolic { target, .. }) => Ok(Some(target)),
            _ => Ok(None),
        }
    }

    /// All refs under `prefix` (or all under `refs/` when empty), merged
    /// across tiers with loose precedence, sorted by name.
    pub fn iter(&self, prefix: Option<&str>) -> Result<Vec<(RefName, Oid)>, RefError> {
        let prefix = prefix.unwrap_or("refs/");
        let mut seen = std::collections::BTreeMap::new();

        let packed = PackedRefs::load(&self.git_dir)?;
        for entry in packed.iter() {
            if entry.name.as_str().starts_with(prefix) {
                seen.insert(entry.name.clone(), entry.oid);
            }
        }
        for name in loose::enumerate(&self.git_dir)? {
            if !name.as_str().starts_with(prefix) {
                continue;
            }
            if let Some(oid) = self.resolve(&name)? {
                seen.insert(name, oid);
            }
        }

        Ok(seen.into_iter().collect())
    }

    /// Begin an update of `name` to `new`.
    pub fn update(&self, name: RefName, new: Oid) -> RefUpdate<'_> {
        RefUpdate::new(&self.git_dir, name, new)
    }

    /// Begin a deletion of `name`.
    pub fn delete(&self, name: RefName) -> RefUpdate<'_> {
        RefUpdate::delete(&self.git_dir, name)
    }

    /// Rename a ref, keeping its value.
    pub fn rename(
        &self,
        from: &RefName,
        to: &RefName,
        who: Option<&Ident>,
    ) -> Result<UpdateOutcome, RefError> {
        update::rename(&self.git_dir, from, to, who)
    }

    /// Point a symbolic ref (normally HEAD) at a branch name.
    pub fn set_symbolic(&self, name: &RefName, target: &RefName) -> Result<(), RefError> {
        loose::write_symbolic(&self.git_dir, name, target)
    }

    /// Move every current loose ref into `packed-refs` and drop the loose
    /// files; readers fall through to the packed tier.
    pub fn pack_refs(&self) -> Result<(), RefError> {
        let mut packed = PackedRefs::load(&self.git_dir)?;
        let names = loose::enumerate(&self.git_dir)?;
        for name in &names {
            if let Some(Ref::Direct { target, .. }) = loose::read(&self.git_dir, name)? {
                packed.upsert(crate::PackedRef {
                    name: name.clone(),
                    oid: target,
                    peeled: None,
                });
            }
        }
        packed.store(&self.git_dir)?;
        for name in &names {
            if matches!(
                loose::read(&self.git_dir, name)?,
                Some(Ref::Direct { .. })
            ) {
                loose::delete(&self.git_dir, name)?;
            }
        }
        Ok(())
    }
}
