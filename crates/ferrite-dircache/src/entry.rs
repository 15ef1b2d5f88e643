use bstr::BString;
use ferrite_hash::Oid;
use ferrite_object::EntryMode;

use crate::DirCacheError;

/// Merge stage of an entry. Stage 0 is the only stage outside an
/// unresolved merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Stage {
    /// The normal, resolved state (stage 0).
    #[default]
    Merged,
    /// Common ancestor version (stage 1).
    Base,
    /// "Our" side (stage 2).
    Ours,
    /// "Their" side (stage 3).
    Theirs,
}

impl Stage {
    pub fn as_byte(self) -> u8 {
        match self {
            Stage::Merged => 0,
            Stage::Base => 1,
            Stage::Ours => 2,
            Stage::Theirs => 3,
        }
    }

    pub fn from_byte(b: u8) -> Result<Self, DirCacheError> {
        match b {
            0 => Ok(Stage::Merged),
            1 => Ok(Stage::Base),
            2 => Ok(Stage::Ours),
            3 => Ok(Stage::Theirs),
            other => Err(DirCacheError::BadEntry {
                at: 0,
                reason: format!("stage {other}"),
            }),
        }
    }
}

/// Filesystem stat fields cached for change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatData {
    pub ctime_secs: u32,
    pub ctime_nanos: u32,
    pub mtime_secs: u32,
    pub mtime_nanos: u32,
    pub dev: u32,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
}

impl StatData {
    #[cfg(unix)]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            ctime_secs: meta.ctime() as u32,
            ctime_nanos: meta.ctime_nsec() as u32,
            mtime_secs: meta.mtime() as u32,
            mtime_nanos: meta.mtime_nsec() as u32,
            dev: meta.dev() as u32,
            ino: meta.ino() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len() as u32,
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::time::UNIX_EPOCH;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default();
        Self {
            mtime_secs: mtime.as_secs() as u32,
            mtime_nanos: mtime.subsec_nanos(),
            ctime_secs: mtime.as_secs() as u32,
            ctime_nanos: mtime.subsec_nanos(),
            size: meta.len() as u32,
            ..Default::default()
        }
    }

    /// Would a file with `meta` be considered unchanged?
    pub fn matches(&self, meta: &std::fs::Metadata) -> bool {
        let now = Self::from_metadata(meta);
        if self.size != now.size {
            return false;
        }
        if (self.mtime_secs, self.mtime_nanos) != (now.mtime_secs, now.mtime_nanos) {
            return false;
        }
        if self.ino != 0 && now.ino != 0 && self.ino != now.ino {
            return false;
        }
        true
    }
}

/// In-file flag bits beyond the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryFlags {
    /// CE_VALID: trust the cached stat, skip the working-tree compare.
    pub assume_valid: bool,
    /// CE_INTENT_TO_ADD: placeholder from `add -N`.
    pub intent_to_add: bool,
    /// CE_SKIP_WORKTREE: sparse-checkout exclusion.
    pub skip_worktree: bool,
}

impl EntryFlags {
    /// Extended flags force the version-3 entry layout.
    pub fn needs_extended(&self) -> bool {
        self.intent_to_add || self.skip_worktree
    }
}

/// One `(path, stage)` row of the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirCacheEntry {
    pub path: BString,
    pub oid: Oid,
    pub mode: EntryMode,
    pub stage: Stage,
    pub stat: StatData,
    pub flags: EntryFlags,
}

impl DirCacheEntry {
    pub fn new(path: impl Into<BString>, mode: EntryMode, oid: Oid) -> Self {
        Self {
            path: path.into(),
            oid,
            mode,
            stage: Stage::Merged,
            stat: StatData::default(),
            flags: EntryFlags::default(),
        }
    }

    pub fn at_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    /// The `(path, stage)` sort key every index invariant hangs off.
    pub fn key(&self) -> (&[u8], u8) {
        (self.path.as_slice(), self.stage.as_byte())
    }
}
