//! Loose object storage.
//!
//! One object per file at `objects/xx/yyyy…` where `xx` is the first hex
//! byte of the id. File content is the canonical serialization (header +
//! payload) compressed with zlib. Writes are content-addressed and
//! idempotent: a temp file in the objects directory is renamed into place,
//! and losing the rename race to another writer is success.

mod read;
mod write;

use std::path::{Path, PathBuf};

use ferrite_hash::{HashKind, Oid};

pub use read::LooseHeader;

/// Errors of the loose store.
#[derive(Debug, thiserror::Error)]
pub enum LooseError {
    #[error("loose object {oid} is corrupt: {reason}")]
    Corrupt { oid: String, reason: String },

    #[error("loose object {path} hashes to {actual}, expected {expected}")]
    IdMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("cannot inflate loose object {oid}")]
    Inflate {
        oid: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Object(#[from] ferrite_object::ObjectError),

    #[error(transparent)]
    Id(#[from] ferrite_hash::IdError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Handle to an `objects/` directory's loose tier.
pub struct LooseStore {
    objects_dir: PathBuf,
    hash: HashKind,
    compression: flate2::Compression,
}

impl LooseStore {
    /// Open (lazily) the loose tier under `objects_dir`.
    pub fn at(objects_dir: impl AsRef<Path>, hash: HashKind) -> Self {
        Self {
            objects_dir: objects_dir.as_ref().to_path_buf(),
            hash,
            compression: flate2::Compression::default(),
        }
    }

    /// Absolute path of the file an id would live at.
    pub fn path_for(&self, oid: &Oid) -> PathBuf {
        self.objects_dir.join(oid.loose_path())
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn hash(&self) -> HashKind {
        self.hash
    }

    /// Enumerate every id with a loose file, for fsck and gc sweeps.
    pub fn iter(&self) -> std::io::Result<impl Iterator<Item = Oid> + '_> {
        let mut found = Vec::new();
        let dir = match std::fs::read_dir(&self.objects_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(found.into_iter());
            }
            Err(e) => return Err(e),
        };
        for fan in dir.flatten() {
            let fan_name = fan.file_name();
            let Some(fan_str) = fan_name.to_str() else {
                continue;
            };
            if fan_str.len() != 2 || !fan_str.bytes().all(|b| b.is_ascii_hexdigit()) {
                continue;
            }
            let Ok(children) = std::fs::read_dir(fan.path()) else {
                continue;
            };
            for child in children.flatten() {
                let child_name = child.file_name();
                let Some(rest) = child_name.to_str() else {
                    continue;
                };
                let hex = format!("{fan_str}{rest}");
                if let Ok(oid) = Oid::from_hex(&hex) {
                    found.push(oid);
                }
            }
        }
        found.sort();
        Ok(found.into_iter())
    }
}
