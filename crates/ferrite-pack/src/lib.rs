//! Packfile machinery.
//!
//! A pack is `PACK` + version + object count, then one entry per object
//! (self-contained zlib streams or deltas against another entry), then a
//! trailing checksum of everything before it. The companion `.idx` maps
//! sorted ids to pack offsets through a 256-entry fan-out.
//!
//! Reading supports two strategies: memory-mapping the whole pack, or
//! streaming fixed-size windows through a shared LRU cache. Both resolve
//! delta chains iteratively with a bounded depth and a byte-budgeted base
//! cache.

pub mod delta;
mod entry;
mod index;
mod indexer;
mod pack;
mod verify;
mod window;
mod writer;

use std::path::PathBuf;

use ferrite_hash::Oid;
use ferrite_object::ObjectKind;

pub use entry::{encode_entry_header, encode_ofs_offset, EntryHeader, PackEntryKind};
pub use index::{IndexEntry, PackIndex, write_index};
pub use indexer::{IndexPack, IndexPackOutcome};
pub use pack::{Pack, PackedObject, ReadStrategy};
pub use verify::verify_pack;
pub use window::{
    DeltaBaseCache, WindowCache, DEFAULT_BASE_BUDGET, DEFAULT_WINDOW_BUDGET, WINDOW_SIZE,
};
pub use writer::{plan_delta, plan_whole, write_pack, PackWriter, PlannedObject};

/// `"PACK"`.
pub const PACK_MAGIC: &[u8; 4] = b"PACK";
/// Pack stream version written and accepted (version 3 is also accepted).
pub const PACK_VERSION: u32 = 2;
/// `\xfftOc` idx v2 magic.
pub const IDX_MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];
pub const IDX_VERSION: u32 = 2;
/// Pack header: magic + version + object count.
pub const PACK_HEADER_LEN: usize = 12;
/// Delta chains longer than this are treated as corruption.
pub const MAX_DELTA_DEPTH: usize = 50;

/// Errors of the pack layer.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("bad pack header: {0}")]
    BadHeader(String),

    #[error("unsupported pack version {0}")]
    BadVersion(u32),

    #[error("bad pack index: {0}")]
    BadIndex(String),

    #[error("corrupt pack entry at offset {0}")]
    CorruptEntry(u64),

    #[error("bad delta at offset {at}: {reason}")]
    BadDelta { at: u64, reason: String },

    #[error("delta chain at offset {at} exceeds depth {max}")]
    DeltaTooDeep { at: u64, max: usize },

    #[error("delta base {0} not present")]
    MissingBase(Oid),

    #[error("pack checksum mismatch: stored {stored}, computed {computed}")]
    ChecksumMismatch { stored: String, computed: String },

    #[error("entry crc mismatch for {oid}")]
    CrcMismatch { oid: Oid },

    #[error("pack object count mismatch: header says {declared}, found {found}")]
    CountMismatch { declared: u32, found: u32 },

    #[error("cannot install pack at {path}: {reason}")]
    Install { path: PathBuf, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Object(#[from] ferrite_object::ObjectError),

    #[error(transparent)]
    Id(#[from] ferrite_hash::IdError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Map an [`ObjectKind`] to its pack type code.
pub(crate) fn kind_code(kind: ObjectKind) -> u8 {
    match kind {
        ObjectKind::Commit => 1,
        ObjectKind::Tree => 2,
        ObjectKind::Blob => 3,
        ObjectKind::Tag => 4,
    }
}

/// Map a pack type code back to an [`ObjectKind`].
pub(crate) fn code_kind(code: u8) -> Option<ObjectKind> {
    match code {
        1 => Some(ObjectKind::Commit),
        2 => Some(ObjectKind::Tree),
        3 => Some(ObjectKind::Blob),
        4 => Some(ObjectKind::Tag),
        _ => None,
    }
}
