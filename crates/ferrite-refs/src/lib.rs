//! Reference storage.
//!
//! Refs live loose (one file under `refs/…`) and packed (a sorted
//! `packed-refs` snapshot); loose wins. Updates follow the lock-file
//! compare-and-set protocol and report one of the canonical outcome
//! codes instead of collapsing everything into errors.

mod loose;
mod name;
mod packed;
mod reflog;
mod store;
mod transaction;
mod update;

pub use name::RefName;
pub use packed::{PackedRef, PackedRefs};
pub use reflog::{read_reflog, ReflogEntry};
pub use store::RefStore;
pub use transaction::{RefEdit, RefEditKind, Transaction};
pub use update::{RefUpdate, UpdateOutcome};

use ferrite_hash::Oid;

/// Symbolic chains longer than this are cyclic or hostile.
pub const MAX_SYMREF_DEPTH: usize = 5;

/// A named pointer: directly to an object, or to another ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ref {
    Direct { name: RefName, target: Oid },
    Symbolic { name: RefName, target: RefName },
}

impl Ref {
    pub fn name(&self) -> &RefName {
        match self {
            Ref::Direct { name, .. } | Ref::Symbolic { name, .. } => name,
        }
    }

    /// The object id, for a direct ref.
    pub fn target_oid(&self) -> Option<Oid> {
        match self {
            Ref::Direct { target, .. } => Some(*target),
            Ref::Symbolic { .. } => None,
        }
    }
}

/// Errors of the ref layer.
#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("invalid ref name: {0}")]
    InvalidName(String),

    #[error("ref {0} not found")]
    NotFound(String),

    #[error("symbolic ref target of {0} is invalid or too deep")]
    InvalidTarget(String),

    #[error("malformed ref file {0}")]
    MalformedRef(String),

    #[error("malformed packed-refs line {0}: {1}")]
    MalformedPacked(usize, String),

    #[error("malformed reflog line {0}")]
    MalformedReflog(usize),

    #[error(transparent)]
    Lock(#[from] ferrite_util::UtilError),

    #[error(transparent)]
    Id(#[from] ferrite_hash::IdError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
