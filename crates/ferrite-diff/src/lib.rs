//! Diff engines.
//!
//! Line diffs run Myers by default with histogram available for large
//! inputs; both produce ordered span edits over `RawText` buffers. Tree
//! diffs pair up paths across two trees; rename detection then rewrites
//! add/delete pairs into renames, exact matches first, similarity
//! scoring under a budget second.

mod edit;
mod entries;
mod histogram;
mod myers;
mod rename;
mod text;

pub use edit::{Edit, EditKind};
pub use entries::{tree_diff, ChangeKind, DiffEntry};
pub use rename::{detect_renames, similarity_score, RenameOptions};
pub use text::RawText;

/// Errors of the diff layer.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error(transparent)]
    Odb(#[from] ferrite_odb::OdbError),

    #[error(transparent)]
    Walk(#[from] ferrite_treewalk::TreeWalkError),

    #[error(transparent)]
    Object(#[from] ferrite_object::ObjectError),
}

/// Which line-diff algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// Myers O(ND); the default.
    #[default]
    Myers,
    /// Histogram: anchor on rare lines, recurse; better on large inputs
    /// with much repetition.
    Histogram,
}

/// Diff two texts into an ordered, non-overlapping edit list.
pub fn diff(algorithm: Algorithm, a: &RawText, b: &RawText) -> Vec<Edit> {
    match algorithm {
        Algorithm::Myers => myers::diff(a, b),
        Algorithm::Histogram => histogram::diff(a, b),
    }
}
