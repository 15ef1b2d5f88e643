//! N-way parallel tree iteration.
//!
//! A walk runs any number of tree sources in lock-step: at each step the
//! lexicographically smallest current path (under git's tree-aware
//! comparator) is selected, sources not at that path stay pinned, and
//! the caller decides whether to descend into subtrees. The source set
//! is closed: canonical trees from the object store, the dir-cache, the
//! working tree, and the empty source.

mod iter;
mod walk;

pub use iter::{IterEntry, TreeIter};
pub use walk::{TreeWalk, WalkStep};

/// Errors of the tree walker.
#[derive(Debug, thiserror::Error)]
pub enum TreeWalkError {
    #[error("current step has no subtree to enter")]
    NotASubtree,

    #[error("walk has not produced a step yet")]
    NoCurrentStep,

    #[error(transparent)]
    Odb(#[from] ferrite_odb::OdbError),

    #[error(transparent)]
    Object(#[from] ferrite_object::ObjectError),

    #[error(transparent)]
    Id(#[from] ferrite_hash::IdError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
