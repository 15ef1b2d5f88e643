//! History traversal.
//!
//! A walk owns an arena of commit nodes, one canonical node per id, with
//! parents stored as arena indices — the graph is a DAG of indices, not
//! of reference-counted cells. Commits parse lazily per node: nothing is
//! read until the walk touches a commit, and the decoded body is kept on
//! the node so filters never pay for a second read.

mod arena;
pub mod filter;
mod merge;
mod walk;

pub use arena::{CommitIx, CommitNode, WalkFlags};
pub use filter::RevFilter;
pub use walk::{PathFilter, RevWalk, SortOrder, TreeFilter};

use ferrite_hash::Oid;

/// Errors of the revision walker.
#[derive(Debug, thiserror::Error)]
pub enum RevWalkError {
    #[error("commit {0} not found")]
    CommitNotFound(Oid),

    #[error("object {0} is not a commit")]
    NotACommit(Oid),

    #[error("a tree filter cannot be combined with merge-base traversal")]
    TreeFilterWithMergeBase,

    #[error("merge base supports at most {max} tips, got {got}")]
    TooManyTips { max: usize, got: usize },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Odb(#[from] ferrite_odb::OdbError),

    #[error(transparent)]
    Object(#[from] ferrite_object::ObjectError),
}
