use std::path::PathBuf;

/// Errors raised by the foundation utilities.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("malformed identity: {0}")]
    BadIdent(String),

    #[error("malformed timestamp: {0}")]
    BadTime(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures of the lock-file protocol.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock already held: {path}")]
    Held { path: PathBuf },

    #[error("cannot create lock {path}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot commit lock {path}")]
    Commit {
        path: PathBuf,
        source: std::io::Error,
    },
}
