//! Foundation utilities shared across the ferrite workspace.
//!
//! Nothing in here knows about git object formats; this crate carries the
//! pieces everything else leans on: advisory lock files, person identities
//! with git's timestamp encoding, progress reporting with cooperative
//! cancellation, and an injectable view of the host environment.

pub mod context;
pub mod ident;
pub mod lockfile;
pub mod progress;

mod error;

pub use context::{HostContext, RuntimeContext};
pub use error::{LockError, UtilError};
pub use ident::{GitTime, Ident};
pub use lockfile::LockFile;
pub use progress::{CancelToken, NullMonitor, ProgressMonitor};

pub type Result<T> = std::result::Result<T, UtilError>;
