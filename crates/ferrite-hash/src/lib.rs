//! Object identity for the ferrite git core.
//!
//! Provides the `Oid` content identifier (SHA-1 or SHA-256), hex codecs,
//! prefix abbreviations, the streaming object hasher, and the 256-entry
//! fan-out table used by pack indexes.

mod abbrev;
mod algorithm;
mod error;
mod fanout;
mod hasher;
pub mod hex;
mod oid;

pub use abbrev::ShortId;
pub use algorithm::HashKind;
pub use error::IdError;
pub use fanout::Fanout;
pub use hasher::ObjectHasher;
pub use oid::Oid;
