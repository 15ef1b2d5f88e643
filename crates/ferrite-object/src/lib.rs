//! Git object model: blob, tree, commit and tag codecs.
//!
//! Objects are immutable values identified by the hash of
//! `"<kind> <size>\0<payload>"`. This crate parses the four payload
//! formats, serializes them canonically, and enforces the tree ordering
//! invariant (directories sort as if their name ended in `/`).

mod blob;
mod commit;
pub mod header;
mod mode;
mod tag;
mod tree;

pub use blob::Blob;
pub use commit::Commit;
pub use mode::EntryMode;
pub use tag::Tag;
pub use tree::{tree_entry_cmp, Tree, TreeBuilder, TreeEntry};

use bstr::BString;
use ferrite_hash::{HashKind, IdError, ObjectHasher, Oid};

/// Errors produced while decoding or encoding objects.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("unknown object kind: {0}")]
    UnknownKind(BString),

    #[error("malformed object header: {0}")]
    BadHeader(String),

    #[error("object truncated: declared {declared} bytes, found {found}")]
    Truncated { declared: usize, found: usize },

    #[error("malformed tree entry at byte {at}: {reason}")]
    BadTreeEntry { at: usize, reason: String },

    #[error("duplicate tree entry name: {0}")]
    DuplicateTreeEntry(BString),

    #[error("tree entry out of order: {0} after {1}")]
    TreeEntryOutOfOrder(BString, BString),

    #[error("malformed file mode: {0}")]
    BadMode(String),

    #[error("commit is missing its '{0}' header")]
    MissingCommitHeader(&'static str),

    #[error("tag is missing its '{0}' header")]
    MissingTagHeader(&'static str),

    #[error(transparent)]
    Ident(#[from] ferrite_util::UtilError),

    #[error(transparent)]
    Id(#[from] IdError),
}

/// The four kinds of git objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectKind {
    /// Parse the kind token from an object or pack header.
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        match s {
            b"commit" => Ok(Self::Commit),
            b"tree" => Ok(Self::Tree),
            b"blob" => Ok(Self::Blob),
            b"tag" => Ok(Self::Tag),
            other => Err(ObjectError::UnknownKind(BString::from(other))),
        }
    }

    /// The canonical token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectKind {
    type Err = ObjectError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

/// A parsed object of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl Object {
    /// Parse a full serialization: header plus payload.
    pub fn parse(data: &[u8]) -> Result<Self, ObjectError> {
        let (kind, size, header_len) = header::parse(data)?;
        let payload = &data[header_len..];
        if payload.len() < size {
            return Err(ObjectError::Truncated {
                declared: size,
                found: payload.len(),
            });
        }
        Self::parse_payload(kind, &payload[..size])
    }

    /// Parse a bare payload whose kind is already known.
    pub fn parse_payload(kind: ObjectKind, payload: &[u8]) -> Result<Self, ObjectError> {
        Ok(match kind {
            ObjectKind::Blob => Self::Blob(Blob::from_bytes(payload)),
            ObjectKind::Tree => Self::Tree(Tree::parse(payload)?),
            ObjectKind::Commit => Self::Commit(Commit::parse(payload)?),
            ObjectKind::Tag => Self::Tag(Tag::parse(payload)?),
        })
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Blob(_) => ObjectKind::Blob,
            Self::Tree(_) => ObjectKind::Tree,
            Self::Commit(_) => ObjectKind::Commit,
            Self::Tag(_) => ObjectKind::Tag,
        }
    }

    /// Canonical payload bytes (what the header's size counts).
    pub fn to_payload(&self) -> Vec<u8> {
        match self {
            Self::Blob(b) => b.data.to_vec(),
            Self::Tree(t) => t.to_payload(),
            Self::Commit(c) => c.to_payload(),
            Self::Tag(t) => t.to_payload(),
        }
    }

    /// Full canonical serialization: header plus payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = self.to_payload();
        let mut out = header::write(self.kind(), payload.len());
        out.extend_from_slice(&payload);
        out
    }

    /// The object's id under the given hash kind.
    pub fn id(&self, hash: HashKind) -> Result<Oid, IdError> {
        ObjectHasher::object_id(hash, self.kind().as_str(), &self.to_payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tokens() {
        assert_eq!(ObjectKind::from_bytes(b"blob").unwrap(), ObjectKind::Blob);
        assert_eq!(ObjectKind::from_bytes(b"tag").unwrap(), ObjectKind::Tag);
        assert!(ObjectKind::from_bytes(b"bolb").is_err());
        assert_eq!("commit".parse::<ObjectKind>().unwrap(), ObjectKind::Commit);
        assert_eq!(ObjectKind::Tree.to_string(), "tree");
    }

    #[test]
    fn blob_full_round_trip() {
        let obj = Object::Blob(Blob::from_bytes(b"hello\n"));
        let bytes = obj.to_bytes();
        assert_eq!(&bytes[..7], b"blob 6\0");
        let back = Object::parse(&bytes).unwrap();
        assert_eq!(back, obj);
        assert_eq!(
            obj.id(HashKind::Sha1).unwrap().to_hex(),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
    }

    #[test]
    fn truncated_payload_rejected() {
        assert!(matches!(
            Object::parse(b"blob 10\0short"),
            Err(ObjectError::Truncated {
                declared: 10,
                found: 5
            })
        ));
    }

    #[test]
    fn zero_byte_object() {
        let obj = Object::parse(b"blob 0\0").unwrap();
        assert_eq!(obj.to_payload().len(), 0);
        assert_eq!(
            obj.id(HashKind::Sha1).unwrap().to_hex(),
            "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"
        );
    }
}
