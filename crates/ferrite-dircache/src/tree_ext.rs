//! The TREE extension: cached subtree ids.
//!
//! Each node covers the index entries under its path and remembers the
//! tree id they hashed to. A node is valid while no covered entry has
//! changed; any touching edit invalidates the node and every ancestor,
//! so the next write-tree rebuilds exactly the dirtied spine.

use bstr::{BStr, BString, ByteSlice};
use ferrite_hash::{HashKind, Oid};

use crate::DirCacheError;

/// The extension root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTree {
    pub root: CacheTreeNode,
}

/// One subtree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTreeNode {
    /// Path component (empty for the root).
    pub name: BString,
    /// Covered entry count; -1 marks the node invalid.
    pub entry_count: i32,
    /// The subtree's id; meaningful only while valid.
    pub oid: Option<Oid>,
    pub children: Vec<CacheTreeNode>,
}

impl CacheTreeNode {
    pub fn is_valid(&self) -> bool {
        self.entry_count >= 0 && self.oid.is_some()
    }

    /// Number of index entries this subtree covers (0 when invalid).
    pub fn entry_span(&self) -> usize {
        self.entry_count.max(0) as usize
    }

    fn invalidate_path(&mut self, path: &[u8]) {
        self.entry_count = -1;
        self.oid = None;
        if let Some(slash) = path.find_byte(b'/') {
            let (component, rest) = (&path[..slash], &path[slash + 1..]);
            for child in &mut self.children {
                if child.name.as_slice() == component {
                    child.invalidate_path(rest);
                    return;
                }
            }
        }
        // Leaf component: only the ancestors (already handled) carry it.
    }
}

impl CacheTree {
    /// Serialized form: per node `name NUL entry_count SP subtree_count
    /// LF [oid]`, children in order, depth first.
    pub fn parse(payload: &[u8]) -> Result<Self, DirCacheError> {
        let mut at = 0;
        let root = parse_node(payload, &mut at)?;
        Ok(Self { root })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        serialize_node(&self.root, &mut out);
        out
    }

    /// Invalidate the node covering `path` and every ancestor.
    pub fn invalidate(&mut self, path: &BStr) {
        self.root.invalidate_path(path.as_bytes());
    }

    /// The root tree id when the whole cache is still valid.
    pub fn root_oid(&self) -> Option<Oid> {
        if self.root.is_valid() {
            self.root.oid
        } else {
            None
        }
    }
}

fn parse_node(payload: &[u8], at: &mut usize) -> Result<CacheTreeNode, DirCacheError> {
    let bad = |reason: &str| DirCacheError::BadExtension {
        sig: "TREE".into(),
        reason: reason.into(),
    };

    let nul = payload[*at..]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| bad("missing name terminator"))?;
    let name = BString::from(&payload[*at..*at + nul]);
    *at += nul + 1;

    let space = payload[*at..]
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| bad("missing entry count"))?;
    let entry_count: i32 = std::str::from_utf8(&payload[*at..*at + space])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| bad("bad entry count"))?;
    *at += space + 1;

    let newline = payload[*at..]
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| bad("missing subtree count"))?;
    let subtree_count: usize = std::str::from_utf8(&payload[*at..*at + newline])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| bad("bad subtree count"))?;
    *at += newline + 1;

    let oid = if entry_count >= 0 {
        let id_len = HashKind::Sha1.raw_len();
        if *at + id_len > payload.len() {
            return Err(bad("truncated id"));
        }
        let oid = Oid::from_raw(&payload[*at..*at + id_len], HashKind::Sha1)?;
        *at += id_len;
        Some(oid)
    } else {
        None
    };

    let mut children = Vec::with_capacity(subtree_count);
    for _ in 0..subtree_count {
        children.push(parse_node(payload, at)?);
    }

    Ok(CacheTreeNode {
        name,
        entry_count,
        oid,
        children,
    })
}

fn serialize_node(node: &CacheTreeNode, out: &mut Vec<u8>) {
    out.extend_from_slice(&node.name);
    out.push(0);
    out.extend_from_slice(node.entry_count.to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(node.children.len().to_string().as_bytes());
    out.push(b'\n');
    if node.entry_count >= 0 {
        if let Some(oid) = &node.oid {
            out.extend_from_slice(oid.as_bytes());
        }
    }
    for child in &node.children {
        serialize_node(child, out);
    }
}
