use std::cmp::Ordering;

use bstr::{BStr, BString};
use ferrite_hash::{HashKind, Oid};

use crate::{EntryMode, ObjectError};

/// One `(mode, name, id)` entry of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: EntryMode,
    pub name: BString,
    pub oid: Oid,
}

impl TreeEntry {
    pub fn new(mode: EntryMode, name: impl Into<BString>, oid: Oid) -> Self {
        Self {
            mode,
            name: name.into(),
            oid,
        }
    }
}

/// Git's tree ordering: compare name bytes, but a directory sorts as if
/// its name carried a trailing `/`.
///
/// So `foo-bar` < `foo` (dir) < `foo.c`? No: `/` is 0x2f, `.` is 0x2e,
/// `-` is 0x2d — the dir `foo` lands between `foo-bar` and `foo0`.
pub fn tree_entry_cmp(a_name: &[u8], a_is_tree: bool, b_name: &[u8], b_is_tree: bool) -> Ordering {
    let common = a_name.len().min(b_name.len());
    match a_name[..common].cmp(&b_name[..common]) {
        Ordering::Equal => {}
        other => return other,
    }
    let a_next = next_byte(a_name, common, a_is_tree);
    let b_next = next_byte(b_name, common, b_is_tree);
    a_next.cmp(&b_next)
}

fn next_byte(name: &[u8], at: usize, is_tree: bool) -> u8 {
    if at < name.len() {
        name[at]
    } else if is_tree {
        b'/'
    } else {
        0
    }
}

/// An ordered directory listing.
///
/// The entries vector is always in canonical order with unique names;
/// construction goes through [`Tree::parse`] or [`TreeBuilder`], both of
/// which enforce the invariant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a tree payload: repeated `<octal-mode> <name>\0<raw-oid>`.
    ///
    /// The on-disk order is validated; a tree whose entries are misordered
    /// or duplicated is corrupt.
    pub fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        Self::parse_with(payload, HashKind::Sha1)
    }

    pub fn parse_with(payload: &[u8], hash: HashKind) -> Result<Self, ObjectError> {
        let mut builder = TreeBuilder::new();
        let mut at = 0;
        let oid_len = hash.raw_len();

        while at < payload.len() {
            let space = payload[at..]
                .iter()
                .position(|&b| b == b' ')
                .map(|i| i + at)
                .ok_or_else(|| ObjectError::BadTreeEntry {
                    at,
                    reason: "no space after mode".into(),
                })?;
            let mode = EntryMode::from_octal(&payload[at..space])?;

            let name_start = space + 1;
            let nul = payload[name_start..]
                .iter()
                .position(|&b| b == 0)
                .map(|i| i + name_start)
                .ok_or_else(|| ObjectError::BadTreeEntry {
                    at: name_start,
                    reason: "no NUL after name".into(),
                })?;
            if nul == name_start {
                return Err(ObjectError::BadTreeEntry {
                    at: name_start,
                    reason: "empty name".into(),
                });
            }

            let oid_start = nul + 1;
            let oid_end = oid_start + oid_len;
            if oid_end > payload.len() {
                return Err(ObjectError::BadTreeEntry {
                    at: oid_start,
                    reason: "truncated id".into(),
                });
            }
            let oid = Oid::from_raw(&payload[oid_start..oid_end], hash)?;

            builder.append(TreeEntry::new(mode, &payload[name_start..nul], oid))?;
            at = oid_end;
        }

        Ok(builder.finish())
    }

    /// Build from entries in any order; duplicates are still rejected.
    pub fn from_entries(mut entries: Vec<TreeEntry>) -> Result<Self, ObjectError> {
        entries.sort_by(|a, b| {
            tree_entry_cmp(&a.name, a.mode.is_tree(), &b.name, b.mode.is_tree())
        });
        let mut builder = TreeBuilder::new();
        for entry in entries {
            builder.append(entry)?;
        }
        Ok(builder.finish())
    }

    /// Canonical payload bytes.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(entry.mode.to_octal().as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.oid.as_bytes());
        }
        out
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find an entry by exact name.
    pub fn find(&self, name: &BStr) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name.as_slice() == &name[..])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TreeEntry> {
        self.entries.iter()
    }
}

/// Appends entries in canonical order, rejecting duplicates and
/// out-of-order inserts.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    entries: Vec<TreeEntry>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next entry. It must sort strictly after the previous one.
    pub fn append(&mut self, entry: TreeEntry) -> Result<(), ObjectError> {
        if let Some(last) = self.entries.last() {
            match tree_entry_cmp(
                &last.name,
                last.mode.is_tree(),
                &entry.name,
                entry.mode.is_tree(),
            ) {
                Ordering::Less => {}
                Ordering::Equal => {
                    return Err(ObjectError::DuplicateTreeEntry(entry.name));
                }
                Ordering::Greater => {
                    if last.name == entry.name {
                        return Err(ObjectError::DuplicateTreeEntry(entry.name));
                    }
                    return Err(ObjectError::TreeEntryOutOfOrder(
                        entry.name,
                        last.name.clone(),
                    ));
                }
            }
            if last.name == entry.name {
                return Err(ObjectError::DuplicateTreeEntry(entry.name));
            }
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn finish(self) -> Tree {
        Tree {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> Oid {
        let mut raw = [0u8; 20];
        raw[19] = n;
        Oid::from_raw(&raw, HashKind::Sha1).unwrap()
    }

    #[test]
    fn directory_sorts_with_implicit_slash() {
        // "foo" as a dir compares as "foo/": after "foo-bar", after "foo.c".
        assert_eq!(
            tree_entry_cmp(b"foo", true, b"foo.c", false),
            Ordering::Greater
        );
        assert_eq!(
            tree_entry_cmp(b"foo", true, b"foo-bar", false),
            Ordering::Greater
        );
        assert_eq!(
            tree_entry_cmp(b"foo", true, b"foo0", false),
            Ordering::Less
        );
        // As a plain file "foo" sorts before "foo.c".
        assert_eq!(
            tree_entry_cmp(b"foo", false, b"foo.c", false),
            Ordering::Less
        );
    }

    #[test]
    fn payload_round_trip_preserves_order() {
        let tree = Tree::from_entries(vec![
            TreeEntry::new(EntryMode::Regular, "file.txt", oid(1)),
            TreeEntry::new(EntryMode::Directory, "sub", oid(2)),
            TreeEntry::new(EntryMode::Executable, "build.sh", oid(3)),
        ])
        .unwrap();

        let payload = tree.to_payload();
        let back = Tree::parse(&payload).unwrap();
        assert_eq!(back, tree);
        let names: Vec<_> = back.iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, ["build.sh", "file.txt", "sub"]);
    }

    #[test]
    fn out_of_order_append_rejected() {
        let mut builder = TreeBuilder::new();
        builder
            .append(TreeEntry::new(EntryMode::Regular, "b.txt", oid(1)))
            .unwrap();
        let err = builder
            .append(TreeEntry::new(EntryMode::Regular, "a.txt", oid(2)))
            .unwrap_err();
        assert!(matches!(err, ObjectError::TreeEntryOutOfOrder(..)));
    }

    #[test]
    fn duplicate_name_rejected() {
        let err = Tree::from_entries(vec![
            TreeEntry::new(EntryMode::Regular, "same", oid(1)),
            TreeEntry::new(EntryMode::Regular, "same", oid(2)),
        ])
        .unwrap_err();
        assert!(matches!(err, ObjectError::DuplicateTreeEntry(_)));
    }

    #[test]
    fn misordered_payload_is_corrupt() {
        let good = Tree::from_entries(vec![
            TreeEntry::new(EntryMode::Regular, "a", oid(1)),
            TreeEntry::new(EntryMode::Regular, "b", oid(2)),
        ])
        .unwrap();
        let payload = good.to_payload();

        // Swap the two entries byte-wise: each is 7 + 20 = 27 bytes ("100644 a\0" is 9+20... compute split)
        let half = payload.len() / 2;
        let mut swapped = Vec::new();
        swapped.extend_from_slice(&payload[half..]);
        swapped.extend_from_slice(&payload[..half]);
        assert!(Tree::parse(&swapped).is_err());
    }

    #[test]
    fn single_entry_tree() {
        let tree = Tree::from_entries(vec![TreeEntry::new(
            EntryMode::Gitlink,
            "vendor",
            oid(9),
        )])
        .unwrap();
        let back = Tree::parse(&tree.to_payload()).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back.entries()[0].mode, EntryMode::Gitlink);
        assert!(back.find(bstr::BStr::new("vendor")).is_some());
        assert!(back.find(bstr::BStr::new("missing")).is_none());
    }

    #[test]
    fn empty_name_rejected() {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"100644 \0");
        payload.extend_from_slice(oid(1).as_bytes());
        assert!(Tree::parse(&payload).is_err());
    }
}
