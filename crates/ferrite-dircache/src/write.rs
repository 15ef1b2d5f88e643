//! Serializing the cache and materializing trees from it.

use std::io::Write as _;
use std::path::Path;

use bstr::{BString, ByteSlice};
use ferrite_hash::{HashKind, ObjectHasher, Oid};
use ferrite_object::{ObjectKind, TreeBuilder, TreeEntry};
use ferrite_odb::ObjectStore;
use ferrite_util::LockFile;

use crate::entry::{DirCacheEntry, Stage};
use crate::read::write_offset_varint;
use crate::tree_ext::{CacheTree, CacheTreeNode};
use crate::{DirCache, DirCacheError};

pub(crate) fn write(cache: &DirCache, path: &Path) -> Result<(), DirCacheError> {
    let bytes = serialize(cache)?;
    let mut lock = LockFile::take(path)?;
    lock.write_all(&bytes)?;
    lock.commit()?;
    Ok(())
}

pub(crate) fn serialize(cache: &DirCache) -> Result<Vec<u8>, DirCacheError> {
    // Extended per-entry flags need the v3 layout.
    let needs_v3 = cache
        .entries()
        .iter()
        .any(|e| e.flags.needs_extended());
    let version = match cache.version() {
        4 => 4,
        _ if needs_v3 => 3,
        v => v.max(2),
    };

    let mut out = Vec::new();
    out.extend_from_slice(b"DIRC");
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(&(cache.len() as u32).to_be_bytes());

    let mut previous_path = BString::new(Vec::new());
    for entry in cache.entries() {
        write_entry(&mut out, entry, version, &previous_path)?;
        previous_path = entry.path.clone();
    }

    if let Some(tree) = cache.cache_tree() {
        write_extension(&mut out, b"TREE", &tree.serialize());
    }
    if let Some(reuc) = cache.resolve_undo() {
        write_extension(&mut out, b"REUC", &reuc.serialize());
    }
    for raw in cache.unknown_extensions() {
        write_extension(&mut out, &raw.signature, &raw.payload);
    }

    let checksum = ObjectHasher::digest(HashKind::Sha1, &out)?;
    out.extend_from_slice(checksum.as_bytes());
    Ok(out)
}

fn write_entry(
    out: &mut Vec<u8>,
    entry: &DirCacheEntry,
    version: u32,
    previous_path: &BString,
) -> Result<(), DirCacheError> {
    let start = out.len();

    for word in [
        entry.stat.ctime_secs,
        entry.stat.ctime_nanos,
        entry.stat.mtime_secs,
        entry.stat.mtime_nanos,
        entry.stat.dev,
        entry.stat.ino,
        entry.mode.as_raw(),
        entry.stat.uid,
        entry.stat.gid,
        entry.stat.size,
    ] {
        out.extend_from_slice(&word.to_be_bytes());
    }
    out.extend_from_slice(entry.oid.as_bytes());

    let name_len = entry.path.len().min(0x0fff) as u16;
    let mut flag_word: u16 = name_len;
    flag_word |= u16::from(entry.stage.as_byte()) << 12;
    if entry.flags.assume_valid {
        flag_word |= 0x8000;
    }
    let extended = version >= 3 && entry.flags.needs_extended();
    if extended {
        flag_word |= 0x4000;
    }
    out.extend_from_slice(&flag_word.to_be_bytes());

    if extended {
        let mut ext_word: u16 = 0;
        if entry.flags.skip_worktree {
            ext_word |= 0x4000;
        }
        if entry.flags.intent_to_add {
            ext_word |= 0x2000;
        }
        out.extend_from_slice(&ext_word.to_be_bytes());
    }

    if version == 4 {
        let common = previous_path
            .iter()
            .zip(entry.path.iter())
            .take_while(|(a, b)| a == b)
            .count();
        let strip = previous_path.len() - common;
        out.extend_from_slice(&write_offset_varint(strip));
        out.extend_from_slice(&entry.path[common..]);
        out.push(0);
    } else {
        out.extend_from_slice(&entry.path);
        // Pad to 8 bytes with at least one NUL.
        let entry_len = out.len() - start;
        let padded = (entry_len / 8 + 1) * 8;
        out.resize(start + padded, 0);
    }
    Ok(())
}

fn write_extension(out: &mut Vec<u8>, signature: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(signature);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
}

/// Materialize tree objects for the cache content.
///
/// Valid cache-tree nodes short-circuit whole subtrees; everything else
/// is built bottom-up and written to `store`. On success the cache
/// carries a fully valid TREE extension for the next writer.
pub(crate) fn write_tree(
    cache: &mut DirCache,
    store: &ObjectStore,
) -> Result<Oid, DirCacheError> {
    if cache.entries().iter().any(|e| e.stage != Stage::Merged) {
        return Err(DirCacheError::Unmerged);
    }

    let old_tree = cache.cache_tree().cloned();
    let entries: Vec<DirCacheEntry> = cache.entries().to_vec();
    let (oid, node) = build_subtree(
        &entries,
        b"",
        BString::new(Vec::new()),
        old_tree.as_ref().map(|t| &t.root),
        store,
    )?;
    cache.set_cache_tree(Some(CacheTree { root: node }));
    Ok(oid)
}

/// Build the tree for every entry whose path starts with `prefix`
/// (`prefix` is either empty or ends with `/`).
fn build_subtree(
    entries: &[DirCacheEntry],
    prefix: &[u8],
    name: BString,
    cached: Option<&CacheTreeNode>,
    store: &ObjectStore,
) -> Result<(Oid, CacheTreeNode), DirCacheError> {
    let covered: Vec<&DirCacheEntry> = entries
        .iter()
        .filter(|e| e.path.starts_with(prefix))
        .collect();

    // A valid cached node covering exactly these entries can be reused
    // without touching the object store.
    if let Some(node) = cached {
        if node.is_valid() && node.entry_span() == covered.len() {
            if let Some(oid) = node.oid {
                return Ok((oid, node.clone()));
            }
        }
    }

    let mut builder = TreeBuilder::new();
    let mut children: Vec<CacheTreeNode> = Vec::new();
    let mut at = 0;

    while at < covered.len() {
        let entry = covered[at];
        let rest = &entry.path[prefix.len()..];
        match rest.find_byte(b'/') {
            None => {
                builder.append(TreeEntry::new(entry.mode, rest, entry.oid))?;
                at += 1;
            }
            Some(slash) => {
                let dir_name = &rest[..slash];
                let mut sub_prefix = BString::from(prefix);
                sub_prefix.extend_from_slice(dir_name);
                sub_prefix.push(b'/');

                let cached_child = cached.and_then(|node| {
                    node.children
                        .iter()
                        .find(|c| c.name.as_slice() == dir_name)
                });
                let (sub_oid, sub_node) = build_subtree(
                    entries,
                    &sub_prefix,
                    BString::from(dir_name),
                    cached_child,
                    store,
                )?;
                builder.append(TreeEntry::new(
                    ferrite_object::EntryMode::Directory,
                    dir_name,
                    sub_oid,
                ))?;
                children.push(sub_node);

                // Skip every entry inside this subtree.
                while at < covered.len() && covered[at].path.starts_with(&sub_prefix[..]) {
                    at += 1;
                }
            }
        }
    }

    let tree = builder.finish();
    let payload = tree.to_payload();
    let oid = store.write_payload(ObjectKind::Tree, &payload)?;

    Ok((
        oid,
        CacheTreeNode {
            name,
            entry_count: covered.len() as i32,
            oid: Some(oid),
            children,
        },
    ))
}

