//! Tree materialization from the cache, with cache-tree reuse.

use bstr::BStr;
use ferrite_dircache::{DirCacheBuilder, DirCacheEditor, DirCacheEntry};
use ferrite_hash::{HashKind, ObjectHasher, Oid};
use ferrite_object::{EntryMode, Object, ObjectKind};
use ferrite_odb::ObjectStore;

fn blob(store: &ObjectStore, content: &[u8]) -> Oid {
    store.write_payload(ObjectKind::Blob, content).unwrap()
}

fn entry(path: &str, mode: EntryMode, oid: Oid) -> DirCacheEntry {
    DirCacheEntry::new(path, mode, oid)
}

#[test]
fn builds_nested_trees() {
    let dir = tempfile::tempdir().unwrap();
    let store = ObjectStore::open(dir.path().join("objects")).unwrap();

    let readme = blob(&store, b"hello\n");
    let main_rs = blob(&store, b"fn main() {}\n");

    let mut builder = DirCacheBuilder::new();
    builder.add(entry("README.md", EntryMode::Regular, readme));
    builder.add(entry("src/main.rs", EntryMode::Regular, main_rs));
    let mut cache = builder.finish().unwrap();

    let root = cache.write_tree(&store).unwrap();

    let root_tree = match store.read(&root).unwrap() {
        Object::Tree(tree) => tree,
        other => panic!("expected tree, got {:?}", other.kind()),
    };
    assert_eq!(root_tree.len(), 2);
    assert_eq!(root_tree.entries()[0].name, "README.md");
    assert_eq!(root_tree.entries()[1].name, "src");
    assert!(root_tree.entries()[1].mode.is_tree());

    let src = match store.read(&root_tree.entries()[1].oid).unwrap() {
        Object::Tree(tree) => tree,
        _ => unreachable!(),
    };
    assert_eq!(src.entries()[0].name, "main.rs");
    assert_eq!(src.entries()[0].oid, main_rs);
}

#[test]
fn empty_cache_builds_the_empty_tree() {
    let dir = tempfile::tempdir().unwrap();
    let store = ObjectStore::open(dir.path().join("objects")).unwrap();
    let mut cache = DirCacheBuilder::new().finish().unwrap();

    let root = cache.write_tree(&store).unwrap();
    assert_eq!(root.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
}

#[test]
fn write_tree_result_matches_hand_hashed_tree() {
    let dir = tempfile::tempdir().unwrap();
    let store = ObjectStore::open(dir.path().join("objects")).unwrap();
    let content = blob(&store, b"x");

    let mut builder = DirCacheBuilder::new();
    builder.add(entry("only.txt", EntryMode::Regular, content));
    let mut cache = builder.finish().unwrap();
    let root = cache.write_tree(&store).unwrap();

    let mut payload = Vec::new();
    payload.extend_from_slice(b"100644 only.txt\0");
    payload.extend_from_slice(content.as_bytes());
    let expected = ObjectHasher::object_id(HashKind::Sha1, "tree", &payload).unwrap();
    assert_eq!(root, expected);
}

#[test]
fn cache_tree_is_valid_after_write_and_reused() {
    let dir = tempfile::tempdir().unwrap();
    let store = ObjectStore::open(dir.path().join("objects")).unwrap();
    let a = blob(&store, b"a");
    let b = blob(&store, b"b");

    let mut builder = DirCacheBuilder::new();
    builder.add(entry("dir/a.txt", EntryMode::Regular, a));
    builder.add(entry("top.txt", EntryMode::Regular, b));
    let mut cache = builder.finish().unwrap();

    let first = cache.write_tree(&store).unwrap();
    let tree = cache.cache_tree().unwrap();
    assert_eq!(tree.root_oid(), Some(first));
    assert_eq!(tree.root.entry_span(), 2);

    // No edits: a second write-tree reuses the valid root outright.
    let second = cache.write_tree(&store).unwrap();
    assert_eq!(first, second);

    // An edit invalidates the touched spine and changes the result.
    let c = blob(&store, b"c");
    let mut editor = DirCacheEditor::new(&mut cache);
    editor.upsert(entry("dir/a.txt", EntryMode::Regular, c));
    let third = cache.write_tree(&store).unwrap();
    assert_ne!(first, third);
    assert_eq!(cache.cache_tree().unwrap().root_oid(), Some(third));
}

#[test]
fn unmerged_cache_refuses_write_tree() {
    let dir = tempfile::tempdir().unwrap();
    let store = ObjectStore::open(dir.path().join("objects")).unwrap();
    let a = blob(&store, b"a");

    let mut cache = DirCacheBuilder::new().finish().unwrap();
    let mut editor = DirCacheEditor::new(&mut cache);
    editor.set_conflict(
        Some(entry("f.txt", EntryMode::Regular, a)),
        Some(entry("f.txt", EntryMode::Regular, a)),
        None,
    );
    assert!(cache.write_tree(&store).is_err());
}
