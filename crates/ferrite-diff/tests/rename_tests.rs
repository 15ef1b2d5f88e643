//! End-to-end rename detection over real tree diffs.

use bstr::BString;
use ferrite_diff::{detect_renames, tree_diff, ChangeKind, RenameOptions};
use ferrite_hash::Oid;
use ferrite_object::{EntryMode, Object, ObjectKind, Tree, TreeEntry};
use ferrite_odb::ObjectStore;

struct Fixture {
    _dir: tempfile::TempDir,
    store: ObjectStore,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path().join("objects")).unwrap();
        Self { _dir: dir, store }
    }

    fn blob(&self, content: &[u8]) -> Oid {
        self.store.write_payload(ObjectKind::Blob, content).unwrap()
    }

    fn tree(&self, entries: Vec<(&str, Oid)>) -> Oid {
        let tree = Tree::from_entries(
            entries
                .into_iter()
                .map(|(name, oid)| TreeEntry::new(EntryMode::Regular, name, oid))
                .collect(),
        )
        .unwrap();
        self.store.write(&Object::Tree(tree)).unwrap()
    }
}

#[test]
fn exact_rename_scores_100() {
    let fx = Fixture::new();
    let content = fx.blob(b"unchanged content moving homes\n");
    let old = fx.tree(vec![("old_name.rs", content)]);
    let new = fx.tree(vec![("new_name.rs", content)]);

    let mut entries = tree_diff(&fx.store, Some(&old), Some(&new)).unwrap();
    detect_renames(&fx.store, &mut entries, RenameOptions::default()).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, ChangeKind::Renamed { score: 100 });
    assert_eq!(entries[0].old_path, Some(BString::from("old_name.rs")));
    assert_eq!(entries[0].new_path, Some(BString::from("new_name.rs")));
}

#[test]
fn similar_rename_scores_between_threshold_and_100() {
    let fx = Fixture::new();
    let before = fx.blob(b"fn main() {\n    println!(\"one\");\n    println!(\"two\");\n    println!(\"three\");\n}\n");
    let after = fx.blob(b"fn main() {\n    println!(\"one\");\n    println!(\"two\");\n    println!(\"3\");\n}\n");
    let old = fx.tree(vec![("app.rs", before)]);
    let new = fx.tree(vec![("main.rs", after)]);

    let mut entries = tree_diff(&fx.store, Some(&old), Some(&new)).unwrap();
    detect_renames(&fx.store, &mut entries, RenameOptions::default()).unwrap();

    assert_eq!(entries.len(), 1);
    match entries[0].kind {
        ChangeKind::Renamed { score } => {
            assert!(score >= 50 && score < 100, "score = {score}")
        }
        other => panic!("expected rename, got {other:?}"),
    }
}

#[test]
fn dissimilar_files_stay_add_and_delete() {
    let fx = Fixture::new();
    let gone = fx.blob(b"completely unrelated old bytes\n");
    let born = fx.blob(b"brand new content with no overlap\n");
    let old = fx.tree(vec![("old.txt", gone)]);
    let new = fx.tree(vec![("new.txt", born)]);

    let mut entries = tree_diff(&fx.store, Some(&old), Some(&new)).unwrap();
    detect_renames(&fx.store, &mut entries, RenameOptions::default()).unwrap();

    let kinds: Vec<ChangeKind> = entries.iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&ChangeKind::Added));
    assert!(kinds.contains(&ChangeKind::Deleted));
}

#[test]
fn over_budget_pairs_are_dropped_not_scored() {
    let fx = Fixture::new();
    // 3 deletes × 3 adds = 9 pairs; a limit of 4 forbids the inexact stage.
    let mut old_entries = Vec::new();
    let mut new_entries = Vec::new();
    for i in 0..3 {
        let content = format!("shared base content, file number {i}\nplus a second line\n");
        let old_blob = fx.blob(content.as_bytes());
        let new_blob = fx.blob(format!("{content}and one addition\n").as_bytes());
        old_entries.push((format!("old{i}.txt"), old_blob));
        new_entries.push((format!("new{i}.txt"), new_blob));
    }
    let old = fx.tree(old_entries.iter().map(|(n, o)| (n.as_str(), *o)).collect());
    let new = fx.tree(new_entries.iter().map(|(n, o)| (n.as_str(), *o)).collect());

    let mut entries = tree_diff(&fx.store, Some(&old), Some(&new)).unwrap();
    detect_renames(
        &fx.store,
        &mut entries,
        RenameOptions {
            threshold: 50,
            limit: 4,
        },
    )
    .unwrap();

    assert!(entries
        .iter()
        .all(|e| !matches!(e.kind, ChangeKind::Renamed { .. })));
    assert_eq!(entries.len(), 6);
}

#[test]
fn modified_files_are_not_rename_candidates() {
    let fx = Fixture::new();
    let v1 = fx.blob(b"v1\n");
    let v2 = fx.blob(b"v2\n");
    let old = fx.tree(vec![("file.txt", v1)]);
    let new = fx.tree(vec![("file.txt", v2)]);

    let mut entries = tree_diff(&fx.store, Some(&old), Some(&new)).unwrap();
    detect_renames(&fx.store, &mut entries, RenameOptions::default()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, ChangeKind::Modified);
}
