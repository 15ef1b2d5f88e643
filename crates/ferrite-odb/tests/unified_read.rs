//! Reads must be source-transparent: the same id answers identically
//! whether the object is loose, packed, or both.

use ferrite_hash::{HashKind, ObjectHasher};
use ferrite_object::{Blob, Object, ObjectKind};
use ferrite_odb::{ObjectStore, OdbError};
use ferrite_pack::{plan_whole, write_pack, IndexPack};
use ferrite_util::NullMonitor;

fn pack_blobs(objects_dir: &std::path::Path, blobs: &[&[u8]]) {
    let plans: Vec<_> = blobs
        .iter()
        .map(|data| {
            let oid = ObjectHasher::object_id(HashKind::Sha1, "blob", data).unwrap();
            plan_whole(oid, ObjectKind::Blob, data.to_vec())
        })
        .collect();
    let mut bytes = Vec::new();
    write_pack(&plans, &mut bytes, HashKind::Sha1).unwrap();
    IndexPack::new(HashKind::Sha1)
        .run(
            bytes.as_slice(),
            &objects_dir.join("pack"),
            |_| None,
            &mut NullMonitor,
        )
        .unwrap();
}

#[test]
fn packed_and_loose_objects_read_the_same() {
    let dir = tempfile::tempdir().unwrap();
    let objects_dir = dir.path().join("objects");

    pack_blobs(&objects_dir, &[b"packed only", b"in both tiers"]);

    let store = ObjectStore::open(&objects_dir).unwrap();
    let loose_oid = store
        .write(&Object::Blob(Blob::from_bytes("loose only")))
        .unwrap();
    let both_oid = store
        .write(&Object::Blob(Blob::from_bytes("in both tiers")))
        .unwrap();

    let packed_oid = ObjectHasher::object_id(HashKind::Sha1, "blob", b"packed only").unwrap();

    for (oid, expect) in [
        (packed_oid, b"packed only".as_slice()),
        (loose_oid, b"loose only"),
        (both_oid, b"in both tiers"),
    ] {
        let obj = store.read(&oid).unwrap();
        match obj {
            Object::Blob(blob) => assert_eq!(blob.data, expect),
            other => panic!("expected blob, got {:?}", other.kind()),
        }
        assert!(store.contains(&oid));
        assert_eq!(store.info(&oid).unwrap().size, expect.len() as u64);
    }
}

#[test]
fn refresh_discovers_new_packs() {
    let dir = tempfile::tempdir().unwrap();
    let objects_dir = dir.path().join("objects");
    std::fs::create_dir_all(&objects_dir).unwrap();

    let store = ObjectStore::open(&objects_dir).unwrap();
    let oid = ObjectHasher::object_id(HashKind::Sha1, "blob", b"late arrival").unwrap();
    assert!(matches!(store.read(&oid), Err(OdbError::Missing(_))));

    pack_blobs(&objects_dir, &[b"late arrival"]);
    store.refresh().unwrap();
    assert!(store.contains(&oid));
}

#[test]
fn iter_all_unions_tiers_without_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let objects_dir = dir.path().join("objects");

    pack_blobs(&objects_dir, &[b"shared", b"only packed"]);
    let store = ObjectStore::open(&objects_dir).unwrap();
    store
        .write(&Object::Blob(Blob::from_bytes("shared")))
        .unwrap();
    store
        .write(&Object::Blob(Blob::from_bytes("only loose")))
        .unwrap();

    let all = store.iter_all().unwrap();
    assert_eq!(all.len(), 3);
    let mut sorted = all.clone();
    sorted.sort();
    assert_eq!(all, sorted);
}
