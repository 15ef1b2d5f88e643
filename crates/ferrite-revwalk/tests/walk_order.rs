//! Emission-order and reachability-subtraction behavior.

mod common;

use common::RepoFixture;
use ferrite_hash::Oid;
use ferrite_object::EntryMode;
use ferrite_revwalk::{filter, PathFilter, RevWalk, SortOrder};

/// A small linear history: c1 ← c2 ← c3, timestamps increasing.
fn linear(fixture: &RepoFixture) -> (Oid, Oid, Oid) {
    let c1 = fixture.commit("one", &[], 1000);
    let c2 = fixture.commit("two", &[c1], 2000);
    let c3 = fixture.commit("three", &[c2], 3000);
    (c1, c2, c3)
}

#[test]
fn default_order_is_commit_time_desc() {
    let fixture = RepoFixture::new();
    let (c1, c2, c3) = linear(&fixture);

    let mut walk = RevWalk::new(&fixture.store);
    walk.mark_start(c3).unwrap();
    assert_eq!(walk.collect_all().unwrap(), vec![c3, c2, c1]);
}

#[test]
fn uninteresting_subtracts_reachable_set() {
    let fixture = RepoFixture::new();
    let (c1, c2, c3) = linear(&fixture);

    let mut walk = RevWalk::new(&fixture.store);
    walk.mark_start(c3).unwrap();
    walk.mark_uninteresting(c1).unwrap();
    let emitted = walk.collect_all().unwrap();
    assert_eq!(emitted, vec![c3, c2]);
    let _ = c1;
}

#[test]
fn branchy_history_emits_exactly_the_difference() {
    let fixture = RepoFixture::new();
    let base = fixture.commit("base", &[], 100);
    let left = fixture.commit("left", &[base], 200);
    let right = fixture.commit("right", &[base], 300);
    let merge = fixture.commit("merge", &[left, right], 400);

    // reachable(merge) \ reachable(left) == {merge, right}
    let mut walk = RevWalk::new(&fixture.store);
    walk.mark_start(merge).unwrap();
    walk.mark_uninteresting(left).unwrap();
    let emitted = walk.collect_all().unwrap();
    assert_eq!(emitted.len(), 2);
    assert!(emitted.contains(&merge));
    assert!(emitted.contains(&right));
}

#[test]
fn topo_order_emits_children_before_parents() {
    let fixture = RepoFixture::new();
    // Deliberately out-of-order timestamps: the parent is NEWER.
    let c1 = fixture.commit("old parent, new clock", &[], 5000);
    let c2 = fixture.commit("child with older clock", &[c1], 1000);

    let mut walk = RevWalk::new(&fixture.store);
    walk.set_order(SortOrder::Topo);
    walk.mark_start(c2).unwrap();
    assert_eq!(walk.collect_all().unwrap(), vec![c2, c1]);
}

#[test]
fn topo_order_on_merges() {
    let fixture = RepoFixture::new();
    let base = fixture.commit("base", &[], 100);
    let left = fixture.commit("left", &[base], 900);
    let right = fixture.commit("right", &[base], 200);
    let merge = fixture.commit("merge", &[left, right], 1000);

    let mut walk = RevWalk::new(&fixture.store);
    walk.set_order(SortOrder::Topo);
    walk.mark_start(merge).unwrap();
    let emitted = walk.collect_all().unwrap();

    let pos = |oid: &Oid| emitted.iter().position(|e| e == oid).unwrap();
    assert_eq!(pos(&merge), 0);
    assert!(pos(&left) < pos(&base));
    assert!(pos(&right) < pos(&base));
    assert_eq!(emitted.len(), 4);
}

#[test]
fn reverse_order_inverts_the_walk() {
    let fixture = RepoFixture::new();
    let (c1, c2, c3) = linear(&fixture);

    let mut walk = RevWalk::new(&fixture.store);
    walk.set_order(SortOrder::Reverse);
    walk.mark_start(c3).unwrap();
    assert_eq!(walk.collect_all().unwrap(), vec![c1, c2, c3]);
}

#[test]
fn reset_preserves_the_pool() {
    let fixture = RepoFixture::new();
    let (c1, c2, c3) = linear(&fixture);

    let mut walk = RevWalk::new(&fixture.store);
    walk.mark_start(c3).unwrap();
    walk.collect_all().unwrap();
    let pool_size = walk.arena().len();

    walk.reset();
    walk.mark_start(c2).unwrap();
    assert_eq!(walk.collect_all().unwrap(), vec![c2, c1]);
    // No new nodes: the pool was reused.
    assert_eq!(walk.arena().len(), pool_size);
}

#[test]
fn body_filters_apply() {
    let fixture = RepoFixture::new();
    let c1 = fixture.commit("feat: start", &[], 1000);
    let c2 = fixture.commit("fix: broken thing", &[c1], 2000);
    let c3 = fixture.commit("feat: more", &[c2], 3000);

    let mut walk = RevWalk::new(&fixture.store);
    walk.add_filter(filter::message_contains("fix:"));
    walk.mark_start(c3).unwrap();
    assert_eq!(walk.collect_all().unwrap(), vec![c2]);
}

#[test]
fn path_filter_keeps_only_touching_commits() {
    let fixture = RepoFixture::new();

    let readme_v1 = fixture.blob(b"v1");
    let readme_v2 = fixture.blob(b"v2");
    let other = fixture.blob(b"unrelated");

    let tree1 = fixture.tree(vec![(EntryMode::Regular, "README", readme_v1)]);
    let tree2 = fixture.tree(vec![
        (EntryMode::Regular, "README", readme_v1),
        (EntryMode::Regular, "other.txt", other),
    ]);
    let tree3 = fixture.tree(vec![
        (EntryMode::Regular, "README", readme_v2),
        (EntryMode::Regular, "other.txt", other),
    ]);

    let c1 = fixture.commit_with_tree("add README", &[], 1000, tree1);
    let c2 = fixture.commit_with_tree("add other", &[c1], 2000, tree2);
    let c3 = fixture.commit_with_tree("touch README", &[c2], 3000, tree3);

    let mut walk = RevWalk::new(&fixture.store);
    walk.set_tree_filter(Box::new(PathFilter::new("README")));
    walk.mark_start(c3).unwrap();
    assert_eq!(walk.collect_all().unwrap(), vec![c3, c1]);
}

#[test]
fn generation_numbers() {
    let fixture = RepoFixture::new();
    let base = fixture.commit("base", &[], 100);
    let left = fixture.commit("left", &[base], 200);
    let right = fixture.commit("right", &[base], 300);
    let merge = fixture.commit("merge", &[left, right], 400);

    let mut walk = RevWalk::new(&fixture.store);
    assert_eq!(walk.generation(base).unwrap(), 1);
    assert_eq!(walk.generation(left).unwrap(), 2);
    assert_eq!(walk.generation(merge).unwrap(), 3);
}

#[test]
fn is_ancestor_checks() {
    let fixture = RepoFixture::new();
    let (c1, c2, c3) = linear(&fixture);

    let mut walk = RevWalk::new(&fixture.store);
    assert!(walk.is_ancestor(c1, c3).unwrap());
    assert!(walk.is_ancestor(c3, c3).unwrap());
    assert!(!walk.is_ancestor(c3, c1).unwrap());
    let _ = c2;
}
