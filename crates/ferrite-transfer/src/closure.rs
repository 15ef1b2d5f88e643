//! Object closure selection: everything reachable from the wants that
//! the haves do not already cover.

use std::collections::HashSet;

use ferrite_hash::Oid;
use ferrite_object::{ObjectKind, Tree};
use ferrite_odb::ObjectStore;
use ferrite_pack::{plan_whole, PlannedObject};
use ferrite_revwalk::RevWalk;

use crate::TransferError;

/// Compute the pack content for a fetch of `wants` by a peer holding
/// `haves`: the commit difference plus every tree and blob those
/// commits introduce, plus any annotated tags among the wants.
pub fn collect_closure(
    store: &ObjectStore,
    wants: &[Oid],
    haves: &[Oid],
) -> Result<Vec<PlannedObject>, TransferError> {
    let mut walk = RevWalk::new(store);
    let mut tag_objects: Vec<Oid> = Vec::new();
    let mut loose_wants: Vec<Oid> = Vec::new();

    for &want in wants {
        match store.info(&want)?.kind {
            ObjectKind::Commit => walk.mark_start(want)?,
            ObjectKind::Tag => {
                // Ship the tag chain itself, then treat its peeled
                // target as a regular want.
                let mut target = want;
                loop {
                    match store.info(&target)?.kind {
                        ObjectKind::Tag => {
                            if !tag_objects.contains(&target) {
                                tag_objects.push(target);
                            }
                            let data = store.open_object(&target, Some(ObjectKind::Tag))?;
                            target = ferrite_object::Tag::parse(&data.data)?.target;
                        }
                        ObjectKind::Commit => {
                            walk.mark_start(target)?;
                            break;
                        }
                        _ => {
                            loose_wants.push(target);
                            break;
                        }
                    }
                }
            }
            _ => loose_wants.push(want),
        }
    }
    for &have in haves {
        // Unknown haves are simply ignored; the peer advertised
        // something we cannot see.
        if matches!(store.info(&have), Ok(info) if info.kind == ObjectKind::Commit) {
            walk.mark_uninteresting(have)?;
        }
    }

    let commits = walk.collect_all()?;

    // Objects already on the peer: the trees and blobs of everything
    // reachable from the haves.
    let mut covered: HashSet<Oid> = HashSet::new();
    {
        let mut have_walk = RevWalk::new(store);
        for &have in haves {
            if matches!(store.info(&have), Ok(info) if info.kind == ObjectKind::Commit) {
                have_walk.mark_start(have)?;
            }
        }
        for commit_oid in have_walk.collect_all()? {
            covered.insert(commit_oid);
            let commit = parse_commit(store, &commit_oid)?;
            collect_tree(store, &commit.tree, &mut covered, &mut Vec::new())?;
        }
    }

    // The pack: wanted commits, their novel trees and blobs, tags.
    let mut planned: Vec<PlannedObject> = Vec::new();
    let mut packed: HashSet<Oid> = HashSet::new();

    for commit_oid in &commits {
        let data = store.open_object(commit_oid, Some(ObjectKind::Commit))?;
        if packed.insert(*commit_oid) {
            planned.push(plan_whole(*commit_oid, ObjectKind::Commit, data.data.clone()));
        }
        let commit = ferrite_object::Commit::parse(&data.data)?;
        let mut fresh: Vec<(Oid, ObjectKind, Vec<u8>)> = Vec::new();
        collect_tree(store, &commit.tree, &mut covered, &mut fresh)?;
        for (oid, kind, bytes) in fresh {
            if packed.insert(oid) {
                planned.push(plan_whole(oid, kind, bytes));
            }
        }
    }

    for oid in loose_wants.into_iter().chain(tag_objects) {
        if covered.contains(&oid) || !packed.insert(oid) {
            continue;
        }
        let data = store.open_object(&oid, None)?;
        planned.push(plan_whole(oid, data.kind, data.data));
    }

    Ok(planned)
}

fn parse_commit(
    store: &ObjectStore,
    oid: &Oid,
) -> Result<ferrite_object::Commit, TransferError> {
    let data = store.open_object(oid, Some(ObjectKind::Commit))?;
    Ok(ferrite_object::Commit::parse(&data.data)?)
}

/// Walk a tree recursively. Every object not yet in `covered` is added
/// there and, when `fresh` is collecting, reported with its bytes.
fn collect_tree(
    store: &ObjectStore,
    tree_oid: &Oid,
    covered: &mut HashSet<Oid>,
    fresh: &mut Vec<(Oid, ObjectKind, Vec<u8>)>,
) -> Result<(), TransferError> {
    if !covered.insert(*tree_oid) {
        return Ok(());
    }
    let data = store.open_object(tree_oid, Some(ObjectKind::Tree))?;
    fresh.push((*tree_oid, ObjectKind::Tree, data.data.clone()));

    let tree = Tree::parse(&data.data)?;
    for entry in tree.entries() {
        if entry.mode.is_tree() {
            collect_tree(store, &entry.oid, covered, fresh)?;
        } else if entry.mode.is_gitlink() {
            // Submodule commits live in another repository.
            continue;
        } else if covered.insert(entry.oid) {
            let blob = store.open_object(&entry.oid, Some(ObjectKind::Blob))?;
            fresh.push((entry.oid, ObjectKind::Blob, blob.data));
        }
    }
    Ok(())
}
