//! Rename detection over add/delete pairs.

use std::collections::HashMap;

use ferrite_hash::Oid;
use ferrite_object::ObjectKind;
use ferrite_odb::ObjectStore;

use crate::entries::{ChangeKind, DiffEntry};
use crate::DiffError;

/// Tuning knobs for rename detection.
#[derive(Debug, Clone, Copy)]
pub struct RenameOptions {
    /// Minimum similarity (0–100) for an inexact pair.
    pub threshold: u8,
    /// Pair-count cap on the O(n·m) similarity stage; above it, the
    /// remaining candidates simply stay adds and deletes.
    pub limit: usize,
}

impl Default for RenameOptions {
    fn default() -> Self {
        Self {
            threshold: 50,
            limit: 1000,
        }
    }
}

/// Rewrite matching delete+add pairs in `entries` into renames.
///
/// Stage one matches identical blob ids (score 100) without touching
/// content. Stage two scores remaining pairs by content similarity,
/// bounded by `options.limit` pairs; candidates beyond the budget are
/// dropped, not approximated.
pub fn detect_renames(
    store: &ObjectStore,
    entries: &mut Vec<DiffEntry>,
    options: RenameOptions,
) -> Result<(), DiffError> {
    let deleted: Vec<usize> = positions(entries, ChangeKind::Deleted);
    let added: Vec<usize> = positions(entries, ChangeKind::Added);
    if deleted.is_empty() || added.is_empty() {
        return Ok(());
    }

    let mut taken_deleted = vec![false; deleted.len()];
    let mut taken_added = vec![false; added.len()];
    let mut pairs: Vec<(usize, usize, u8)> = Vec::new();

    // Stage 1: exact matches by id.
    let mut by_oid: HashMap<Oid, Vec<usize>> = HashMap::new();
    for (di, &entry_at) in deleted.iter().enumerate() {
        if let Some(oid) = entries[entry_at].old_oid {
            by_oid.entry(oid).or_default().push(di);
        }
    }
    for (ai, &entry_at) in added.iter().enumerate() {
        let Some(oid) = entries[entry_at].new_oid else {
            continue;
        };
        if let Some(candidates) = by_oid.get_mut(&oid) {
            if let Some(di) = candidates.iter().position(|&di| !taken_deleted[di]) {
                let di = candidates.remove(di);
                taken_deleted[di] = true;
                taken_added[ai] = true;
                pairs.push((deleted[di], added[ai], 100));
            }
        }
    }

    // Stage 2: inexact similarity under the pair budget.
    let open_deleted: Vec<usize> = (0..deleted.len()).filter(|&i| !taken_deleted[i]).collect();
    let open_added: Vec<usize> = (0..added.len()).filter(|&i| !taken_added[i]).collect();
    if options.threshold < 100
        && !open_deleted.is_empty()
        && !open_added.is_empty()
        && open_deleted.len() * open_added.len() <= options.limit
    {
        for &di in &open_deleted {
            if taken_deleted[di] {
                continue;
            }
            let Some(old_oid) = entries[deleted[di]].old_oid else {
                continue;
            };
            let old_data = read_blob(store, &old_oid)?;

            let mut best: Option<(usize, u8)> = None;
            for &ai in &open_added {
                if taken_added[ai] {
                    continue;
                }
                let Some(new_oid) = entries[added[ai]].new_oid else {
                    continue;
                };
                let new_data = read_blob(store, &new_oid)?;
                let score = similarity_score(&old_data, &new_data);
                if score >= options.threshold
                    && best.map_or(true, |(_, best_score)| score > best_score)
                {
                    best = Some((ai, score));
                }
            }

            if let Some((ai, score)) = best {
                taken_deleted[di] = true;
                taken_added[ai] = true;
                pairs.push((deleted[di], added[ai], score));
            }
        }
    }

    // Apply: the add row becomes the rename, the delete row goes away.
    let mut drop_rows: Vec<usize> = Vec::new();
    for (deleted_at, added_at, score) in pairs {
        let old_path = entries[deleted_at].old_path.clone();
        let old_mode = entries[deleted_at].old_mode;
        let old_oid = entries[deleted_at].old_oid;

        let renamed = &mut entries[added_at];
        renamed.kind = ChangeKind::Renamed { score };
        renamed.old_path = old_path;
        renamed.old_mode = old_mode;
        renamed.old_oid = old_oid;
        drop_rows.push(deleted_at);
    }
    drop_rows.sort_unstable();
    for row in drop_rows.into_iter().rev() {
        entries.remove(row);
    }
    Ok(())
}

fn positions(entries: &[DiffEntry], kind: ChangeKind) -> Vec<usize> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.kind == kind)
        .map(|(i, _)| i)
        .collect()
}

fn read_blob(store: &ObjectStore, oid: &Oid) -> Result<Vec<u8>, DiffError> {
    Ok(store.open_object(oid, Some(ObjectKind::Blob))?.data)
}

/// Content similarity 0–100 via line-multiset overlap, the same shape of
/// estimate C git's diffcore-rename uses.
pub fn similarity_score(old: &[u8], new: &[u8]) -> u8 {
    if old.is_empty() && new.is_empty() {
        return 100;
    }
    if old.is_empty() || new.is_empty() {
        return 0;
    }

    let mut counts: HashMap<u64, (usize, usize)> = HashMap::new(); // hash -> (count, bytes)
    for line in split_lines(old) {
        let slot = counts.entry(fnv(line)).or_insert((0, line.len()));
        slot.0 += 1;
    }

    let mut matched_bytes = 0usize;
    for line in split_lines(new) {
        if let Some(slot) = counts.get_mut(&fnv(line)) {
            if slot.0 > 0 {
                slot.0 -= 1;
                matched_bytes += line.len();
            }
        }
    }

    let base = old.len().max(new.len());
    ((matched_bytes * 100) / base).min(100) as u8
}

fn split_lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    data.split_inclusive(|&b| b == b'\n')
}

fn fnv(line: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &b in line {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
