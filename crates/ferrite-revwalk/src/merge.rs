//! Merge-base computation over the walk arena.
//!
//! Paint-down: each tip owns one reachability bit; flags flow to
//! parents through a newest-first queue. A node holding every tip's bit
//! is a common ancestor; the surviving set after dropping ancestors of
//! other candidates is the merge-base set — all minimal bases, so a
//! criss-cross pair yields two.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::arena::CommitIx;
use crate::walk::RevWalk;
use crate::RevWalkError;

/// One reachability bit per tip, so the paint word caps the tip count.
const MAX_TIPS: usize = 62;

struct PaintEntry {
    ix: CommitIx,
    time: i64,
}

impl PartialEq for PaintEntry {
    fn eq(&self, other: &Self) -> bool {
        self.ix == other.ix
    }
}
impl Eq for PaintEntry {}
impl PartialOrd for PaintEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PaintEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time.cmp(&other.time)
    }
}

/// All minimal common ancestors of `tips`, newest first.
pub(crate) fn merge_bases(
    walk: &mut RevWalk<'_>,
    tips: &[CommitIx],
) -> Result<Vec<CommitIx>, RevWalkError> {
    match tips.len() {
        0 => return Ok(Vec::new()),
        1 => return Ok(vec![tips[0]]),
        n if n > MAX_TIPS => {
            return Err(RevWalkError::TooManyTips {
                max: MAX_TIPS,
                got: n,
            })
        }
        _ => {}
    }

    let all_mask: u64 = if tips.len() == 64 {
        u64::MAX
    } else {
        (1u64 << tips.len()) - 1
    };

    let mut paint: HashMap<CommitIx, u64> = HashMap::new();
    let mut queue: BinaryHeap<PaintEntry> = BinaryHeap::new();
    let mut candidates: Vec<CommitIx> = Vec::new();

    for (bit, &tip) in tips.iter().enumerate() {
        walk.parse_headers_ix(tip)?;
        let mask = paint.entry(tip).or_insert(0);
        *mask |= 1 << bit;
        queue.push(PaintEntry {
            ix: tip,
            time: walk.node(tip).commit_time,
        });
    }

    // Identical tips (or one tip reaching another immediately) can make a
    // tip itself the base; the general loop handles it uniformly.
    let mut enqueued_done: HashSet<CommitIx> = HashSet::new();
    while let Some(entry) = queue.pop() {
        let mask = *paint.get(&entry.ix).unwrap_or(&0);

        if mask == all_mask {
            if enqueued_done.insert(entry.ix) {
                candidates.push(entry.ix);
            }
            // Painted ancestors of a full node would all become full too;
            // they are redundant by construction, so do not expand.
            continue;
        }

        walk.parse_headers_ix(entry.ix)?;
        for &parent in &walk.node(entry.ix).parents.clone() {
            walk.parse_headers_ix(parent)?;
            let slot = paint.entry(parent).or_insert(0);
            let merged = *slot | mask;
            if merged != *slot {
                *slot = merged;
                queue.push(PaintEntry {
                    ix: parent,
                    time: walk.node(parent).commit_time,
                });
            }
        }
    }

    prune_redundant(walk, candidates)
}

/// Drop every candidate that is an ancestor of another candidate.
fn prune_redundant(
    walk: &mut RevWalk<'_>,
    candidates: Vec<CommitIx>,
) -> Result<Vec<CommitIx>, RevWalkError> {
    if candidates.len() <= 1 {
        return Ok(candidates);
    }

    let mut dropped: HashSet<usize> = HashSet::new();
    for i in 0..candidates.len() {
        if dropped.contains(&i) {
            continue;
        }
        for j in 0..candidates.len() {
            if i == j || dropped.contains(&j) {
                continue;
            }
            let i_oid = walk.node(candidates[i]).oid;
            let j_oid = walk.node(candidates[j]).oid;
            if walk.is_ancestor(j_oid, i_oid)? {
                dropped.insert(j);
            }
        }
    }

    Ok(candidates
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !dropped.contains(i))
        .map(|(_, ix)| ix)
        .collect())
}
