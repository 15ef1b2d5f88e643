use std::collections::HashMap;

use super::{encode_copy, encode_insert, write_varint};

const BLOCK: usize = 16;
const MAX_COPY: usize = 0x0100_0000;

/// Produce a delta turning `base` into `target`.
///
/// Greedy block matching over 16-byte anchors; not git's heaviest
/// deltifier, but the output is always a valid delta and shrinks well on
/// the insert-and-shift edits packs mostly see.
pub fn compute(base: &[u8], target: &[u8]) -> Vec<u8> {
    let mut delta = write_varint(base.len());
    delta.extend_from_slice(&write_varint(target.len()));

    if target.is_empty() {
        return delta;
    }

    // Index base positions by the hash of their 16-byte block.
    let mut anchors: HashMap<u64, Vec<usize>> = HashMap::new();
    if base.len() >= BLOCK {
        let mut at = 0;
        while at + BLOCK <= base.len() {
            anchors.entry(block_hash(&base[at..at + BLOCK])).or_default().push(at);
            at += BLOCK;
        }
    }

    let mut pending = Vec::new();
    let mut at = 0;
    while at < target.len() {
        let candidate = if at + BLOCK <= target.len() {
            anchors
                .get(&block_hash(&target[at..at + BLOCK]))
                .and_then(|starts| {
                    starts
                        .iter()
                        .map(|&start| (start, common_len(base, start, target, at)))
                        .filter(|&(_, len)| len >= BLOCK)
                        .max_by_key(|&(_, len)| len)
                })
        } else {
            None
        };

        match candidate {
            Some((start, len)) => {
                if !pending.is_empty() {
                    delta.extend_from_slice(&encode_insert(&pending));
                    pending.clear();
                }
                let mut copied = 0;
                while copied < len {
                    let chunk = (len - copied).min(MAX_COPY);
                    delta.extend_from_slice(&encode_copy(start + copied, chunk));
                    copied += chunk;
                }
                at += len;
            }
            None => {
                pending.push(target[at]);
                at += 1;
            }
        }
    }
    if !pending.is_empty() {
        delta.extend_from_slice(&encode_insert(&pending));
    }
    delta
}

fn block_hash(block: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &b in block {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn common_len(base: &[u8], base_at: usize, target: &[u8], target_at: usize) -> usize {
    base[base_at..]
        .iter()
        .zip(&target[target_at..])
        .take_while(|(a, b)| a == b)
        .count()
}
