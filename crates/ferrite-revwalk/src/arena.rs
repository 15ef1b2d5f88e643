//! The per-walk commit arena.

use std::collections::HashMap;

use bitflags::bitflags;
use ferrite_hash::Oid;
use ferrite_object::Commit;

bitflags! {
    /// Per-commit flag word. The low bits are the walker's own; caller
    /// flags are allocated from bit 8 upward via [`CommitArena::alloc_flag`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WalkFlags: u32 {
        /// Node has entered the walk frontier once.
        const SEEN = 1 << 0;
        /// Node and everything it reaches is excluded from output.
        const UNINTERESTING = 1 << 1;
        /// Headers (parents, times, tree) are decoded.
        const PARSED = 1 << 2;
        /// Node was handed to the pending queue.
        const ADDED = 1 << 3;
        /// Scratch bit for generator-internal passes.
        const TEMP = 1 << 4;

        const _ = !0; // caller-allocated bits live above
    }
}

/// Index of a commit node inside one walk's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitIx(pub(crate) u32);

/// One commit's walk-time state.
#[derive(Debug)]
pub struct CommitNode {
    pub oid: Oid,
    pub flags: WalkFlags,
    /// Parents as arena indices; empty until headers parse.
    pub parents: Vec<CommitIx>,
    /// Committer timestamp, the default queue key.
    pub commit_time: i64,
    /// Root tree, available after header parse.
    pub tree: Option<Oid>,
    /// Generation number: 1 + max(parent generations); 0 = unknown.
    pub generation: u32,
    /// Full body, only present after `parse_body`.
    pub body: Option<Commit>,
}

impl CommitNode {
    fn new(oid: Oid) -> Self {
        Self {
            oid,
            flags: WalkFlags::empty(),
            parents: Vec::new(),
            commit_time: 0,
            tree: None,
            generation: 0,
            body: None,
        }
    }

    pub fn has(&self, flags: WalkFlags) -> bool {
        self.flags.contains(flags)
    }
}

/// Canonicalizing arena: one node per id for the lifetime of the walk.
#[derive(Debug, Default)]
pub struct CommitArena {
    nodes: Vec<CommitNode>,
    by_oid: HashMap<Oid, CommitIx>,
    next_caller_bit: u32,
}

impl CommitArena {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            by_oid: HashMap::new(),
            next_caller_bit: 8,
        }
    }

    /// The node for `oid`, interning a fresh unparsed one if needed.
    pub fn intern(&mut self, oid: Oid) -> CommitIx {
        if let Some(&ix) = self.by_oid.get(&oid) {
            return ix;
        }
        let ix = CommitIx(self.nodes.len() as u32);
        self.nodes.push(CommitNode::new(oid));
        self.by_oid.insert(oid, ix);
        ix
    }

    pub fn lookup(&self, oid: &Oid) -> Option<CommitIx> {
        self.by_oid.get(oid).copied()
    }

    pub fn get(&self, ix: CommitIx) -> &CommitNode {
        &self.nodes[ix.0 as usize]
    }

    pub fn get_mut(&mut self, ix: CommitIx) -> &mut CommitNode {
        &mut self.nodes[ix.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocate a caller flag bit (bits 8..32).
    pub fn alloc_flag(&mut self) -> Option<WalkFlags> {
        if self.next_caller_bit >= 32 {
            return None;
        }
        let flag = WalkFlags::from_bits_retain(1 << self.next_caller_bit);
        self.next_caller_bit += 1;
        Some(flag)
    }

    /// Clear walk-state flags on every node but keep the nodes: the pool
    /// survives a reset, reparsing nothing.
    pub fn clear_flags(&mut self, keep: WalkFlags) {
        for node in &mut self.nodes {
            node.flags &= keep;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (CommitIx, &CommitNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (CommitIx(i as u32), node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> Oid {
        let mut raw = [0u8; 20];
        raw[19] = n;
        Oid::from_raw(&raw, ferrite_hash::HashKind::Sha1).unwrap()
    }

    #[test]
    fn intern_is_canonical() {
        let mut arena = CommitArena::new();
        let a = arena.intern(oid(1));
        let b = arena.intern(oid(2));
        let a_again = arena.intern(oid(1));
        assert_eq!(a, a_again);
        assert_ne!(a, b);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.lookup(&oid(1)), Some(a));
        assert_eq!(arena.lookup(&oid(9)), None);
    }

    #[test]
    fn flags_set_and_clear() {
        let mut arena = CommitArena::new();
        let ix = arena.intern(oid(1));
        arena.get_mut(ix).flags |= WalkFlags::SEEN | WalkFlags::PARSED;
        assert!(arena.get(ix).has(WalkFlags::SEEN));

        arena.clear_flags(WalkFlags::PARSED);
        assert!(!arena.get(ix).has(WalkFlags::SEEN));
        assert!(arena.get(ix).has(WalkFlags::PARSED));
    }

    #[test]
    fn caller_flags_are_distinct() {
        let mut arena = CommitArena::new();
        let f1 = arena.alloc_flag().unwrap();
        let f2 = arena.alloc_flag().unwrap();
        assert_ne!(f1, f2);
        assert!((f1 & f2).is_empty());
        assert!((f1 & (WalkFlags::SEEN | WalkFlags::UNINTERESTING)).is_empty());
    }

    #[test]
    fn caller_flags_run_out_at_bit_32() {
        let mut arena = CommitArena::new();
        for _ in 8..32 {
            assert!(arena.alloc_flag().is_some());
        }
        assert!(arena.alloc_flag().is_none());
    }
}
