//! The walk itself: ordered emission with reachability subtraction.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use bstr::BStr;
use ferrite_hash::Oid;
use ferrite_object::{Commit, ObjectKind, Tree};
use ferrite_odb::ObjectStore;

use crate::arena::{CommitArena, CommitIx, CommitNode, WalkFlags};
use crate::filter::RevFilter;
use crate::RevWalkError;

/// The primary emission order. Exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Committer time, newest first.
    #[default]
    CommitTimeDesc,
    /// A commit is emitted only after all of its children have been.
    Topo,
    /// The full CommitTimeDesc result, inverted.
    Reverse,
}

/// Tree-level predicate: keep a commit whose tree differs from every
/// parent's under the filter's view (TREESAME elimination).
pub trait TreeFilter {
    /// `true` when the commit's tree is "different" and the commit stays.
    fn include(
        &self,
        store: &ObjectStore,
        tree: &Oid,
        parent_trees: &[Oid],
    ) -> Result<bool, RevWalkError>;
}

/// Restrict history to commits touching `path`.
pub struct PathFilter {
    path: Vec<u8>,
}

impl PathFilter {
    pub fn new(path: impl AsRef<[u8]>) -> Self {
        Self {
            path: path.as_ref().to_vec(),
        }
    }

    /// The blob (or subtree) id `path` resolves to under `tree`.
    fn resolve(
        &self,
        store: &ObjectStore,
        tree: &Oid,
    ) -> Result<Option<Oid>, RevWalkError> {
        let mut current = *tree;
        let mut components = self.path.split(|&b| b == b'/').peekable();
        while let Some(component) = components.next() {
            let obj = store.open_object(&current, Some(ObjectKind::Tree))?;
            let parsed = Tree::parse(&obj.data)?;
            let Some(entry) = parsed.find(BStr::new(component)) else {
                return Ok(None);
            };
            if components.peek().is_none() {
                return Ok(Some(entry.oid));
            }
            if !entry.mode.is_tree() {
                return Ok(None);
            }
            current = entry.oid;
        }
        Ok(Some(current))
    }
}

impl TreeFilter for PathFilter {
    fn include(
        &self,
        store: &ObjectStore,
        tree: &Oid,
        parent_trees: &[Oid],
    ) -> Result<bool, RevWalkError> {
        let mine = self.resolve(store, tree)?;
        if parent_trees.is_empty() {
            // Root commit: include iff the path exists at all.
            return Ok(mine.is_some());
        }
        for parent in parent_trees {
            if self.resolve(store, parent)? == mine {
                // TREESAME to one parent: not a change along this line.
                return Ok(false);
            }
        }
        Ok(true)
    }
}

struct QueueEntry {
    ix: CommitIx,
    time: i64,
    order: u64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.ix == other.ix
    }
}
impl Eq for QueueEntry {}
impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: newest first, insertion order breaking ties.
        self.time
            .cmp(&other.time)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// The revision walker.
pub struct RevWalk<'a> {
    store: &'a ObjectStore,
    arena: CommitArena,
    queue: BinaryHeap<QueueEntry>,
    order: SortOrder,
    merge_base_mode: bool,
    filters: Vec<RevFilter>,
    tree_filter: Option<Box<dyn TreeFilter>>,
    insertion: u64,
    /// Buffered output for Topo / Reverse / merge-base modes.
    prepared: Option<VecDeque<CommitIx>>,
    starts: Vec<CommitIx>,
}

impl<'a> RevWalk<'a> {
    pub fn new(store: &'a ObjectStore) -> Self {
        Self {
            store,
            arena: CommitArena::new(),
            queue: BinaryHeap::new(),
            order: SortOrder::default(),
            merge_base_mode: false,
            filters: Vec::new(),
            tree_filter: None,
            insertion: 0,
            prepared: None,
            starts: Vec::new(),
        }
    }

    pub fn store(&self) -> &ObjectStore {
        self.store
    }

    pub fn arena(&self) -> &CommitArena {
        &self.arena
    }

    /// Select the primary order. Must precede the first `next`.
    pub fn set_order(&mut self, order: SortOrder) {
        self.order = order;
    }

    /// Switch to merge-base emission: the walk yields the minimal common
    /// ancestors of the start set instead of the history itself.
    pub fn set_merge_base_mode(&mut self, on: bool) {
        self.merge_base_mode = on;
    }

    pub fn add_filter(&mut self, filter: RevFilter) {
        self.filters.push(filter);
    }

    /// Install a tree filter. Illegal together with merge-base mode; the
    /// conflict surfaces on the first `next`.
    pub fn set_tree_filter(&mut self, filter: Box<dyn TreeFilter>) {
        self.tree_filter = Some(filter);
    }

    /// Mark a commit as a traversal start.
    pub fn mark_start(&mut self, oid: Oid) -> Result<(), RevWalkError> {
        let ix = self.parse_headers(oid)?;
        self.starts.push(ix);
        let node = self.arena.get_mut(ix);
        if !node.has(WalkFlags::SEEN) {
            node.flags |= WalkFlags::SEEN;
            let time = node.commit_time;
            self.push_queue(ix, time);
        }
        Ok(())
    }

    /// Mark a commit uninteresting: it and every ancestor is withheld.
    pub fn mark_uninteresting(&mut self, oid: Oid) -> Result<(), RevWalkError> {
        let start = self.parse_headers(oid)?;
        let mut stack = vec![start];
        while let Some(ix) = stack.pop() {
            if self.arena.get(ix).has(WalkFlags::UNINTERESTING) {
                continue;
            }
            self.arena.get_mut(ix).flags |= WalkFlags::UNINTERESTING;
            let parents = match self.parse_headers_ix(ix) {
                Ok(()) => self.arena.get(ix).parents.clone(),
                // A shallow boundary: ancestors simply are not here.
                Err(RevWalkError::CommitNotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            stack.extend(parents);
        }
        Ok(())
    }

    /// Reclaim walk state, keeping the parsed commit pool for reuse.
    pub fn reset(&mut self) {
        self.arena.clear_flags(WalkFlags::PARSED);
        self.queue.clear();
        self.prepared = None;
        self.starts.clear();
        self.insertion = 0;
    }

    /// The next commit id in the configured order, or `None`.
    pub fn next(&mut self) -> Result<Option<Oid>, RevWalkError> {
        if self.merge_base_mode {
            if self.tree_filter.is_some() {
                return Err(RevWalkError::TreeFilterWithMergeBase);
            }
            if self.prepared.is_none() {
                let tips = std::mem::take(&mut self.starts);
                let bases = crate::merge::merge_bases(self, &tips)?;
                self.prepared = Some(bases.into_iter().collect());
            }
            return Ok(self
                .prepared
                .as_mut()
                .and_then(|q| q.pop_front())
                .map(|ix| self.arena.get(ix).oid));
        }

        match self.order {
            SortOrder::CommitTimeDesc => loop {
                let Some(ix) = self.pop_time_order()? else {
                    return Ok(None);
                };
                if self.passes_filters(ix)? {
                    return Ok(Some(self.arena.get(ix).oid));
                }
            },
            SortOrder::Topo | SortOrder::Reverse => {
                if self.prepared.is_none() {
                    self.prepare_buffered()?;
                }
                Ok(self
                    .prepared
                    .as_mut()
                    .and_then(|q| q.pop_front())
                    .map(|ix| self.arena.get(ix).oid))
            }
        }
    }

    /// Drain the walk into a vector.
    pub fn collect_all(&mut self) -> Result<Vec<Oid>, RevWalkError> {
        let mut out = Vec::new();
        while let Some(oid) = self.next()? {
            out.push(oid);
        }
        Ok(out)
    }

    /// Is `ancestor` reachable from `descendant`?
    pub fn is_ancestor(
        &mut self,
        ancestor: Oid,
        descendant: Oid,
    ) -> Result<bool, RevWalkError> {
        if ancestor == descendant {
            return Ok(true);
        }
        let target = self.parse_headers(ancestor)?;
        let start = self.parse_headers(descendant)?;
        let mut stack = vec![start];
        let mut seen = std::collections::HashSet::new();
        while let Some(ix) = stack.pop() {
            if ix == target {
                return Ok(true);
            }
            if !seen.insert(ix) {
                continue;
            }
            self.parse_headers_ix(ix)?;
            stack.extend(self.arena.get(ix).parents.iter().copied());
        }
        Ok(false)
    }

    /// Compute a commit's generation number (1 + max over parents),
    /// memoized in the arena.
    pub fn generation(&mut self, oid: Oid) -> Result<u32, RevWalkError> {
        let ix = self.parse_headers(oid)?;
        self.generation_ix(ix)
    }

    fn generation_ix(&mut self, start: CommitIx) -> Result<u32, RevWalkError> {
        // Iterative post-order; generation 0 means "not yet computed".
        let mut stack = vec![(start, false)];
        while let Some((ix, expanded)) = stack.pop() {
            if self.arena.get(ix).generation != 0 {
                continue;
            }
            self.parse_headers_ix(ix)?;
            if expanded {
                let max_parent = self
                    .arena
                    .get(ix)
                    .parents
                    .iter()
                    .map(|&p| self.arena.get(p).generation)
                    .max()
                    .unwrap_or(0);
                self.arena.get_mut(ix).generation = max_parent + 1;
            } else {
                stack.push((ix, true));
                for &parent in &self.arena.get(ix).parents.clone() {
                    if self.arena.get(parent).generation == 0 {
                        stack.push((parent, false));
                    }
                }
            }
        }
        Ok(self.arena.get(start).generation)
    }

    // --- internals shared with merge.rs ---

    /// Intern and decode headers for `oid`.
    pub(crate) fn parse_headers(&mut self, oid: Oid) -> Result<CommitIx, RevWalkError> {
        let ix = self.arena.intern(oid);
        self.parse_headers_ix(ix)?;
        Ok(ix)
    }

    pub(crate) fn parse_headers_ix(&mut self, ix: CommitIx) -> Result<(), RevWalkError> {
        if self.arena.get(ix).has(WalkFlags::PARSED) {
            return Ok(());
        }
        let oid = self.arena.get(ix).oid;
        let data = match self.store.open_object(&oid, Some(ObjectKind::Commit)) {
            Ok(data) => data,
            Err(ferrite_odb::OdbError::Missing(oid)) => {
                return Err(RevWalkError::CommitNotFound(oid))
            }
            Err(ferrite_odb::OdbError::WrongKind { oid, .. }) => {
                return Err(RevWalkError::NotACommit(oid))
            }
            Err(e) => return Err(e.into()),
        };
        let commit = Commit::parse(&data.data)?;

        let parent_ixs: Vec<CommitIx> = commit
            .parents
            .iter()
            .map(|&parent| self.arena.intern(parent))
            .collect();

        let node = self.arena.get_mut(ix);
        node.parents = parent_ixs;
        node.commit_time = commit.committer.when.seconds;
        node.tree = Some(commit.tree);
        node.flags |= WalkFlags::PARSED;
        // Keep the body: the walk just paid for the read, and filters or
        // callers asking again would decompress twice otherwise.
        node.body = Some(commit);
        Ok(())
    }

    /// Full body of a commit (headers + message).
    pub fn parse_body(&mut self, oid: Oid) -> Result<&Commit, RevWalkError> {
        let ix = self.parse_headers(oid)?;
        if self.arena.get(ix).body.is_none() {
            let data = self.store.open_object(&oid, Some(ObjectKind::Commit))?;
            self.arena.get_mut(ix).body = Some(Commit::parse(&data.data)?);
        }
        Ok(self.arena.get(ix).body.as_ref().expect("just parsed"))
    }

    pub(crate) fn node(&self, ix: CommitIx) -> &CommitNode {
        self.arena.get(ix)
    }

    fn push_queue(&mut self, ix: CommitIx, time: i64) {
        let entry = QueueEntry {
            ix,
            time,
            order: self.insertion,
        };
        self.insertion += 1;
        self.queue.push(entry);
    }

    /// Pop the next commit in time order, expanding parents.
    fn pop_time_order(&mut self) -> Result<Option<CommitIx>, RevWalkError> {
        while let Some(entry) = self.queue.pop() {
            let ix = entry.ix;
            self.parse_headers_ix(ix)?;

            for &parent in &self.arena.get(ix).parents.clone() {
                let node = self.arena.get(parent);
                if node.has(WalkFlags::SEEN) {
                    continue;
                }
                self.parse_headers_ix(parent)?;
                let node = self.arena.get_mut(parent);
                node.flags |= WalkFlags::SEEN;
                let time = node.commit_time;
                self.push_queue(parent, time);
            }

            if self.arena.get(ix).has(WalkFlags::UNINTERESTING) {
                continue;
            }
            return Ok(Some(ix));
        }
        Ok(None)
    }

    /// Build the full buffered order for Topo or Reverse.
    fn prepare_buffered(&mut self) -> Result<(), RevWalkError> {
        let mut time_ordered = Vec::new();
        loop {
            let Some(ix) = self.pop_time_order()? else { break };
            if self.passes_filters(ix)? {
                time_ordered.push(ix);
            }
        }

        let ordered = match self.order {
            SortOrder::Reverse => {
                time_ordered.reverse();
                time_ordered
            }
            SortOrder::Topo => self.topo_order(time_ordered)?,
            SortOrder::CommitTimeDesc => time_ordered,
        };
        self.prepared = Some(ordered.into_iter().collect());
        Ok(())
    }

    /// Children-before-parents order over an already collected set.
    fn topo_order(&mut self, commits: Vec<CommitIx>) -> Result<Vec<CommitIx>, RevWalkError> {
        let in_set: std::collections::HashSet<CommitIx> = commits.iter().copied().collect();
        let mut indegree: HashMap<CommitIx, usize> = HashMap::new();
        for &ix in &commits {
            indegree.entry(ix).or_insert(0);
            for &parent in &self.arena.get(ix).parents {
                if in_set.contains(&parent) {
                    *indegree.entry(parent).or_insert(0) += 1;
                }
            }
        }

        // Seed with zero-indegree commits in the original (time) order.
        let mut ready: VecDeque<CommitIx> = commits
            .iter()
            .copied()
            .filter(|ix| indegree[ix] == 0)
            .collect();
        let mut out = Vec::with_capacity(commits.len());

        while let Some(ix) = ready.pop_front() {
            out.push(ix);
            for &parent in &self.arena.get(ix).parents {
                if let Some(count) = indegree.get_mut(&parent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(parent);
                    }
                }
            }
        }
        Ok(out)
    }

    fn passes_filters(&mut self, ix: CommitIx) -> Result<bool, RevWalkError> {
        if let Some(filter) = self.tree_filter.take() {
            let outcome = {
                let node = self.arena.get(ix);
                let tree = node.tree.expect("parsed node has a tree");
                let parents = node.parents.clone();
                let parent_trees: Vec<Oid> = parents
                    .iter()
                    .filter_map(|&p| self.arena.get(p).tree)
                    .collect();
                filter.include(self.store, &tree, &parent_trees)
            };
            self.tree_filter = Some(filter);
            if !outcome? {
                return Ok(false);
            }
        }

        if self.filters.is_empty() {
            return Ok(true);
        }
        let oid = self.arena.get(ix).oid;
        let body = self.parse_body(oid)?.clone();
        Ok(self.filters.iter().all(|f| f(&body)))
    }
}
