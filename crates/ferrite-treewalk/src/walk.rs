//! The lock-step walk over N sources.

use bstr::BString;

use crate::iter::{IterEntry, TreeIter};
use crate::TreeWalkError;

/// One step of the walk: a path and what each source has there.
#[derive(Debug, Clone)]
pub struct WalkStep {
    /// Full path from the walk root (no leading slash).
    pub path: BString,
    /// Depth below the root (0 = top level).
    pub depth: usize,
    /// Per-source entry; `None` for sources without this path.
    pub entries: Vec<Option<IterEntry>>,
}

impl WalkStep {
    /// The entry from source `i`, if it is positioned on this path.
    pub fn entry(&self, i: usize) -> Option<&IterEntry> {
        self.entries.get(i).and_then(|e| e.as_ref())
    }

    /// Does every positioned source agree this is a subtree?
    pub fn is_subtree(&self) -> bool {
        let mut any = false;
        for entry in self.entries.iter().flatten() {
            if !entry.is_tree() {
                return false;
            }
            any = true;
        }
        any
    }

    /// First positioned entry (useful for single-source walks).
    pub fn first(&self) -> Option<&IterEntry> {
        self.entries.iter().flatten().next()
    }
}

/// One materialized directory level of one source.
struct Level {
    entries: Vec<IterEntry>,
    pos: usize,
}

impl Level {
    fn current(&self) -> Option<&IterEntry> {
        self.entries.get(self.pos)
    }
}

/// The walk state: per-source level stacks plus a shared path buffer.
pub struct TreeWalk<'a> {
    sources: Vec<TreeIter<'a>>,
    /// Parallel stacks; `stacks[i]` has one level per open directory.
    stacks: Vec<Vec<Level>>,
    /// Open directories: the component name plus which sources actually
    /// held the subtree entry (those advance past it on pop).
    open_dirs: Vec<(BString, Vec<bool>)>,
    /// Reusable path buffer, grown on demand.
    path_buf: Vec<u8>,
    /// Sources matched by the step most recently returned.
    last_matched: Option<Vec<bool>>,
    recursive: bool,
}

impl<'a> TreeWalk<'a> {
    /// Start a walk over `sources`, all positioned at their roots.
    pub fn new(sources: Vec<TreeIter<'a>>) -> Result<Self, TreeWalkError> {
        let mut stacks = Vec::with_capacity(sources.len());
        for source in &sources {
            stacks.push(vec![Level {
                entries: source.open_level(b"", None)?,
                pos: 0,
            }]);
        }
        Ok(Self {
            sources,
            stacks,
            open_dirs: Vec::new(),
            path_buf: Vec::with_capacity(128),
            last_matched: None,
            recursive: false,
        })
    }

    /// Automatically descend into every subtree, emitting only leaves.
    pub fn set_recursive(&mut self, recursive: bool) {
        self.recursive = recursive;
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Advance to the next path and report it, or `None` at the end.
    pub fn next(&mut self) -> Result<Option<WalkStep>, TreeWalkError> {
        // Consume the previous step (unless enter_subtree already did).
        if let Some(matched) = self.last_matched.take() {
            self.advance(&matched);
        }

        loop {
            // Pop exhausted levels, advancing past the parent subtree.
            while self.all_current_exhausted() {
                if self.open_dirs.is_empty() {
                    return Ok(None);
                }
                self.pop_level();
            }

            let step = self.current_step();
            let matched: Vec<bool> = step.entries.iter().map(|e| e.is_some()).collect();

            if self.recursive && step.is_subtree() {
                self.enter(&matched, &step)?;
                continue;
            }

            self.last_matched = Some(matched);
            return Ok(Some(step));
        }
    }

    /// Descend into the subtree the last step reported. Sources not
    /// positioned on it contribute empty levels underneath.
    pub fn enter_subtree(&mut self) -> Result<(), TreeWalkError> {
        let Some(matched) = self.last_matched.take() else {
            return Err(TreeWalkError::NoCurrentStep);
        };
        let step = self.current_step();
        if !step.is_subtree() {
            self.last_matched = Some(matched);
            return Err(TreeWalkError::NotASubtree);
        }
        self.enter(&matched, &step)
    }

    /// Current full path including `name`, reusing the shared buffer.
    fn render_path(&mut self, name: &[u8]) -> BString {
        self.path_buf.clear();
        let mut needed = name.len();
        for (dir, _) in &self.open_dirs {
            needed += dir.len() + 1;
        }
        self.ensure_path_capacity(needed);
        for (dir, _) in &self.open_dirs {
            self.path_buf.extend_from_slice(dir);
            self.path_buf.push(b'/');
        }
        self.path_buf.extend_from_slice(name);
        BString::from(self.path_buf.clone())
    }

    /// Grow the path buffer geometrically; the fast path is a no-op.
    fn ensure_path_capacity(&mut self, needed: usize) {
        if self.path_buf.capacity() >= needed {
            return;
        }
        let mut target = self.path_buf.capacity().max(16);
        while target < needed {
            target *= 2;
        }
        self.path_buf.reserve(target - self.path_buf.len());
    }

    fn all_current_exhausted(&self) -> bool {
        self.stacks
            .iter()
            .all(|stack| stack.last().map_or(true, |level| level.current().is_none()))
    }

    /// The minimal current path across sources, with per-source entries.
    fn current_step(&mut self) -> WalkStep {
        let mut min: Option<IterEntry> = None;
        for stack in &self.stacks {
            if let Some(entry) = stack.last().and_then(|level| level.current()) {
                let smaller = match &min {
                    None => true,
                    Some(current) => entry.cmp_order(current) == std::cmp::Ordering::Less,
                };
                if smaller {
                    min = Some(entry.clone());
                }
            }
        }
        let min = min.expect("caller checked exhaustion");

        let entries: Vec<Option<IterEntry>> = self
            .stacks
            .iter()
            .map(|stack| {
                stack
                    .last()
                    .and_then(|level| level.current())
                    .filter(|entry| entry.cmp_order(&min) == std::cmp::Ordering::Equal)
                    .cloned()
            })
            .collect();

        WalkStep {
            path: self.render_path(&min.name),
            depth: self.open_dirs.len(),
            entries,
        }
    }

    fn advance(&mut self, matched: &[bool]) {
        for (stack, &hit) in self.stacks.iter_mut().zip(matched) {
            if hit {
                if let Some(level) = stack.last_mut() {
                    level.pos += 1;
                }
            }
        }
    }

    fn enter(&mut self, matched: &[bool], step: &WalkStep) -> Result<(), TreeWalkError> {
        let name = {
            let entry = step
                .entries
                .iter()
                .flatten()
                .next()
                .expect("subtree step has an entry");
            entry.name.clone()
        };

        let mut prefix = BString::from(step.path.clone());
        prefix.push(b'/');

        for (i, stack) in self.stacks.iter_mut().enumerate() {
            let level = if matched[i] {
                let subtree = step.entries[i].as_ref().and_then(|e| e.oid.as_ref());
                Level {
                    entries: self.sources[i].open_level(&prefix, subtree)?,
                    pos: 0,
                }
            } else {
                Level {
                    entries: Vec::new(),
                    pos: 0,
                }
            };
            stack.push(level);
        }
        self.open_dirs.push((name, matched.to_vec()));
        Ok(())
    }

    /// Leave the current subtree: drop one level everywhere and step
    /// past the subtree entry in exactly the sources that held it.
    fn pop_level(&mut self) {
        let Some((_, matched)) = self.open_dirs.pop() else {
            return;
        };
        for (stack, hit) in self.stacks.iter_mut().zip(matched) {
            stack.pop();
            if hit {
                if let Some(level) = stack.last_mut() {
                    level.pos += 1;
                }
            }
        }
    }
}
