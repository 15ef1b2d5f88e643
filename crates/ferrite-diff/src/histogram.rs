//! Histogram diff.
//!
//! Recursively anchors on the lowest-occurrence line common to both
//! sides, splits around the longest common run through it, and falls
//! back to Myers for regions without a usable anchor. Shines on large
//! inputs with heavy repetition, where Myers' D grows quadratically.

use std::collections::HashMap;

use crate::edit::Edit;
use crate::myers;
use crate::text::RawText;

/// Occurrence counts above this disqualify a line as an anchor.
const MAX_CHAIN: usize = 64;

pub(crate) fn diff(a: &RawText, b: &RawText) -> Vec<Edit> {
    let mut edits = Vec::new();
    split(
        a,
        b,
        0,
        a.line_count(),
        0,
        b.line_count(),
        &mut edits,
        0,
    );
    edits
}

#[allow(clippy::too_many_arguments)]
fn split(
    a: &RawText,
    b: &RawText,
    a_lo: usize,
    a_hi: usize,
    b_lo: usize,
    b_hi: usize,
    edits: &mut Vec<Edit>,
    depth: usize,
) {
    // Trim common prefix and suffix of this region first.
    let (mut a_lo, mut a_hi, mut b_lo, mut b_hi) = (a_lo, a_hi, b_lo, b_hi);
    while a_lo < a_hi && b_lo < b_hi && a.lines_equal(a_lo, b, b_lo) {
        a_lo += 1;
        b_lo += 1;
    }
    while a_hi > a_lo && b_hi > b_lo && a.lines_equal(a_hi - 1, b, b_hi - 1) {
        a_hi -= 1;
        b_hi -= 1;
    }

    if a_lo == a_hi && b_lo == b_hi {
        return;
    }
    if a_lo == a_hi || b_lo == b_hi {
        edits.push(Edit::new(a_lo, a_hi, b_lo, b_hi));
        return;
    }

    // Recursion depth is bounded by the anchor split; past a sane depth
    // hand the region to Myers wholesale.
    if depth > 64 {
        fallback(a, b, a_lo, a_hi, b_lo, b_hi, edits);
        return;
    }

    match best_anchor(a, b, a_lo, a_hi, b_lo, b_hi) {
        None => fallback(a, b, a_lo, a_hi, b_lo, b_hi, edits),
        Some(anchor) => {
            split(a, b, a_lo, anchor.a_start, b_lo, anchor.b_start, edits, depth + 1);
            split(a, b, anchor.a_end, a_hi, anchor.b_end, b_hi, edits, depth + 1);
        }
    }
}

/// Run Myers on the sub-region and translate its output in place.
fn fallback(
    a: &RawText,
    b: &RawText,
    a_lo: usize,
    a_hi: usize,
    b_lo: usize,
    b_hi: usize,
    edits: &mut Vec<Edit>,
) {
    let sub_a = RawText::new(
        (a_lo..a_hi).flat_map(|i| a.line(i).to_vec()).collect(),
    );
    let sub_b = RawText::new(
        (b_lo..b_hi).flat_map(|i| b.line(i).to_vec()).collect(),
    );
    for edit in myers::diff(&sub_a, &sub_b) {
        edits.push(Edit::new(
            edit.begin_a + a_lo,
            edit.end_a + a_lo,
            edit.begin_b + b_lo,
            edit.end_b + b_lo,
        ));
    }
}

struct Anchor {
    a_start: usize,
    a_end: usize,
    b_start: usize,
    b_end: usize,
}

/// The rarest common line, expanded to the longest equal run around it.
fn best_anchor(
    a: &RawText,
    b: &RawText,
    a_lo: usize,
    a_hi: usize,
    b_lo: usize,
    b_hi: usize,
) -> Option<Anchor> {
    // Count occurrences on the A side by hash.
    let mut counts: HashMap<u64, (usize, usize)> = HashMap::new(); // hash -> (count, first index)
    for i in a_lo..a_hi {
        let slot = counts.entry(a.hash(i)).or_insert((0, i));
        slot.0 += 1;
    }

    let mut best: Option<(usize, Anchor)> = None; // (chain length, anchor)
    for j in b_lo..b_hi {
        let Some(&(count, i)) = counts.get(&b.hash(j)) else {
            continue;
        };
        if count > MAX_CHAIN || !a.lines_equal(i, b, j) {
            continue;
        }
        if best.as_ref().is_some_and(|(chain, _)| *chain <= count) {
            continue;
        }

        // Expand the equal run around (i, j).
        let (mut a_start, mut b_start) = (i, j);
        while a_start > a_lo && b_start > b_lo && a.lines_equal(a_start - 1, b, b_start - 1) {
            a_start -= 1;
            b_start -= 1;
        }
        let (mut a_end, mut b_end) = (i + 1, j + 1);
        while a_end < a_hi && b_end < b_hi && a.lines_equal(a_end, b, b_end) {
            a_end += 1;
            b_end += 1;
        }

        best = Some((
            count,
            Anchor {
                a_start,
                a_end,
                b_start,
                b_end,
            },
        ));
    }
    best.map(|(_, anchor)| anchor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::EditKind;

    fn text(s: &str) -> RawText {
        RawText::new(s.as_bytes().to_vec())
    }

    fn run(a: &str, b: &str) -> Vec<Edit> {
        diff(&text(a), &text(b))
    }

    #[test]
    fn identical_is_empty() {
        assert!(run("x\ny\n", "x\ny\n").is_empty());
    }

    #[test]
    fn simple_replace() {
        let edits = run("a\nb\nc\n", "a\nB\nc\n");
        assert_eq!(edits, vec![Edit::new(1, 2, 1, 2)]);
    }

    #[test]
    fn anchors_on_unique_lines_between_noise() {
        // The braces repeat; "unique_fn" anchors the split.
        let a = "{\n}\nunique_fn\n{\n}\n";
        let b = "{\n}\nextra\nunique_fn\n{\n}\nmore\n";
        let edits = run(a, b);

        // Applying the script reconstructs b.
        let ta = text(a);
        let tb = text(b);
        let mut rebuilt = Vec::new();
        let mut at = 0;
        for edit in &edits {
            for line in at..edit.begin_a {
                rebuilt.extend_from_slice(ta.line(line));
            }
            for line in edit.begin_b..edit.end_b {
                rebuilt.extend_from_slice(tb.line(line));
            }
            at = edit.end_a;
        }
        for line in at..ta.line_count() {
            rebuilt.extend_from_slice(ta.line(line));
        }
        assert_eq!(rebuilt, tb.as_bytes());
    }

    #[test]
    fn pure_insert_and_delete_regions() {
        let edits = run("keep\n", "lead\nkeep\n");
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].kind(), EditKind::Insert);

        let edits = run("drop\nkeep\n", "keep\n");
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].kind(), EditKind::Delete);
    }
}
