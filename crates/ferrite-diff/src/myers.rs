//! Myers' O(ND) difference algorithm.
//!
//! The classic forward algorithm with a stored trace for backtracking,
//! after trimming the common prefix and suffix. Output is the span form:
//! maximal runs of non-equal lines.

use crate::edit::Edit;
use crate::text::RawText;

pub(crate) fn diff(a: &RawText, b: &RawText) -> Vec<Edit> {
    let n = a.line_count();
    let m = b.line_count();

    // Common prefix.
    let mut prefix = 0;
    while prefix < n && prefix < m && a.lines_equal(prefix, b, prefix) {
        prefix += 1;
    }
    // Common suffix (not overlapping the prefix).
    let mut suffix = 0;
    while suffix < n - prefix
        && suffix < m - prefix
        && a.lines_equal(n - 1 - suffix, b, m - 1 - suffix)
    {
        suffix += 1;
    }

    let inner_n = n - prefix - suffix;
    let inner_m = m - prefix - suffix;

    if inner_n == 0 && inner_m == 0 {
        return Vec::new();
    }
    if inner_n == 0 || inner_m == 0 {
        return vec![Edit::new(
            prefix,
            prefix + inner_n,
            prefix,
            prefix + inner_m,
        )];
    }

    let matches = shortest_path(a, b, prefix, inner_n, inner_m);
    matches_to_edits(&matches, prefix, inner_n, inner_m)
}

/// Per-diagonal furthest-reaching x values for each D, for backtracking.
fn shortest_path(
    a: &RawText,
    b: &RawText,
    offset: usize,
    n: usize,
    m: usize,
) -> Vec<(usize, usize)> {
    let max_d = n + m;
    let v_len = 2 * max_d + 1;
    let zero = max_d as isize;

    let mut v = vec![0usize; v_len];
    let mut trace: Vec<Vec<usize>> = Vec::new();

    'outer: for d in 0..=max_d as isize {
        for k in (-d..=d).step_by(2) {
            let take_down = k == -d
                || (k != d && v[(zero + k - 1) as usize] < v[(zero + k + 1) as usize]);
            let mut x = if take_down {
                v[(zero + k + 1) as usize]
            } else {
                v[(zero + k - 1) as usize] + 1
            };
            let mut y = (x as isize - k) as usize;

            while x < n && y < m && a.lines_equal(offset + x, b, offset + y) {
                x += 1;
                y += 1;
            }
            v[(zero + k) as usize] = x;

            if x >= n && y >= m {
                trace.push(v.clone());
                break 'outer;
            }
        }
        trace.push(v.clone());
    }

    // Backtrack from (n, m) to (0, 0), collecting the matched points.
    let mut moves: Vec<(usize, usize)> = Vec::new();
    let (mut x, mut y) = (n, m);
    for d in (0..trace.len()).rev() {
        let d_i = d as isize;
        let k = x as isize - y as isize;

        let take_down = k == -d_i
            || (k != d_i
                && d > 0
                && trace[d - 1][(zero + k - 1) as usize] < trace[d - 1][(zero + k + 1) as usize]);
        let prev_k = if d == 0 {
            k
        } else if take_down {
            k + 1
        } else {
            k - 1
        };
        let prev_x = if d == 0 {
            0
        } else {
            trace[d - 1][(zero + prev_k) as usize]
        };
        let prev_y = (prev_x as isize - prev_k) as usize;

        // Snake: equal lines.
        while x > prev_x && y > prev_y {
            x -= 1;
            y -= 1;
            moves.push((x, y));
        }
        if d > 0 {
            if take_down {
                y = y.saturating_sub(1);
            } else {
                x = x.saturating_sub(1);
            }
        }
    }
    moves.reverse();
    moves
}

/// Matched (x, y) points → span edits over the gaps between and after
/// them, shifted back into whole-text coordinates by `offset`.
fn matches_to_edits(
    matches: &[(usize, usize)],
    offset: usize,
    n: usize,
    m: usize,
) -> Vec<Edit> {
    let mut edits = Vec::new();
    let (mut last_a, mut last_b) = (0usize, 0usize);

    let mut push_gap =
        |edits: &mut Vec<Edit>, a_to: usize, b_to: usize, last_a: usize, last_b: usize| {
            if a_to > last_a || b_to > last_b {
                edits.push(Edit::new(
                    offset + last_a,
                    offset + a_to,
                    offset + last_b,
                    offset + b_to,
                ));
            }
        };

    for &(x, y) in matches {
        push_gap(&mut edits, x, y, last_a, last_b);
        last_a = x + 1;
        last_b = y + 1;
    }
    push_gap(&mut edits, n, m, last_a, last_b);
    edits
}
