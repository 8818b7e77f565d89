use std::ops::{Index, IndexMut, Range};

/// One operation of an edit script. Offsets are 0-based line indices into the
/// original (`old_index`) and revised (`new_index`) sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    Equal {
        old_index: usize,
        new_index: usize,
        len: usize,
    },
    Delete {
        old_index: usize,
        old_len: usize,
        new_index: usize,
    },
    Insert {
        old_index: usize,
        new_index: usize,
        new_len: usize,
    },
    Replace {
        old_index: usize,
        old_len: usize,
        new_index: usize,
        new_len: usize,
    },
}

impl EditOp {
    pub fn old_range(&self) -> Range<usize> {
        match *self {
            EditOp::Equal { old_index, len, .. } => old_index..old_index + len,
            EditOp::Delete {
                old_index, old_len, ..
            }
            | EditOp::Replace {
                old_index, old_len, ..
            } => old_index..old_index + old_len,
            EditOp::Insert { old_index, .. } => old_index..old_index,
        }
    }

    pub fn new_range(&self) -> Range<usize> {
        match *self {
            EditOp::Equal { new_index, len, .. } => new_index..new_index + len,
            EditOp::Insert {
                new_index, new_len, ..
            }
            | EditOp::Replace {
                new_index, new_len, ..
            } => new_index..new_index + new_len,
            EditOp::Delete { new_index, .. } => new_index..new_index,
        }
    }

    pub fn is_equal(&self) -> bool {
        matches!(self, EditOp::Equal { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditScript {
    pub ops: Vec<EditOp>,
}

impl EditScript {
    /// True when the script contains no insert, delete or replace.
    pub fn is_unchanged(&self) -> bool {
        self.ops.iter().all(EditOp::is_equal)
    }

    /// Non-equal operations, in order.
    pub fn changes(&self) -> impl Iterator<Item = &EditOp> {
        self.ops.iter().filter(|op| !op.is_equal())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Move {
    Equal,
    Delete,
    Insert,
}

/// Upper bound on frontier cells kept for backtracking by the greedy search,
/// about 8 MiB. Roughly a thousand edits fit; beyond that the linear-space
/// search takes over.
const TRACE_CELL_LIMIT: usize = 1 << 20;

/// Compute the shortest edit script turning `original` into `revised`.
///
/// Myers' greedy O(ND) search over diagonals `k = x - y`. On each round `d` the
/// furthest-reaching path on diagonal `k` is extended from `k + 1` (an insertion)
/// only at the lower edge or when that path is strictly further; otherwise from
/// `k - 1` (a deletion). That keeps deletions ahead of insertions when both give
/// the same length, which is what unified diff tools print.
///
/// Backtracking needs every frontier, which grows with the square of the number
/// of edits. When that would pass [`TRACE_CELL_LIMIT`] the script comes from the
/// linear-space variant instead: still minimal, but ties may be broken
/// differently.
pub fn compute_diff<T: PartialEq>(original: &[T], revised: &[T]) -> EditScript {
    let moves = match shortest_edit(original, revised, TRACE_CELL_LIMIT) {
        Some(trace) => backtrack(original, revised, &trace),
        None => {
            tracing::debug!(
                original = original.len(),
                revised = revised.len(),
                "edit trace too large, using linear-space diff"
            );
            linear_moves(original, revised)
        }
    };
    collapse(&moves)
}

/// Forward pass. Returns, for each round `d`, the frontier `v` as it stood
/// before the round, restricted to diagonals `-d..=d`; or `None` once the
/// stored frontiers would exceed `cell_limit` cells.
fn shortest_edit<T: PartialEq>(a: &[T], b: &[T], cell_limit: usize) -> Option<Vec<Vec<usize>>> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max = n + m;
    let offset = max + 1;
    let mut v = vec![0usize; 2 * offset as usize + 1];
    let mut trace = Vec::new();
    let mut cells = 0usize;

    for d in 0..=max {
        let lo = (offset - d) as usize;
        let hi = (offset + d) as usize;
        cells += hi - lo + 1;
        if cells > cell_limit {
            return None;
        }
        trace.push(v[lo..=hi].to_vec());

        let mut k = -d;
        while k <= d {
            let idx = (offset + k) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = (x as isize - k) as usize;

            while (x as isize) < n && (y as isize) < m && a[x] == b[y] {
                x += 1;
                y += 1;
            }
            v[idx] = x;

            if x as isize >= n && y as isize >= m {
                return Some(trace);
            }
            k += 2;
        }
    }

    Some(trace)
}

/// Walk the trace from the end back to the origin, producing elementary moves in
/// forward order.
fn backtrack<T>(a: &[T], b: &[T], trace: &[Vec<usize>]) -> Vec<Move> {
    let mut x = a.len() as isize;
    let mut y = b.len() as isize;
    let mut moves = Vec::with_capacity(a.len() + b.len());

    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        // `v` covers diagonals -d..=d; index by `k + d`.
        let at = |k: isize| v[(k + d) as usize] as isize;
        let k = x - y;

        let prev_k = if k == -d || (k != d && at(k - 1) < at(k + 1)) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = if d == 0 { 0 } else { at(prev_k) };
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            moves.push(Move::Equal);
            x -= 1;
            y -= 1;
        }

        if d > 0 {
            moves.push(if x == prev_x { Move::Insert } else { Move::Delete });
        }

        x = prev_x;
        y = prev_y;
    }

    moves.reverse();
    moves
}

/// Linear-space Myers: common head and tail lines are peeled off, then the
/// middle snake of what remains splits the problem in two and each half is
/// solved the same way. Memory stays proportional to `a.len() + b.len()`.
fn linear_moves<T: PartialEq>(a: &[T], b: &[T]) -> Vec<Move> {
    let bound = (a.len() + b.len() + 1) / 2 + 1;
    let mut forward = Diagonals::new(bound);
    let mut backward = Diagonals::new(bound);
    let mut moves = Vec::with_capacity(a.len() + b.len());
    conquer(a, b, &mut forward, &mut backward, &mut moves);
    moves
}

/// Furthest x reached on each diagonal `k`, indexed by `k` in `-bound..=bound`.
struct Diagonals {
    cells: Vec<usize>,
    offset: isize,
}

impl Diagonals {
    fn new(bound: usize) -> Self {
        Self {
            cells: vec![0; 2 * bound + 1],
            offset: bound as isize,
        }
    }
}

impl Index<isize> for Diagonals {
    type Output = usize;

    fn index(&self, k: isize) -> &usize {
        &self.cells[(k + self.offset) as usize]
    }
}

impl IndexMut<isize> for Diagonals {
    fn index_mut(&mut self, k: isize) -> &mut usize {
        &mut self.cells[(k + self.offset) as usize]
    }
}

fn common_prefix<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn common_suffix<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    a.iter().rev().zip(b.iter().rev()).take_while(|(x, y)| x == y).count()
}

fn conquer<T: PartialEq>(
    a: &[T],
    b: &[T],
    forward: &mut Diagonals,
    backward: &mut Diagonals,
    moves: &mut Vec<Move>,
) {
    let head = common_prefix(a, b);
    moves.extend(std::iter::repeat(Move::Equal).take(head));
    let (a, b) = (&a[head..], &b[head..]);

    let tail = common_suffix(a, b);
    let (a, b) = (&a[..a.len() - tail], &b[..b.len() - tail]);

    if a.is_empty() || b.is_empty() {
        moves.extend(std::iter::repeat(Move::Delete).take(a.len()));
        moves.extend(std::iter::repeat(Move::Insert).take(b.len()));
    } else {
        let (n, m) = (a.len(), b.len());
        match middle_snake(a, b, forward, backward) {
            Some((x, y)) if x <= n && y <= m && (x, y) != (0, 0) && (x, y) != (n, m) => {
                conquer(&a[..x], &b[..y], forward, backward, moves);
                conquer(&a[x..], &b[y..], forward, backward, moves);
            }
            // No usable split point: emit a plain replacement.
            _ => {
                moves.extend(std::iter::repeat(Move::Delete).take(a.len()));
                moves.extend(std::iter::repeat(Move::Insert).take(b.len()));
            }
        }
    }

    moves.extend(std::iter::repeat(Move::Equal).take(tail));
}

/// Run the forward and backward searches towards each other until they meet and
/// return the point where the overlapping snake starts. `a` and `b` must both be
/// non-empty and differ in their first and last lines.
fn middle_snake<T: PartialEq>(
    a: &[T],
    b: &[T],
    forward: &mut Diagonals,
    backward: &mut Diagonals,
) -> Option<(usize, usize)> {
    let n = a.len();
    let m = b.len();
    let delta = n as isize - m as isize;
    let odd = delta & 1 == 1;
    forward[1] = 0;
    backward[1] = 0;

    let d_max = ((n + m + 1) / 2 + 1) as isize;
    for d in 0..d_max {
        let mut k = -d;
        while k <= d {
            let mut x = if k == -d || (k != d && forward[k - 1] < forward[k + 1]) {
                forward[k + 1]
            } else {
                forward[k - 1] + 1
            };
            let y = (x as isize - k) as usize;
            let (x0, y0) = (x, y);
            if x < n && y < m {
                x += common_prefix(&a[x..], &b[y..]);
            }
            forward[k] = x;

            if odd && (k - delta).abs() <= d - 1 && forward[k] + backward[-(k - delta)] >= n {
                return Some((x0, y0));
            }
            k += 2;
        }

        let mut k = -d;
        while k <= d {
            let mut x = if k == -d || (k != d && backward[k - 1] < backward[k + 1]) {
                backward[k + 1]
            } else {
                backward[k - 1] + 1
            };
            let mut y = (x as isize - k) as usize;
            if x < n && y < m {
                let run = common_suffix(&a[..n - x], &b[..m - y]);
                x += run;
                y += run;
            }
            backward[k] = x;

            if !odd && (k - delta).abs() <= d && backward[k] + forward[-(k - delta)] >= n {
                return Some((n - x, m - y));
            }
            k += 2;
        }
    }

    None
}

/// Group elementary moves into runs. Changes that sit between two equal runs
/// become a single delete, insert or replace.
fn collapse(moves: &[Move]) -> EditScript {
    let mut ops = Vec::new();
    let (mut old, mut new) = (0usize, 0usize);
    let mut i = 0;

    while i < moves.len() {
        if moves[i] == Move::Equal {
            let start = i;
            while i < moves.len() && moves[i] == Move::Equal {
                i += 1;
            }
            let len = i - start;
            ops.push(EditOp::Equal {
                old_index: old,
                new_index: new,
                len,
            });
            old += len;
            new += len;
            continue;
        }

        let (mut deleted, mut inserted) = (0usize, 0usize);
        while i < moves.len() && moves[i] != Move::Equal {
            match moves[i] {
                Move::Delete => deleted += 1,
                Move::Insert => inserted += 1,
                Move::Equal => unreachable!(),
            }
            i += 1;
        }

        let op = match (deleted, inserted) {
            (d, 0) => EditOp::Delete {
                old_index: old,
                old_len: d,
                new_index: new,
            },
            (0, n) => EditOp::Insert {
                old_index: old,
                new_index: new,
                new_len: n,
            },
            (d, n) => EditOp::Replace {
                old_index: old,
                old_len: d,
                new_index: new,
                new_len: n,
            },
        };
        ops.push(op);
        old += deleted;
        new += inserted;
    }

    EditScript { ops }
}
