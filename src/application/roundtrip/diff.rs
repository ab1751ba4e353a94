//! Line-oriented edit scripts.

use serde::Serialize;

/// One run of consecutive lines sharing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "lines", rename_all = "lowercase")]
pub enum DiffRun {
    Equal(Vec<String>),
    Insert(Vec<String>),
    Delete(Vec<String>),
}

impl DiffRun {
    pub fn lines(&self) -> &[String] {
        match self {
            DiffRun::Equal(lines) | DiffRun::Insert(lines) | DiffRun::Delete(lines) => lines,
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, DiffRun::Equal(_))
    }

    pub fn op(&self) -> &'static str {
        match self {
            DiffRun::Equal(_) => "equal",
            DiffRun::Insert(_) => "insert",
            DiffRun::Delete(_) => "delete",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Insert,
    Delete,
}

/// Shortest edit script of `old` against `new`, line by line.
///
/// Myers' algorithm in its linear-space form: each step finds the middle
/// snake of the remaining range and recurses on both sides of it.
pub fn line_diff(old: &str, new: &str) -> Vec<DiffRun> {
    let old: Vec<&str> = old.lines().collect();
    let new: Vec<&str> = new.lines().collect();

    let bound = (old.len() + new.len()).div_ceil(2) + 1;
    let mut frontiers = (Frontier::new(bound), Frontier::new(bound));
    let mut ops = Vec::with_capacity(old.len().max(new.len()));
    conquer(&old, &new, &mut frontiers, &mut ops);
    group(ops)
}

/// Furthest-reaching `x` per diagonal `k = x - y`, for `k` in `-bound..=bound`.
struct Frontier {
    bound: isize,
    xs: Vec<usize>,
}

impl Frontier {
    fn new(bound: usize) -> Self {
        Self {
            bound: bound as isize,
            xs: vec![0; 2 * bound + 2],
        }
    }

    fn get(&self, k: isize) -> usize {
        self.xs[(k + self.bound) as usize]
    }

    fn set(&mut self, k: isize, x: usize) {
        self.xs[(k + self.bound) as usize] = x;
    }
}

fn conquer<'a>(
    old: &[&'a str],
    new: &[&'a str],
    frontiers: &mut (Frontier, Frontier),
    ops: &mut Vec<(Op, &'a str)>,
) {
    let prefix = common_prefix(old, new);
    ops.extend(old[..prefix].iter().map(|line| (Op::Equal, *line)));
    let (old, new) = (&old[prefix..], &new[prefix..]);

    let suffix = common_suffix(old, new);
    let (body_old, body_new) = (&old[..old.len() - suffix], &new[..new.len() - suffix]);

    if body_old.is_empty() {
        ops.extend(body_new.iter().map(|line| (Op::Insert, *line)));
    } else if body_new.is_empty() {
        ops.extend(body_old.iter().map(|line| (Op::Delete, *line)));
    } else {
        match middle_snake(body_old, body_new, frontiers) {
            Some((x, y))
                if x <= body_old.len()
                    && y <= body_new.len()
                    && (x, y) != (0, 0)
                    && (x, y) != (body_old.len(), body_new.len()) =>
            {
                conquer(&body_old[..x], &body_new[..y], frontiers, ops);
                conquer(&body_old[x..], &body_new[y..], frontiers, ops);
            }
            _ => {
                ops.extend(body_old.iter().map(|line| (Op::Delete, *line)));
                ops.extend(body_new.iter().map(|line| (Op::Insert, *line)));
            }
        }
    }

    ops.extend(old[old.len() - suffix..].iter().map(|line| (Op::Equal, *line)));
}

/// Split point of an optimal path through `old` × `new`. Both ranges are
/// non-empty and share no prefix or suffix.
fn middle_snake(
    old: &[&str],
    new: &[&str],
    (forward, backward): &mut (Frontier, Frontier),
) -> Option<(usize, usize)> {
    let (n, m) = (old.len(), new.len());
    let delta = n as isize - m as isize;
    let odd = delta & 1 == 1;
    forward.set(1, 0);
    backward.set(1, 0);

    let d_max = (n + m).div_ceil(2) as isize;
    for d in 0..=d_max {
        for k in (-d..=d).rev().step_by(2) {
            let mut x = if k == -d || (k != d && forward.get(k - 1) < forward.get(k + 1)) {
                forward.get(k + 1)
            } else {
                forward.get(k - 1) + 1
            };
            let y = (x as isize - k) as usize;
            let start = (x, y);
            if x < n && y < m {
                x += common_prefix(&old[x..], &new[y..]);
            }
            forward.set(k, x);
            if odd && (k - delta).abs() < d && x + backward.get(delta - k) >= n {
                return Some(start);
            }
        }

        for k in (-d..=d).rev().step_by(2) {
            let mut x = if k == -d || (k != d && backward.get(k - 1) < backward.get(k + 1)) {
                backward.get(k + 1)
            } else {
                backward.get(k - 1) + 1
            };
            let mut y = (x as isize - k) as usize;
            if x < n && y < m {
                let run = common_suffix(&old[..n - x], &new[..m - y]);
                x += run;
                y += run;
            }
            backward.set(k, x);
            if !odd && (k - delta).abs() <= d && x + forward.get(delta - k) >= n {
                return n.checked_sub(x).zip(m.checked_sub(y));
            }
        }
    }
    None
}

fn common_prefix(old: &[&str], new: &[&str]) -> usize {
    old.iter().zip(new).take_while(|(a, b)| a == b).count()
}

fn common_suffix(old: &[&str], new: &[&str]) -> usize {
    old.iter()
        .rev()
        .zip(new.iter().rev())
        .take_while(|(a, b)| a == b)
        .count()
}

/// Collapse ops into runs. Within a changed region deletions come first.
fn group(ops: Vec<(Op, &str)>) -> Vec<DiffRun> {
    let mut runs = Vec::new();
    let mut equal = Vec::new();
    let mut deleted = Vec::new();
    let mut inserted = Vec::new();
    for (op, line) in ops {
        match op {
            Op::Equal => {
                flush_changes(&mut runs, &mut deleted, &mut inserted);
                equal.push(line.to_string());
            }
            Op::Delete => {
                flush_equal(&mut runs, &mut equal);
                deleted.push(line.to_string());
            }
            Op::Insert => {
                flush_equal(&mut runs, &mut equal);
                inserted.push(line.to_string());
            }
        }
    }
    flush_equal(&mut runs, &mut equal);
    flush_changes(&mut runs, &mut deleted, &mut inserted);
    runs
}

fn flush_equal(runs: &mut Vec<DiffRun>, equal: &mut Vec<String>) {
    if !equal.is_empty() {
        runs.push(DiffRun::Equal(std::mem::take(equal)));
    }
}

fn flush_changes(runs: &mut Vec<DiffRun>, deleted: &mut Vec<String>, inserted: &mut Vec<String>) {
    if !deleted.is_empty() {
        runs.push(DiffRun::Delete(std::mem::take(deleted)));
    }
    if !inserted.is_empty() {
        runs.push(DiffRun::Insert(std::mem::take(inserted)));
    }
}
