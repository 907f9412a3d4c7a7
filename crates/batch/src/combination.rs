//! Combination selection across multiple source lists
//!
//! Picks index tuples (one index per source list) so that every item of every
//! list is used as evenly as possible, optionally ordering the result by a
//! priority of list positions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// One selected index per source list
pub type CombinationTuple = Vec<usize>;

/// Sort direction for a [`SortSpec`]
///
/// A single flag applies to every priority position; a list applies one flag
/// per priority entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortDirection {
    All(bool),
    PerPosition(Vec<bool>),
}

impl Default for SortDirection {
    fn default() -> Self {
        Self::All(true)
    }
}

/// Ordering applied to selected tuples
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    /// Source list positions, most significant first
    pub priority: Vec<usize>,
    /// Ascending flag(s)
    #[serde(default)]
    pub ascending: SortDirection,
}

impl SortSpec {
    pub fn new(priority: Vec<usize>, ascending: SortDirection) -> Self {
        Self { priority, ascending }
    }

    /// Whether the `nth` priority entry sorts ascending
    ///
    /// Entries beyond a per-position list default to ascending.
    fn ascending_at(&self, nth: usize) -> bool {
        match &self.ascending {
            SortDirection::All(asc) => *asc,
            SortDirection::PerPosition(flags) => flags.get(nth).copied().unwrap_or(true),
        }
    }

    fn compare(&self, a: &[usize], b: &[usize]) -> Ordering {
        for (nth, &pos) in self.priority.iter().enumerate() {
            let (Some(x), Some(y)) = (a.get(pos), b.get(pos)) else {
                continue;
            };
            let ord = if self.ascending_at(nth) {
                x.cmp(y)
            } else {
                y.cmp(x)
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Size of the full Cartesian product of lists with the given lengths
///
/// Saturates instead of overflowing. Returns 0 when `lengths` is empty.
pub fn max_combinations(lengths: &[usize]) -> usize {
    if lengths.is_empty() {
        return 0;
    }
    lengths
        .iter()
        .fold(1usize, |acc, &len| acc.saturating_mul(len))
}

/// Every index tuple over lists with the given lengths, in lexicographic order
///
/// The first list is the outermost loop, the last list the innermost. The
/// result is fully materialized; callers should check [`max_combinations`]
/// first.
pub fn cartesian_product(lengths: &[usize]) -> Vec<CombinationTuple> {
    if lengths.is_empty() || lengths.contains(&0) {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut current = vec![0usize; lengths.len()];
    loop {
        out.push(current.clone());

        // Odometer increment from the innermost position
        let mut pos = lengths.len();
        loop {
            if pos == 0 {
                return out;
            }
            pos -= 1;
            current[pos] += 1;
            if current[pos] < lengths[pos] {
                break;
            }
            current[pos] = 0;
        }
    }
}

/// Select `count` combinations from `sources`, spreading usage evenly
///
/// - Returns an empty list if `count` is 0, `sources` is empty, or any source
///   is empty.
/// - If `count` covers the whole Cartesian product, returns every tuple once
///   in lexicographic order.
/// - Otherwise greedily picks, `count` times, the unselected tuple whose items
///   have been used least so far (sum of per-position usage). Ties go to the
///   tuple that comes first in lexicographic order.
///
/// If `sort` is given, the result is stably sorted by it afterwards.
pub fn select_combinations<T>(
    sources: &[Vec<T>],
    count: usize,
    sort: Option<&SortSpec>,
) -> Vec<CombinationTuple> {
    let lengths: Vec<usize> = sources.iter().map(Vec::len).collect();
    select_by_lengths(&lengths, count, sort)
}

/// [`select_combinations`] over list lengths only
pub fn select_by_lengths(
    lengths: &[usize],
    count: usize,
    sort: Option<&SortSpec>,
) -> Vec<CombinationTuple> {
    if count == 0 || lengths.is_empty() || lengths.contains(&0) {
        return Vec::new();
    }

    let exact_total = lengths
        .iter()
        .try_fold(1usize, |acc, &len| acc.checked_mul(len));
    let mut selected = match exact_total {
        Some(total) if count >= total => cartesian_product(lengths),
        _ => select_evenly(lengths, count),
    };

    if let Some(spec) = sort {
        sort_combinations(&mut selected, spec);
    }
    selected
}

/// Per-position usage counters; indices never picked are absent
struct Usage {
    lengths: Vec<usize>,
    counts: Vec<HashMap<usize, usize>>,
}

impl Usage {
    fn new(lengths: &[usize]) -> Self {
        Self {
            lengths: lengths.to_vec(),
            counts: vec![HashMap::new(); lengths.len()],
        }
    }

    fn get(&self, pos: usize, idx: usize) -> usize {
        self.counts[pos].get(&idx).copied().unwrap_or(0)
    }

    fn min_at(&self, pos: usize) -> usize {
        if self.counts[pos].len() < self.lengths[pos] {
            0
        } else {
            self.counts[pos].values().copied().min().unwrap_or(0)
        }
    }

    fn max_at(&self, pos: usize) -> usize {
        self.counts[pos].values().copied().max().unwrap_or(0)
    }

    fn record(&mut self, tuple: &[usize]) {
        for (pos, &idx) in tuple.iter().enumerate() {
            *self.counts[pos].entry(idx).or_insert(0) += 1;
        }
    }
}

/// Greedy even-usage selection without enumerating the whole product
///
/// Each round looks for the lowest load score that still has an unselected
/// tuple, starting from the sum of per-position minimum usage, and takes the
/// lexicographically first such tuple. This is the same pick as scanning the
/// full product in order for the strictly smallest score.
fn select_evenly(lengths: &[usize], count: usize) -> Vec<CombinationTuple> {
    let mut usage = Usage::new(lengths);
    let mut taken: HashSet<CombinationTuple> = HashSet::new();
    let mut picked = Vec::with_capacity(count);

    for _ in 0..count {
        // min_rest[p] is the lowest score positions p.. can still add
        let mut min_rest = vec![0usize; lengths.len() + 1];
        for pos in (0..lengths.len()).rev() {
            min_rest[pos] = min_rest[pos + 1] + usage.min_at(pos);
        }
        let ceiling: usize = (0..lengths.len()).map(|pos| usage.max_at(pos)).sum();

        let mut found = None;
        for budget in min_rest[0]..=ceiling {
            let mut prefix = Vec::with_capacity(lengths.len());
            if first_within_budget(&usage, &min_rest, &taken, budget, 0, &mut prefix) {
                found = Some(prefix);
                break;
            }
        }

        let Some(tuple) = found else {
            break;
        };
        usage.record(&tuple);
        taken.insert(tuple.clone());
        picked.push(tuple);
    }

    picked
}

/// Extend `prefix` to the lexicographically first unselected tuple whose
/// score is at most `budget`
///
/// Every index never used at a position leads to an unselected subtree, so
/// each level scans past at most the indices already used there.
fn first_within_budget(
    usage: &Usage,
    min_rest: &[usize],
    taken: &HashSet<CombinationTuple>,
    budget: usize,
    spent: usize,
    prefix: &mut Vec<usize>,
) -> bool {
    let pos = prefix.len();
    if pos == usage.lengths.len() {
        return !taken.contains(prefix.as_slice());
    }
    if spent + usage.min_at(pos) + min_rest[pos + 1] > budget {
        return false;
    }

    for idx in 0..usage.lengths[pos] {
        let score = spent + usage.get(pos, idx);
        if score + min_rest[pos + 1] > budget {
            continue;
        }
        prefix.push(idx);
        if first_within_budget(usage, min_rest, taken, budget, score, prefix) {
            return true;
        }
        prefix.pop();
    }
    false
}

/// Stable sort of tuples by a [`SortSpec`]
///
/// An empty priority list leaves the order untouched.
pub fn sort_combinations(tuples: &mut [CombinationTuple], spec: &SortSpec) {
    if spec.priority.is_empty() {
        return;
    }
    tuples.sort_by(|a, b| spec.compare(a, b));
}
