//! One-to-one pairing of two source lists
//!
//! Used for stitching: each item of the longer list is paired exactly once,
//! the shorter list is repeated cyclically.

use serde::{Deserialize, Serialize};

/// A pair of items with its position in the longer-list traversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair<A, B> {
    pub a: A,
    pub b: B,
    /// 0-based position, used for output naming and progress correlation
    pub index: usize,
}

/// Pair `list_a` with `list_b`, walking the longer list once
///
/// Returns an empty list if either input is empty. When both lists have the
/// same length the result is a plain zip.
pub fn build_pairs<A: Clone, B: Clone>(list_a: &[A], list_b: &[B]) -> Vec<Pair<A, B>> {
    let n = list_a.len();
    let m = list_b.len();
    if n == 0 || m == 0 {
        return Vec::new();
    }

    let len = n.max(m);
    (0..len)
        .map(|i| Pair {
            a: list_a[i % n].clone(),
            b: list_b[i % m].clone(),
            index: i,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn as_tuples<'a>(pairs: &[Pair<&'a str, &'a str>]) -> Vec<(&'a str, &'a str, usize)> {
        pairs.iter().map(|p| (p.a, p.b, p.index)).collect()
    }

    #[test]
    fn test_shorter_a_cycles() {
        let pairs = build_pairs(&["a1", "a2"], &["b1", "b2", "b3", "b4", "b5"]);
        assert_eq!(
            as_tuples(&pairs),
            vec![
                ("a1", "b1", 0),
                ("a2", "b2", 1),
                ("a1", "b3", 2),
                ("a2", "b4", 3),
                ("a1", "b5", 4),
            ]
        );
    }

    #[test]
    fn test_shorter_b_cycles() {
        let pairs = build_pairs(&["a1", "a2", "a3"], &["b1"]);
        assert_eq!(
            as_tuples(&pairs),
            vec![("a1", "b1", 0), ("a2", "b1", 1), ("a3", "b1", 2)]
        );
    }

    #[test]
    fn test_empty_side_yields_nothing() {
        let empty: [&str; 0] = [];
        assert!(build_pairs(&empty, &["b1"]).is_empty());
        assert!(build_pairs(&["a1"], &empty).is_empty());
    }

    // Property: output length is max(n, m), the longer list appears exactly
    // once in order, and every item of the shorter list appears at least
    // floor(max / min) times.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_pairing_coverage(n in 1usize..20, m in 1usize..20) {
            let a: Vec<usize> = (0..n).collect();
            let b: Vec<usize> = (0..m).collect();
            let pairs = build_pairs(&a, &b);

            let longest = n.max(m);
            let shortest = n.min(m);
            prop_assert_eq!(pairs.len(), longest);

            for (i, pair) in pairs.iter().enumerate() {
                prop_assert_eq!(pair.index, i);
            }

            let (long_side, short_side): (Vec<usize>, Vec<usize>) = if m >= n {
                (pairs.iter().map(|p| p.b).collect(), pairs.iter().map(|p| p.a).collect())
            } else {
                (pairs.iter().map(|p| p.a).collect(), pairs.iter().map(|p| p.b).collect())
            };

            prop_assert_eq!(long_side, (0..longest).collect::<Vec<_>>());

            let mut counts = vec![0usize; shortest];
            for item in short_side {
                counts[item] += 1;
            }
            let floor = longest / shortest;
            for count in counts {
                prop_assert!(count >= floor);
            }
        }
    }
}
