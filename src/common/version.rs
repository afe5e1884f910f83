//! Version vectors
//!
//! A version vector maps a node identifier to a monotonically increasing
//! counter. Missing entries read as zero. Vectors form a join-semilattice
//! under [`VersionVector::merge`] (pointwise max).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector {
    counters: BTreeMap<String, u64>,
}

impl VersionVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for `node`, zero when absent
    pub fn get(&self, node: &str) -> u64 {
        self.counters.get(node).copied().unwrap_or(0)
    }

    /// Bump the counter for `node` and return the new value
    pub fn increment(&mut self, node: &str) -> u64 {
        let counter = self.counters.entry(node.to_string()).or_insert(0);
        *counter = counter.saturating_add(1);
        *counter
    }

    /// Set a counter explicitly (used by senders that track their own clock)
    pub fn set(&mut self, node: impl Into<String>, value: u64) {
        self.counters.insert(node.into(), value);
    }

    /// Pointwise max, in place
    pub fn merge(&mut self, other: &VersionVector) {
        for (node, &value) in &other.counters {
            let current = self.counters.entry(node.clone()).or_insert(0);
            if value > *current {
                *current = value;
            }
        }
    }

    /// Pointwise max, returning a new vector
    pub fn merged(&self, other: &VersionVector) -> VersionVector {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    /// Every component of `self` is >= the matching component of `other`.
    pub fn dominates(&self, other: &VersionVector) -> bool {
        other
            .counters
            .iter()
            .all(|(node, &value)| self.get(node) >= value)
    }

    /// Neither vector dominates the other.
    pub fn concurrent_with(&self, other: &VersionVector) -> bool {
        !self.dominates(other) && !other.dominates(self)
    }

    /// Largest counter in the vector (its Lamport-style time)
    pub fn max_counter(&self) -> u64 {
        self.counters.values().copied().max().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.counters.iter()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl fmt::Display for VersionVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (node, value)) in self.counters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", node, value)?;
        }
        write!(f, "}}")
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for VersionVector {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        Self {
            counters: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vv(entries: &[(&str, u64)]) -> VersionVector {
        entries.iter().map(|(k, v)| (*k, *v)).collect()
    }

    fn arb_vector() -> impl Strategy<Value = VersionVector> {
        proptest::collection::btree_map(0u8..4, 0u64..6, 0..4)
            .prop_map(|m| m.into_iter().map(|(k, v)| (format!("n{}", k), v)).collect())
    }

    #[test]
    fn test_increment_and_get() {
        let mut v = VersionVector::new();
        assert_eq!(v.get("a"), 0);
        assert_eq!(v.increment("a"), 1);
        assert_eq!(v.increment("a"), 2);
        assert_eq!(v.get("a"), 2);
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn test_merge_is_pointwise_max() {
        let mut a = vv(&[("x", 3), ("y", 1)]);
        let b = vv(&[("y", 4), ("z", 2)]);
        a.merge(&b);
        assert_eq!(a, vv(&[("x", 3), ("y", 4), ("z", 2)]));
    }

    #[test]
    fn test_dominance() {
        let a = vv(&[("x", 2), ("y", 2)]);
        let b = vv(&[("x", 1)]);
        let c = vv(&[("y", 3)]);
        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));
        assert!(a.concurrent_with(&c));
        assert!(VersionVector::new().dominates(&VersionVector::new()));
        assert!(!a.concurrent_with(&a));
    }

    #[test]
    fn test_display() {
        assert_eq!(vv(&[("b", 2), ("a", 1)]).to_string(), "{a: 1, b: 2}");
    }

    proptest! {
        #[test]
        fn prop_merge_commutative(a in arb_vector(), b in arb_vector()) {
            prop_assert_eq!(a.merged(&b), b.merged(&a));
        }

        #[test]
        fn prop_merge_associative(a in arb_vector(), b in arb_vector(), c in arb_vector()) {
            prop_assert_eq!(a.merged(&b).merged(&c), a.merged(&b.merged(&c)));
        }

        #[test]
        fn prop_merge_idempotent(a in arb_vector()) {
            prop_assert_eq!(a.merged(&a), a);
        }

        #[test]
        fn prop_merge_dominates_inputs(a in arb_vector(), b in arb_vector()) {
            let m = a.merged(&b);
            prop_assert!(m.dominates(&a));
            prop_assert!(m.dominates(&b));
        }

        #[test]
        fn prop_dominance_trichotomy(a in arb_vector(), b in arb_vector()) {
            let a_dom = a.dominates(&b);
            let b_dom = b.dominates(&a);
            let concurrent = a.concurrent_with(&b);
            if a_dom && b_dom {
                // Mutual dominance only when the vectors agree on every key
                prop_assert!(!concurrent);
                for node in a.iter().chain(b.iter()).map(|(k, _)| k) {
                    prop_assert_eq!(a.get(node), b.get(node));
                }
            } else {
                let held = [a_dom, b_dom, concurrent].iter().filter(|x| **x).count();
                prop_assert_eq!(held, 1);
            }
        }
    }
}
