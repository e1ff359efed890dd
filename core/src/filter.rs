//! Probabilistic membership filters
//!
//! Bloom filters with one-sided error: `contains` never returns a false
//! negative for an inserted key (until it is removed from a counting filter),
//! but may return a false positive. Filters do not count their items; the
//! owning role tracks `n` and passes it to the false-positive estimator.

use crate::hash::HashKind;
use serde::{Deserialize, Serialize};

/// Which filter variant a role uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// One bit per slot, no deletion
    Simple,
    /// One counter per slot, supports deletion
    Counting,
}

/// Asymptotic false-positive probability `(1 - e^(-k*n/m))^k`
pub fn false_positive_probability(hash_count: u32, size: usize, items: usize) -> f64 {
    let k = hash_count as f64;
    let m = size as f64;
    let n = items as f64;
    (1.0 - (-k * n / m).exp()).powf(k)
}

/// Bit vector bloom filter
#[derive(Debug, Clone)]
pub struct BloomFilter {
    hash: HashKind,
    size: usize,
    hash_count: u32,
    bits: Vec<u64>,
}

impl BloomFilter {
    pub fn new(hash: HashKind, size: usize, hash_count: u32) -> Self {
        Self {
            hash,
            size,
            hash_count,
            bits: vec![0; size.div_ceil(64)],
        }
    }

    pub fn insert(&mut self, key: &[u8]) {
        for idx in self.hash.indices(key, self.hash_count, self.size) {
            self.bits[idx / 64] |= 1 << (idx % 64);
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.hash
            .indices(key, self.hash_count, self.size)
            .into_iter()
            .all(|idx| self.bits[idx / 64] & (1 << (idx % 64)) != 0)
    }

    pub fn clear(&mut self) {
        self.bits.iter_mut().for_each(|w| *w = 0);
    }

    /// Number of slots currently set
    pub fn occupied(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// Counter vector bloom filter
#[derive(Debug, Clone)]
pub struct CountingFilter {
    hash: HashKind,
    size: usize,
    hash_count: u32,
    counters: Vec<u16>,
}

impl CountingFilter {
    pub fn new(hash: HashKind, size: usize, hash_count: u32) -> Self {
        Self {
            hash,
            size,
            hash_count,
            counters: vec![0; size],
        }
    }

    pub fn insert(&mut self, key: &[u8]) {
        for idx in self.hash.indices(key, self.hash_count, self.size) {
            self.counters[idx] = self.counters[idx].saturating_add(1);
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.hash
            .indices(key, self.hash_count, self.size)
            .into_iter()
            .all(|idx| self.counters[idx] > 0)
    }

    /// Decrement the key's counters. Removing a key that was never inserted
    /// desynchronizes the filter; callers check `contains` first.
    pub fn remove(&mut self, key: &[u8]) {
        for idx in self.hash.indices(key, self.hash_count, self.size) {
            // A saturated counter no longer knows how many keys share it
            if self.counters[idx] != u16::MAX {
                self.counters[idx] = self.counters[idx].saturating_sub(1);
            }
        }
    }

    pub fn clear(&mut self) {
        self.counters.iter_mut().for_each(|c| *c = 0);
    }

    pub fn occupied(&self) -> usize {
        self.counters.iter().filter(|c| **c > 0).count()
    }
}

/// A filter of either variant, chosen by configuration
#[derive(Debug, Clone)]
pub enum MembershipFilter {
    Simple(BloomFilter),
    Counting(CountingFilter),
}

impl MembershipFilter {
    pub fn new(kind: FilterKind, hash: HashKind, size: usize, hash_count: u32) -> Self {
        match kind {
            FilterKind::Simple => Self::Simple(BloomFilter::new(hash, size, hash_count)),
            FilterKind::Counting => Self::Counting(CountingFilter::new(hash, size, hash_count)),
        }
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            Self::Simple(_) => FilterKind::Simple,
            Self::Counting(_) => FilterKind::Counting,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Simple(f) => f.size,
            Self::Counting(f) => f.size,
        }
    }

    pub fn hash_count(&self) -> u32 {
        match self {
            Self::Simple(f) => f.hash_count,
            Self::Counting(f) => f.hash_count,
        }
    }

    pub fn supports_removal(&self) -> bool {
        matches!(self, Self::Counting(_))
    }

    pub fn insert(&mut self, key: impl AsRef<[u8]>) {
        match self {
            Self::Simple(f) => f.insert(key.as_ref()),
            Self::Counting(f) => f.insert(key.as_ref()),
        }
    }

    pub fn contains(&self, key: impl AsRef<[u8]>) -> bool {
        match self {
            Self::Simple(f) => f.contains(key.as_ref()),
            Self::Counting(f) => f.contains(key.as_ref()),
        }
    }

    /// Returns false without touching the filter on the simple variant
    pub fn remove(&mut self, key: impl AsRef<[u8]>) -> bool {
        match self {
            Self::Simple(_) => false,
            Self::Counting(f) => {
                f.remove(key.as_ref());
                true
            }
        }
    }

    pub fn clear(&mut self) {
        match self {
            Self::Simple(f) => f.clear(),
            Self::Counting(f) => f.clear(),
        }
    }

    pub fn occupied(&self) -> usize {
        match self {
            Self::Simple(f) => f.occupied(),
            Self::Counting(f) => f.occupied(),
        }
    }

    /// False-positive estimate given the `items` the caller has inserted
    pub fn estimated_false_positive_probability(&self, items: usize) -> f64 {
        false_positive_probability(self.hash_count(), self.size(), items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("peer-{}", i)).collect()
    }

    #[test]
    fn test_inserted_keys_always_contained() {
        for kind in [FilterKind::Simple, FilterKind::Counting] {
            for hash in [HashKind::Simple, HashKind::Double, HashKind::Triple] {
                let mut filter = MembershipFilter::new(kind, hash, 256, 4);
                for key in keys(50) {
                    filter.insert(&key);
                    assert!(filter.contains(&key));
                }
                // Earlier keys stay positive after the filter fills up
                assert!(keys(50).iter().all(|k| filter.contains(k)));
            }
        }
    }

    #[test]
    fn test_empty_filter_contains_nothing() {
        let filter = MembershipFilter::new(FilterKind::Simple, HashKind::Double, 64, 3);
        assert!(keys(20).iter().all(|k| !filter.contains(k)));
        assert_eq!(filter.occupied(), 0);
    }

    #[test]
    fn test_counting_removal() {
        let mut filter = MembershipFilter::new(FilterKind::Counting, HashKind::Double, 4096, 4);
        filter.insert("a");
        filter.insert("b");
        assert!(filter.remove("a"));
        assert!(!filter.contains("a"));
        assert!(filter.contains("b"));
    }

    #[test]
    fn test_simple_removal_is_noop() {
        let mut filter = MembershipFilter::new(FilterKind::Simple, HashKind::Double, 4096, 4);
        filter.insert("a");
        assert!(!filter.remove("a"));
        assert!(filter.contains("a"));
        assert!(!filter.supports_removal());
    }

    #[test]
    fn test_clear_resets_slots() {
        let mut filter = MembershipFilter::new(FilterKind::Counting, HashKind::Triple, 128, 3);
        for key in keys(10) {
            filter.insert(&key);
        }
        filter.clear();
        assert_eq!(filter.occupied(), 0);
        assert!(!filter.contains("peer-1"));
    }

    #[test]
    fn test_false_positive_estimate_monotonic() {
        let mut rng = rand::rng();
        for _ in 0..20 {
            let m = rng.random_range(1..10_000usize);
            let k = rng.random_range(1..16u32);
            let mut previous = 0.0;
            for n in 0..200 {
                let p = false_positive_probability(k, m, n);
                assert!(p >= previous);
                assert!((0.0..=1.0).contains(&p));
                previous = p;
            }
        }
    }

    #[test]
    fn test_false_positive_estimate_formula() {
        let p = false_positive_probability(3, 100, 10);
        let expected = (1.0 - (-0.3f64).exp()).powi(3);
        assert!((p - expected).abs() < 1e-12);
        assert_eq!(false_positive_probability(3, 100, 0), 0.0);
    }
}
