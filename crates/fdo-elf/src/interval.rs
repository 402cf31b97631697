//! Half-open address intervals with disjointness enforced on insert.

/// A 64-bit raw program-counter address (spec §3: "Raw address").
pub type Address = u64;

/// A half-open interval `[l, r)` carrying a value, per spec §3.
#[derive(Clone, Debug)]
pub struct Interval<V> {
    pub l: Address,
    pub r: Address,
    pub v: V,
}

impl<V> Interval<V> {
    pub fn contains(&self, addr: Address) -> bool {
        self.l <= addr && addr < self.r
    }
}

/// A collection of pairwise-disjoint intervals that, given an address,
/// yields the unique enclosing interval.
///
/// Backed by a sorted `Vec` rather than a tree: function symbol tables are
/// built once and queried many times, so an `O(log n)` binary search over a
/// flat, cache-friendly array beats a balanced tree in practice, and the
/// disjointness invariant is checked once at construction.
#[derive(Clone, Debug, Default)]
pub struct IntervalMap<V> {
    // Sorted by `l`.
    intervals: Vec<Interval<V>>,
}

impl<V> IntervalMap<V> {
    pub fn new() -> Self {
        Self {
            intervals: Vec::new(),
        }
    }

    /// Build from an unsorted list of intervals, failing if any overlap.
    ///
    /// `on_overlap` receives the two overlapping values for error reporting.
    pub fn build<E>(
        mut entries: Vec<Interval<V>>,
        mut on_overlap: impl FnMut(&V, &V) -> E,
    ) -> std::result::Result<Self, E> {
        entries.sort_by_key(|iv| iv.l);
        for pair in entries.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if a.r > b.l {
                return Err(on_overlap(&a.v, &b.v));
            }
        }
        Ok(Self { intervals: entries })
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Find the unique interval containing `addr`, if any.
    pub fn find(&self, addr: Address) -> Option<&Interval<V>> {
        match self.intervals.partition_point(|iv| iv.l <= addr) {
            0 => None,
            idx => {
                let candidate = &self.intervals[idx - 1];
                candidate.contains(addr).then_some(candidate)
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval<V>> {
        self.intervals.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(ivs: Vec<(Address, Address, &'static str)>) -> IntervalMap<&'static str> {
        let entries = ivs
            .into_iter()
            .map(|(l, r, v)| Interval { l, r, v })
            .collect();
        IntervalMap::build(entries, |a, b| format!("{a} overlaps {b}")).unwrap()
    }

    #[test]
    fn finds_enclosing_interval() {
        let map = build(vec![(0x1000, 0x1010, "f"), (0x2000, 0x2020, "g")]);
        assert_eq!(map.find(0x1005).map(|iv| iv.v), Some("f"));
        assert_eq!(map.find(0x2010).map(|iv| iv.v), Some("g"));
    }

    #[test]
    fn misses_outside_every_interval() {
        let map = build(vec![(0x1000, 0x1010, "f")]);
        assert!(map.find(0x1010).is_none()); // half-open: r is exclusive
        assert!(map.find(0xFFF).is_none());
        assert!(map.find(0).is_none());
    }

    #[test]
    fn rejects_overlap_at_construction() {
        let entries = vec![
            Interval {
                l: 0x1000,
                r: 0x1020,
                v: "f",
            },
            Interval {
                l: 0x1010,
                r: 0x1030,
                v: "g",
            },
        ];
        let err = IntervalMap::build(entries, |a, b| format!("{a}/{b}"));
        assert!(err.is_err());
    }
}
