//! Trim intervals — half-open spans of source time excised from the output.

use serde::{Deserialize, Serialize};

/// A half-open interval `[start_us, end_us)` of source time, in microseconds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start_us: u64,
    pub end_us: u64,
}

impl TimeInterval {
    pub fn new(start_us: u64, end_us: u64) -> Self {
        Self { start_us, end_us }
    }

    /// A well-formed interval is nonempty: `start < end`.
    pub fn is_valid(&self) -> bool {
        self.start_us < self.end_us
    }

    pub fn len_us(&self) -> u64 {
        self.end_us.saturating_sub(self.start_us)
    }

    /// Half-open containment: `start <= ts < end`.
    pub fn contains(&self, ts_us: u64) -> bool {
        ts_us >= self.start_us && ts_us < self.end_us
    }
}

/// An ordered set of trim intervals.
///
/// The raw set may hold intervals in any order, overlapping or abutting;
/// [`normalized`](Self::normalized) produces the canonical form: sorted by
/// `start_us`, with no two intervals overlapping or abutting within 1 µs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimSet {
    intervals: Vec<TimeInterval>,
}

impl TrimSet {
    pub fn new(intervals: Vec<TimeInterval>) -> Self {
        Self { intervals }
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeInterval> {
        self.intervals.iter()
    }

    /// First interval violating `start < end`, if any.
    pub fn first_invalid(&self) -> Option<TimeInterval> {
        self.intervals.iter().find(|iv| !iv.is_valid()).copied()
    }

    /// Canonical form: sorted by start, overlapping or abutting intervals
    /// (gap <= 1 µs) merged into one.
    pub fn normalized(&self) -> TrimSet {
        let mut sorted: Vec<TimeInterval> = self
            .intervals
            .iter()
            .filter(|iv| iv.is_valid())
            .copied()
            .collect();
        sorted.sort_by_key(|iv| iv.start_us);

        let mut merged: Vec<TimeInterval> = Vec::with_capacity(sorted.len());
        for iv in sorted {
            match merged.last_mut() {
                Some(last) if iv.start_us <= last.end_us.saturating_add(1) => {
                    last.end_us = last.end_us.max(iv.end_us);
                }
                _ => merged.push(iv),
            }
        }
        TrimSet { intervals: merged }
    }

    /// Total trimmed duration in microseconds.
    pub fn total_len_us(&self) -> u64 {
        self.intervals.iter().map(|iv| iv.len_us()).sum()
    }

    /// Whether `ts_us` falls inside any interval of the set.
    pub fn contains(&self, ts_us: u64) -> bool {
        self.intervals.iter().any(|iv| iv.contains(ts_us))
    }
}

impl From<Vec<TimeInterval>> for TrimSet {
    fn from(intervals: Vec<TimeInterval>) -> Self {
        Self::new(intervals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(start: u64, end: u64) -> TimeInterval {
        TimeInterval::new(start, end)
    }

    #[test]
    fn interval_validity() {
        assert!(iv(0, 1).is_valid());
        assert!(!iv(5, 5).is_valid());
        assert!(!iv(5, 4).is_valid());
    }

    #[test]
    fn interval_half_open_containment() {
        let t = iv(3_000_000, 5_000_000);
        assert!(t.contains(3_000_000));
        assert!(t.contains(4_999_999));
        assert!(!t.contains(5_000_000));
        assert!(!t.contains(2_999_999));
    }

    #[test]
    fn normalize_sorts() {
        let set = TrimSet::new(vec![iv(5_000_000, 6_000_000), iv(0, 1_000_000)]);
        let n = set.normalized();
        let starts: Vec<u64> = n.iter().map(|t| t.start_us).collect();
        assert_eq!(starts, vec![0, 5_000_000]);
    }

    #[test]
    fn normalize_merges_abutting() {
        // Two intervals sharing an endpoint collapse into one.
        let set = TrimSet::new(vec![iv(0, 1_000_000), iv(1_000_000, 2_000_000)]);
        let n = set.normalized();
        assert_eq!(n.len(), 1);
        assert_eq!(n.iter().next().unwrap(), &iv(0, 2_000_000));
    }

    #[test]
    fn normalize_merges_overlapping() {
        let set = TrimSet::new(vec![iv(0, 1_500_000), iv(1_000_000, 2_000_000)]);
        let n = set.normalized();
        assert_eq!(n.len(), 1);
        assert_eq!(n.total_len_us(), 2_000_000);
    }

    #[test]
    fn normalize_merges_one_microsecond_gap() {
        let set = TrimSet::new(vec![iv(0, 10), iv(11, 20)]);
        let n = set.normalized();
        assert_eq!(n.len(), 1);
        assert_eq!(n.iter().next().unwrap(), &iv(0, 20));
    }

    #[test]
    fn normalize_keeps_two_microsecond_gap() {
        let set = TrimSet::new(vec![iv(0, 10), iv(12, 20)]);
        assert_eq!(set.normalized().len(), 2);
    }

    #[test]
    fn normalize_contained_interval() {
        let set = TrimSet::new(vec![iv(0, 10_000_000), iv(2_000_000, 3_000_000)]);
        let n = set.normalized();
        assert_eq!(n.len(), 1);
        assert_eq!(n.total_len_us(), 10_000_000);
    }

    #[test]
    fn normalize_drops_degenerate() {
        let set = TrimSet::new(vec![iv(5, 5), iv(0, 10)]);
        let n = set.normalized();
        assert_eq!(n.len(), 1);
        assert_eq!(n.total_len_us(), 10);
    }

    #[test]
    fn first_invalid_reports() {
        let set = TrimSet::new(vec![iv(0, 10), iv(7, 7)]);
        assert_eq!(set.first_invalid(), Some(iv(7, 7)));
        assert_eq!(TrimSet::default().first_invalid(), None);
    }

    #[test]
    fn total_len_sums() {
        let set = TrimSet::new(vec![iv(0, 10), iv(20, 35)]);
        assert_eq!(set.total_len_us(), 25);
    }
}
