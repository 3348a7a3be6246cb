// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Per-pass occurrence counting.
//!
//! [`OccurrenceTracker`] keeps `(k-mer, count)` entries in a vector sorted by
//! k-mer value. Lookups binary-search; new k-mers are inserted in place.
//! The vector never grows past the capacity it was created with, which bounds
//! memory per extraction pass to a small multiple of the sequence length.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OccurrenceEntry {
    kmer: u64,
    count: u64,
}

/// Sorted-vector occurrence counter with a fixed capacity.
#[derive(Debug)]
pub struct OccurrenceTracker {
    entries: Vec<OccurrenceEntry>,
    capacity: usize,
}

impl OccurrenceTracker {
    /// Creates an empty tracker holding at most `capacity` distinct k-mers.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Increments the count for `kmer` and returns the new 1-based count.
    ///
    /// # Errors
    ///
    /// [`Error::CapacityExceeded`] when `kmer` is new and the tracker is full.
    /// Existing k-mers keep counting after the tracker fills up.
    pub fn find_or_increment(&mut self, kmer: u64) -> Result<u64> {
        match self.entries.binary_search_by_key(&kmer, |entry| entry.kmer) {
            Ok(index) => {
                let entry = &mut self.entries[index];
                entry.count += 1;
                Ok(entry.count)
            }
            Err(index) => {
                if self.entries.len() >= self.capacity {
                    return Err(Error::CapacityExceeded {
                        capacity: self.capacity,
                    });
                }
                self.entries.insert(index, OccurrenceEntry { kmer, count: 1 });
                Ok(1)
            }
        }
    }

    /// Current count for `kmer` (0 if never seen).
    pub fn count(&self, kmer: u64) -> u64 {
        self.entries
            .binary_search_by_key(&kmer, |entry| entry.kmer)
            .map_or(0, |index| self.entries[index].count)
    }

    /// Number of distinct k-mers tracked.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forgets all entries, keeping the allocation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_counts_increment() {
        let mut tracker = OccurrenceTracker::with_capacity(8);
        assert_eq!(tracker.find_or_increment(42).unwrap(), 1);
        assert_eq!(tracker.find_or_increment(7).unwrap(), 1);
        assert_eq!(tracker.find_or_increment(42).unwrap(), 2);
        assert_eq!(tracker.find_or_increment(42).unwrap(), 3);
        assert_eq!(tracker.count(42), 3);
        assert_eq!(tracker.count(7), 1);
        assert_eq!(tracker.count(99), 0);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_entries_stay_sorted() {
        let mut tracker = OccurrenceTracker::with_capacity(16);
        for kmer in [9, 3, 12, 1, 3, 7, 12, 0] {
            tracker.find_or_increment(kmer).unwrap();
        }
        let kmers: Vec<u64> = tracker.entries.iter().map(|e| e.kmer).collect();
        assert_eq!(kmers, vec![0, 1, 3, 7, 9, 12]);
    }

    #[test]
    fn test_capacity_exceeded_only_for_new_kmers() {
        let mut tracker = OccurrenceTracker::with_capacity(2);
        tracker.find_or_increment(1).unwrap();
        tracker.find_or_increment(2).unwrap();

        let err = tracker.find_or_increment(3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert!(matches!(err, Error::CapacityExceeded { capacity: 2 }));

        assert_eq!(tracker.find_or_increment(1).unwrap(), 2);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_zero_capacity() {
        let mut tracker = OccurrenceTracker::with_capacity(0);
        assert!(tracker.find_or_increment(0).is_err());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_clear_resets_counts() {
        let mut tracker = OccurrenceTracker::with_capacity(4);
        tracker.find_or_increment(5).unwrap();
        tracker.clear();
        assert_eq!(tracker.find_or_increment(5).unwrap(), 1);
        assert_eq!(tracker.capacity(), 4);
    }
}
