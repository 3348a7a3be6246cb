// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Query-pattern LRU cache.
//!
//! Maps `(query text, k)` to the query's key array so repeated searches
//! skip extraction. Owned by one session; no locking.

#![allow(clippy::cast_precision_loss)] // Precision loss acceptable for hit rate calculation

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::Result;

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit rate (0.0 to 1.0).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

type PatternKey = (String, usize);

#[derive(Debug)]
struct Entry {
    keys: Vec<u64>,
    /// Stamp of this entry's live slot in the order queue.
    stamp: u64,
}

/// LRU cache of query key arrays.
///
/// Recency is an append-only queue of `(stamp, key)` slots. A touch appends
/// a fresh slot and leaves the old one stale; eviction pops from the front,
/// skipping stale slots. Stale slots are compacted once the queue grows past
/// twice the capacity, so touch and evict are amortized O(1).
#[derive(Debug)]
pub struct QueryPatternCache {
    capacity: usize,
    map: FxHashMap<PatternKey, Entry>,
    /// Order queue (front = LRU, back = MRU).
    order: VecDeque<(u64, PatternKey)>,
    next_stamp: u64,
    stats: CacheStats,
}

impl QueryPatternCache {
    /// Creates a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            map: FxHashMap::default(),
            order: VecDeque::with_capacity(capacity.min(1024)),
            next_stamp: 0,
            stats: CacheStats::default(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Returns the cached keys for `(query, k)`, computing them on a miss.
    ///
    /// A failed computation caches nothing.
    pub fn get_or_compute<F>(&mut self, query: &str, kmer_size: usize, compute: F) -> Result<&[u64]>
    where
        F: FnOnce() -> Result<Vec<u64>>,
    {
        let key = (query.to_owned(), kmer_size);
        let stamp = self.next_stamp;

        if let Some(entry) = self.map.get_mut(&key) {
            self.stats.hits += 1;
            entry.stamp = stamp;
        } else {
            self.stats.misses += 1;
            let keys = compute()?;
            while self.map.len() >= self.capacity && self.evict_lru() {}
            self.map.insert(key.clone(), Entry { keys, stamp });
        }
        self.next_stamp += 1;
        self.order.push_back((stamp, key.clone()));
        if self.order.len() > self.capacity.saturating_mul(2) {
            self.compact();
        }

        Ok(self.map.get(&key).map_or(&[][..], |entry| entry.keys.as_slice()))
    }

    /// Whether `(query, k)` is cached, without touching recency.
    pub fn contains(&self, query: &str, kmer_size: usize) -> bool {
        self.map.contains_key(&(query.to_owned(), kmer_size))
    }

    /// Clear all entries.
    pub fn clear(&mut self) {
        if !self.map.is_empty() {
            debug!(entries = self.map.len(), "query-pattern cache cleared");
        }
        self.map.clear();
        self.order.clear();
    }

    /// Changes the capacity; existing entries are dropped.
    pub fn reset(&mut self, capacity: usize) {
        self.clear();
        self.capacity = capacity.max(1);
    }

    /// Removes the least recently used entry; `false` if there was none.
    fn evict_lru(&mut self) -> bool {
        while let Some((stamp, key)) = self.order.pop_front() {
            if self.map.get(&key).is_some_and(|entry| entry.stamp == stamp) {
                self.map.remove(&key);
                self.stats.evictions += 1;
                return true;
            }
        }
        false
    }

    /// Drops stale slots from the order queue.
    fn compact(&mut self) {
        let map = &self.map;
        self.order
            .retain(|(stamp, key)| map.get(key).is_some_and(|entry| entry.stamp == *stamp));
    }
}
