// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Actual-min-score cache.
//!
//! The minimum shared-key count a row needs to match a query:
//!
//! ```text
//! base = max(min_score, ceil(min_shared_rate * len(query_keys)))
//! ```
//!
//! With high-frequency filtering on, the number of query keys whose k-mer
//! is high-frequency is subtracted from `base`, never going below 1.
//!
//! Results are cached by an `FxHasher` hash of the key array. Once full, the
//! cache stops admitting new entries until it is cleared.

use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHasher};
use tracing::debug;

use crate::error::Result;
use crate::pattern_cache::CacheStats;

/// Minimum score for a query of `query_len` keys.
///
/// `high_frequency` is the number of high-frequency query keys when
/// filtering is enabled, `None` otherwise.
///
/// ```rust
/// use simdkmer::min_score_cache::actual_min_score;
///
/// assert_eq!(actual_min_score(10, 1, 0.9, None), 9);
/// assert_eq!(actual_min_score(10, 1, 0.9, Some(3)), 6);
/// assert_eq!(actual_min_score(10, 1, 0.9, Some(20)), 1);
/// assert_eq!(actual_min_score(2, 5, 0.5, None), 5);
/// ```
pub fn actual_min_score(
    query_len: usize,
    min_score: usize,
    min_shared_rate: f64,
    high_frequency: Option<usize>,
) -> usize {
    let by_rate = (min_shared_rate * query_len as f64).ceil() as usize;
    let base = min_score.max(by_rate);
    match high_frequency {
        Some(count) => base.saturating_sub(count).max(1),
        None => base,
    }
}

/// Hash of a key array's contents.
pub fn hash_keys(keys: &[u64]) -> u64 {
    let mut hasher = FxHasher::default();
    keys.hash(&mut hasher);
    hasher.finish()
}

/// Capacity-bounded cache of minimum scores keyed by key-array hash.
#[derive(Debug)]
pub struct ActualMinScoreCache {
    capacity: usize,
    scores: FxHashMap<u64, usize>,
    stats: CacheStats,
}

impl ActualMinScoreCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            scores: FxHashMap::default(),
            stats: CacheStats::default(),
        }
    }

    /// Cached score for `keys`, computing it on a miss.
    ///
    /// A failed computation caches nothing.
    pub fn get_or_compute<F>(&mut self, keys: &[u64], compute: F) -> Result<usize>
    where
        F: FnOnce() -> Result<usize>,
    {
        let hash = hash_keys(keys);
        if let Some(&score) = self.scores.get(&hash) {
            self.stats.hits += 1;
            return Ok(score);
        }

        self.stats.misses += 1;
        let score = compute()?;
        if self.scores.len() < self.capacity {
            self.scores.insert(hash, score);
        } else {
            // Full: the score is returned but not admitted.
            self.stats.evictions += 1;
        }
        Ok(score)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn clear(&mut self) {
        if !self.scores.is_empty() {
            debug!(entries = self.scores.len(), "actual-min-score cache cleared");
        }
        self.scores.clear();
    }

    /// Changes the capacity; existing entries are dropped.
    pub fn reset(&mut self, capacity: usize) {
        self.clear();
        self.capacity = capacity.max(1);
    }
}
