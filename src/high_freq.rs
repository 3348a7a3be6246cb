// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! # High-Frequency K-mer Cache
//!
//! K-mers that appear in too many rows carry little signal. Their raw
//! values (occurrence bits stripped) are computed by [`crate::analysis`],
//! persisted in a [`MetadataStore`], and loaded back into hash sets for
//! fast membership tests.
//!
//! ## Cache key tuple
//!
//! A loaded set is valid only for the exact [`HighFreqCacheKey`] it was
//! built for: table, column, k-mer size, occurrence bits and both
//! appearance thresholds. Every lookup re-checks the tuple against the
//! caller's, so a stale set is never consulted.
//!
//! ## Tiers
//!
//! - [`HighFreqCache`]: process-local, `Empty → Loading → Valid`
//! - [`SharedHighFreqSegment`]: built once, published as an immutable
//!   snapshot, read by any number of attached [`SharedHighFreqHandle`]s
//! - the [`MetadataStore`] itself, the slow path
//!
//! [`crate::session::SearchSession`] consults them in that order.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use rustc_hash::FxHashSet;
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::key::KeyLayout;

/// Tolerance for comparing appearance rates.
const RATE_EPSILON: f64 = 1e-9;

// ============================================================================
// Cache Key Tuple
// ============================================================================

/// Identity of one high-frequency analysis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighFreqCacheKey {
    pub table: u32,
    pub column: u16,
    pub kmer_size: usize,
    pub occurrence_bits: u32,
    pub max_appearance_rate: f64,
    pub max_appearance_nrow: u64,
}

impl HighFreqCacheKey {
    /// Tuple for `table`/`column` under `config`.
    pub fn from_config(table: u32, column: u16, config: &SearchConfig) -> Self {
        Self {
            table,
            column,
            kmer_size: config.kmer_size,
            occurrence_bits: config.occurrence_bits,
            max_appearance_rate: config.max_appearance_rate,
            max_appearance_nrow: config.max_appearance_nrow,
        }
    }

    /// Field-by-field match; the rate is compared with a small tolerance.
    pub fn matches(&self, other: &HighFreqCacheKey) -> bool {
        self.table == other.table
            && self.column == other.column
            && self.kmer_size == other.kmer_size
            && self.occurrence_bits == other.occurrence_bits
            && (self.max_appearance_rate - other.max_appearance_rate).abs() < RATE_EPSILON
            && self.max_appearance_nrow == other.max_appearance_nrow
    }
}

impl fmt::Display for HighFreqCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "table={} column={} k={} occ={} rate={} nrow={}",
            self.table,
            self.column,
            self.kmer_size,
            self.occurrence_bits,
            self.max_appearance_rate,
            self.max_appearance_nrow
        )
    }
}

// ============================================================================
// Metadata Store
// ============================================================================

/// Persistent source of truth for high-frequency k-mer sets.
pub trait MetadataStore {
    /// Number of k-mers stored for `key`, or `None` if no analysis matches it.
    fn get_count(&self, key: &HighFreqCacheKey) -> Result<Option<usize>>;

    /// Streams the k-mers stored for `key`.
    fn get_highfreq_keys<'a>(
        &'a self,
        key: &HighFreqCacheKey,
    ) -> Result<Box<dyn Iterator<Item = u64> + 'a>>;

    /// Replaces the k-mers stored for `key`.
    fn put_highfreq_keys(
        &mut self,
        key: &HighFreqCacheKey,
        kmers: &mut dyn Iterator<Item = u64>,
    ) -> Result<()>;

    /// Direct membership query used when no cache is valid.
    fn contains_highfreq_key(&self, key: &HighFreqCacheKey, kmer: u64) -> Result<bool> {
        Ok(self.get_highfreq_keys(key)?.any(|stored| stored == kmer))
    }
}

/// [`MetadataStore`] kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    analyses: Vec<(HighFreqCacheKey, Vec<u64>)>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, key: &HighFreqCacheKey) -> Option<&Vec<u64>> {
        self.analyses
            .iter()
            .find(|(stored, _)| stored.matches(key))
            .map(|(_, kmers)| kmers)
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn get_count(&self, key: &HighFreqCacheKey) -> Result<Option<usize>> {
        Ok(self.find(key).map(Vec::len))
    }

    fn get_highfreq_keys<'a>(
        &'a self,
        key: &HighFreqCacheKey,
    ) -> Result<Box<dyn Iterator<Item = u64> + 'a>> {
        let kmers = self
            .find(key)
            .ok_or_else(|| Error::Store(format!("no high-frequency analysis for {key}")))?;
        Ok(Box::new(kmers.iter().copied()))
    }

    fn put_highfreq_keys(
        &mut self,
        key: &HighFreqCacheKey,
        kmers: &mut dyn Iterator<Item = u64>,
    ) -> Result<()> {
        let kmers: Vec<u64> = kmers.collect();
        match self.analyses.iter_mut().find(|(stored, _)| stored.matches(key)) {
            Some((_, existing)) => *existing = kmers,
            None => self.analyses.push((*key, kmers)),
        }
        Ok(())
    }
}

// ============================================================================
// Snapshot (shared by both tiers)
// ============================================================================

/// A fully built, immutable high-frequency set.
#[derive(Debug)]
pub struct HighFreqSnapshot {
    key: HighFreqCacheKey,
    kmers: FxHashSet<u64>,
}

impl HighFreqSnapshot {
    /// Builds a set sized for `expected` k-mers, inserting `batch_size` at a time.
    ///
    /// # Errors
    ///
    /// [`Error::CacheBuildFailure`] if the set cannot be allocated.
    pub fn build(
        key: HighFreqCacheKey,
        kmers: impl IntoIterator<Item = u64>,
        expected: usize,
        batch_size: usize,
    ) -> Result<Self> {
        let mut set = FxHashSet::default();
        set.try_reserve(expected)
            .map_err(|e| Error::CacheBuildFailure(format!("reserving {expected} entries: {e}")))?;

        let batch_size = batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size.min(expected.max(1)));
        for kmer in kmers {
            batch.push(kmer);
            if batch.len() == batch_size {
                insert_batch(&mut set, &mut batch)?;
            }
        }
        insert_batch(&mut set, &mut batch)?;

        Ok(Self { key, kmers: set })
    }

    #[inline]
    pub fn key(&self) -> &HighFreqCacheKey {
        &self.key
    }

    #[inline]
    pub fn contains(&self, kmer: u64) -> bool {
        self.kmers.contains(&kmer)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.kmers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.kmers.is_empty()
    }
}

fn insert_batch(set: &mut FxHashSet<u64>, batch: &mut Vec<u64>) -> Result<()> {
    set.try_reserve(batch.len())
        .map_err(|e| Error::CacheBuildFailure(format!("growing set by {}: {e}", batch.len())))?;
    set.extend(batch.drain(..));
    Ok(())
}

// ============================================================================
// Process-local Cache
// ============================================================================

/// Load state of a [`HighFreqCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Loading,
    Valid,
}

/// Process-local high-frequency set.
#[derive(Debug)]
pub struct HighFreqCache {
    state: CacheState,
    snapshot: Option<HighFreqSnapshot>,
}

impl Default for HighFreqCache {
    fn default() -> Self {
        Self::new()
    }
}

impl HighFreqCache {
    pub fn new() -> Self {
        Self {
            state: CacheState::Empty,
            snapshot: None,
        }
    }

    #[inline]
    pub fn state(&self) -> CacheState {
        self.state
    }

    /// Tuple of the loaded set, if any.
    pub fn key(&self) -> Option<&HighFreqCacheKey> {
        self.snapshot.as_ref().map(HighFreqSnapshot::key)
    }

    /// `Valid` and built for a tuple matching `key`.
    pub fn is_valid_for(&self, key: &HighFreqCacheKey) -> bool {
        self.state == CacheState::Valid && self.key().is_some_and(|loaded| loaded.matches(key))
    }

    /// Number of k-mers in the loaded set.
    pub fn len(&self) -> usize {
        self.snapshot.as_ref().map_or(0, HighFreqSnapshot::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the cache contents with `kmers`.
    ///
    /// # Errors
    ///
    /// [`Error::CacheBuildFailure`]; the cache is left `Empty`.
    pub fn load(
        &mut self,
        key: HighFreqCacheKey,
        kmers: impl IntoIterator<Item = u64>,
        expected: usize,
        batch_size: usize,
    ) -> Result<()> {
        self.clear();
        self.state = CacheState::Loading;
        debug!(%key, expected, "loading high-frequency cache");

        match HighFreqSnapshot::build(key, kmers, expected, batch_size) {
            Ok(snapshot) => {
                info!(%key, kmers = snapshot.len(), "high-frequency cache loaded");
                self.snapshot = Some(snapshot);
                self.state = CacheState::Valid;
                Ok(())
            }
            Err(err) => {
                self.clear();
                Err(err)
            }
        }
    }

    /// Loads the set stored for `key`.
    ///
    /// # Errors
    ///
    /// - [`Error::ConfigMismatch`] if the store has no analysis for `key`
    /// - [`Error::CacheBuildFailure`] if reading or building fails
    pub fn load_from_store<S: MetadataStore + ?Sized>(
        &mut self,
        store: &S,
        key: HighFreqCacheKey,
        batch_size: usize,
    ) -> Result<()> {
        self.clear();
        let expected = store
            .get_count(&key)?
            .ok_or_else(|| Error::ConfigMismatch(format!("no stored analysis for {key}")))?;
        let kmers = store
            .get_highfreq_keys(&key)
            .map_err(|e| Error::CacheBuildFailure(e.to_string()))?;
        self.load(key, kmers, expected, batch_size)
    }

    /// Drops the set and returns to `Empty`.
    pub fn clear(&mut self) {
        if self.state != CacheState::Empty {
            debug!("high-frequency cache cleared");
        }
        self.snapshot = None;
        self.state = CacheState::Empty;
    }

    /// Membership test; `false` unless `Valid`.
    #[inline]
    pub fn is_high_frequency(&self, kmer: u64) -> bool {
        match (&self.state, &self.snapshot) {
            (CacheState::Valid, Some(snapshot)) => snapshot.contains(kmer),
            _ => false,
        }
    }

    /// Membership test against a required tuple; `None` if not valid for it.
    pub fn lookup(&self, key: &HighFreqCacheKey, kmer: u64) -> Option<bool> {
        self.is_valid_for(key).then(|| self.is_high_frequency(kmer))
    }
}

// ============================================================================
// Shared Cache Segment
// ============================================================================

/// Cross-worker high-frequency set.
///
/// A loader builds the whole set, then publishes it with one atomic pointer
/// swap. Published snapshots are never mutated; readers hold their own
/// `Arc` so an invalidation or replacement does not disturb them.
#[derive(Debug, Default)]
pub struct SharedHighFreqSegment {
    snapshot: ArcSwapOption<HighFreqSnapshot>,
}

impl SharedHighFreqSegment {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Builds and publishes a snapshot.
    ///
    /// # Errors
    ///
    /// [`Error::CacheBuildFailure`]; the previous snapshot stays published.
    pub fn publish(
        &self,
        key: HighFreqCacheKey,
        kmers: impl IntoIterator<Item = u64>,
        expected: usize,
        batch_size: usize,
    ) -> Result<()> {
        let snapshot = HighFreqSnapshot::build(key, kmers, expected, batch_size)?;
        info!(%key, kmers = snapshot.len(), "shared high-frequency cache published");
        self.snapshot.store(Some(Arc::new(snapshot)));
        Ok(())
    }

    /// Builds and publishes the set stored for `key`.
    pub fn publish_from_store<S: MetadataStore + ?Sized>(
        &self,
        store: &S,
        key: HighFreqCacheKey,
        batch_size: usize,
    ) -> Result<()> {
        let expected = store
            .get_count(&key)?
            .ok_or_else(|| Error::ConfigMismatch(format!("no stored analysis for {key}")))?;
        let kmers = store
            .get_highfreq_keys(&key)
            .map_err(|e| Error::CacheBuildFailure(e.to_string()))?;
        self.publish(key, kmers, expected, batch_size)
    }

    /// Withdraws the published snapshot.
    pub fn invalidate(&self) {
        if self.snapshot.swap(None).is_some() {
            debug!("shared high-frequency cache invalidated");
        }
    }

    /// Current snapshot, if one is published.
    pub fn snapshot(&self) -> Option<Arc<HighFreqSnapshot>> {
        self.snapshot.load_full()
    }

    /// Attaches a reader handle.
    pub fn attach(self: &Arc<Self>) -> SharedHighFreqHandle {
        debug!("attached to shared high-frequency cache");
        SharedHighFreqHandle {
            segment: Arc::clone(self),
        }
    }
}

/// A worker's attachment to a [`SharedHighFreqSegment`].
#[derive(Debug, Clone)]
pub struct SharedHighFreqHandle {
    segment: Arc<SharedHighFreqSegment>,
}

impl SharedHighFreqHandle {
    /// Membership test against a required tuple; `None` if no matching
    /// snapshot is published.
    pub fn lookup(&self, key: &HighFreqCacheKey, kmer: u64) -> Option<bool> {
        let snapshot = self.segment.snapshot.load();
        match snapshot.as_deref() {
            Some(snapshot) if snapshot.key().matches(key) => Some(snapshot.contains(kmer)),
            _ => None,
        }
    }

    /// Whether a snapshot matching `key` is published.
    pub fn is_valid_for(&self, key: &HighFreqCacheKey) -> bool {
        self.segment
            .snapshot
            .load()
            .as_deref()
            .is_some_and(|snapshot| snapshot.key().matches(key))
    }

    pub fn segment(&self) -> &Arc<SharedHighFreqSegment> {
        &self.segment
    }

    /// Releases the attachment.
    pub fn detach(self) {
        debug!("detached from shared high-frequency cache");
    }
}

// ============================================================================
// Filtering
// ============================================================================

/// Removes every key whose k-mer is high-frequency.
///
/// Returns the kept keys (in input order) and the number removed.
pub fn filter_keys(
    keys: &[u64],
    layout: KeyLayout,
    mut is_high_frequency: impl FnMut(u64) -> bool,
) -> (Vec<u64>, usize) {
    let kept: Vec<u64> = keys
        .iter()
        .copied()
        .filter(|&key| !is_high_frequency(layout.kmer_of(key)))
        .collect();
    let removed = keys.len() - kept.len();
    (kept, removed)
}

/// Number of keys whose k-mer is high-frequency.
pub fn count_high_frequency(
    keys: &[u64],
    layout: KeyLayout,
    mut is_high_frequency: impl FnMut(u64) -> bool,
) -> usize {
    keys.iter()
        .filter(|&&key| is_high_frequency(layout.kmer_of(key)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn cache_key() -> HighFreqCacheKey {
        HighFreqCacheKey::from_config(7, 2, &SearchConfig::default())
    }

    // ========================================================================
    // Cache Key Tuple
    // ========================================================================

    #[test]
    fn test_key_matches_each_field() {
        let base = cache_key();
        assert!(base.matches(&base));
        assert!(base.matches(&HighFreqCacheKey {
            max_appearance_rate: base.max_appearance_rate + 1e-12,
            ..base
        }));
        for changed in [
            HighFreqCacheKey { table: 8, ..base },
            HighFreqCacheKey { column: 3, ..base },
            HighFreqCacheKey { kmer_size: 8, ..base },
            HighFreqCacheKey { occurrence_bits: 2, ..base },
            HighFreqCacheKey { max_appearance_rate: 0.25, ..base },
            HighFreqCacheKey { max_appearance_nrow: 10, ..base },
        ] {
            assert!(!base.matches(&changed), "{changed}");
        }
    }

    // ========================================================================
    // Process-local Cache
    // ========================================================================

    #[test]
    fn test_state_machine() {
        let mut cache = HighFreqCache::new();
        assert_eq!(cache.state(), CacheState::Empty);
        assert!(!cache.is_high_frequency(1));

        cache.load(cache_key(), [1, 2, 3], 3, 2).unwrap();
        assert_eq!(cache.state(), CacheState::Valid);
        assert_eq!(cache.len(), 3);
        assert!(cache.is_high_frequency(2));
        assert!(!cache.is_high_frequency(4));

        cache.clear();
        assert_eq!(cache.state(), CacheState::Empty);
        assert!(!cache.is_high_frequency(2));
    }

    #[test]
    fn test_lookup_requires_matching_tuple() {
        let mut cache = HighFreqCache::new();
        cache.load(cache_key(), [5], 1, 10).unwrap();
        assert_eq!(cache.lookup(&cache_key(), 5), Some(true));
        assert_eq!(cache.lookup(&cache_key(), 6), Some(false));
        let other = HighFreqCacheKey {
            kmer_size: 8,
            ..cache_key()
        };
        assert_eq!(cache.lookup(&other, 5), None);
    }

    #[test]
    fn test_build_failure_leaves_cache_empty() {
        let mut cache = HighFreqCache::new();
        cache.load(cache_key(), [1], 1, 1).unwrap();

        let err = cache.load(cache_key(), [1, 2], usize::MAX, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CacheBuildFailure);
        assert_eq!(cache.state(), CacheState::Empty);
        assert!(!cache.is_high_frequency(1));
    }

    #[test]
    fn test_load_from_store() {
        let mut store = InMemoryMetadataStore::new();
        store
            .put_highfreq_keys(&cache_key(), &mut [10u64, 20, 30].into_iter())
            .unwrap();

        let mut cache = HighFreqCache::new();
        cache.load_from_store(&store, cache_key(), 2).unwrap();
        assert!(cache.is_valid_for(&cache_key()));
        assert!(cache.is_high_frequency(20));

        let missing = HighFreqCacheKey {
            table: 99,
            ..cache_key()
        };
        let err = cache.load_from_store(&store, missing, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigMismatch);
        assert_eq!(cache.state(), CacheState::Empty);
    }

    #[test]
    fn test_store_replaces_and_scans() {
        let mut store = InMemoryMetadataStore::new();
        let key = cache_key();
        store.put_highfreq_keys(&key, &mut [1u64, 2].into_iter()).unwrap();
        store.put_highfreq_keys(&key, &mut [3u64].into_iter()).unwrap();
        assert_eq!(store.get_count(&key).unwrap(), Some(1));
        assert!(store.contains_highfreq_key(&key, 3).unwrap());
        assert!(!store.contains_highfreq_key(&key, 1).unwrap());
        let other = HighFreqCacheKey { column: 9, ..key };
        assert_eq!(store.get_count(&other).unwrap(), None);
        assert_eq!(
            store.contains_highfreq_key(&other, 3).unwrap_err().kind(),
            ErrorKind::Store
        );
    }

    // ========================================================================
    // Shared Segment
    // ========================================================================

    #[test]
    fn test_shared_publish_and_attach() {
        let segment = SharedHighFreqSegment::new();
        let handle = segment.attach();
        assert_eq!(handle.lookup(&cache_key(), 1), None);

        segment.publish(cache_key(), [1, 2], 2, 1).unwrap();
        assert_eq!(handle.lookup(&cache_key(), 1), Some(true));
        assert_eq!(handle.lookup(&cache_key(), 3), Some(false));
        assert!(handle.is_valid_for(&cache_key()));

        let held = segment.snapshot().unwrap();
        segment.invalidate();
        assert_eq!(handle.lookup(&cache_key(), 1), None);
        // A reader's snapshot survives invalidation.
        assert!(held.contains(1));
        handle.detach();
    }

    #[test]
    fn test_shared_failed_publish_keeps_previous() {
        let segment = SharedHighFreqSegment::new();
        segment.publish(cache_key(), [1], 1, 1).unwrap();
        assert!(segment.publish(cache_key(), [2], usize::MAX, 1).is_err());
        assert!(segment.snapshot().unwrap().contains(1));
    }

    #[test]
    fn test_shared_readers_across_threads() {
        let segment = SharedHighFreqSegment::new();
        segment.publish(cache_key(), 0..1000, 1000, 100).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let handle = segment.attach();
                std::thread::spawn(move || {
                    assert_eq!(handle.lookup(&cache_key(), i * 100), Some(true));
                    assert_eq!(handle.lookup(&cache_key(), 5000 + i), Some(false));
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("Thread panicked");
        }
    }

    // ========================================================================
    // Filtering
    // ========================================================================

    #[test]
    fn test_filter_keys_strips_occurrence() {
        let layout = KeyLayout::new(4, 2).unwrap();
        let keys = vec![
            layout.compose(5, 0),
            layout.compose(5, 1),
            layout.compose(6, 0),
        ];
        let (kept, removed) = filter_keys(&keys, layout, |kmer| kmer == 5);
        assert_eq!(kept, vec![layout.compose(6, 0)]);
        assert_eq!(removed, 2);
        assert_eq!(count_high_frequency(&keys, layout, |kmer| kmer == 5), 2);

        let (again, removed_again) = filter_keys(&kept, layout, |kmer| kmer == 5);
        assert_eq!(again, kept);
        assert_eq!(removed_again, 0);
    }
}
