// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! # Search Session
//!
//! [`SearchSession`] is the per-worker context: it owns the active
//! configuration, the query-pattern and actual-min-score caches, the
//! process-local high-frequency cache, an optional attachment to a shared
//! high-frequency segment, and the metadata store.
//!
//! ## Invalidation
//!
//! [`SearchSession::set_config`] diffs the new configuration against the
//! active one:
//!
//! | Changed group                         | Effect                                |
//! |---------------------------------------|---------------------------------------|
//! | k-mer size, occurrence bits           | score caches cleared, local HF cache cleared |
//! | min score, min shared rate            | score caches cleared                  |
//! | appearance rate / row cap             | score caches cleared, local HF cache cleared |
//! | high-frequency filtering toggle       | score caches cleared                  |
//! | cache capacities                      | caches rebuilt empty                  |
//!
//! The shared segment is never cleared from a session; lookups simply stop
//! using it once its tuple no longer matches.
//!
//! Loading, clearing, attaching or detaching a high-frequency set empties
//! the actual-min-score cache.
//!
//! ## High-frequency lookups
//!
//! 1. local cache, if valid for the current tuple
//! 2. shared segment, if attached and valid for the current tuple
//! 3. the metadata store (slow path, logged at `warn`)

use std::borrow::Cow;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::analysis::{self, AppearanceAnalysis};
use crate::config::{ConfigChanges, SearchConfig};
use crate::error::{Error, Result};
use crate::high_freq::{
    self, HighFreqCache, HighFreqCacheKey, MetadataStore, SharedHighFreqHandle,
    SharedHighFreqSegment,
};
use crate::key::KeyLayout;
use crate::kmer_extractor::KmerExtractor;
use crate::matcher::{count_shared, is_match};
use crate::min_score_cache::{ActualMinScoreCache, actual_min_score};
use crate::packed_sequence::PackedSequence;
use crate::pattern_cache::{CacheStats, QueryPatternCache};

/// Identifier of one row yielded by a row source.
pub type RowId = u64;

/// Per-worker search context.
#[derive(Debug)]
pub struct SearchSession<S: MetadataStore> {
    config: SearchConfig,
    layout: KeyLayout,
    table: u32,
    column: u16,
    store: S,
    pattern_cache: QueryPatternCache,
    min_score_cache: ActualMinScoreCache,
    high_freq: HighFreqCache,
    shared: Option<SharedHighFreqHandle>,
}

impl<S: MetadataStore> SearchSession<S> {
    /// Creates a session searching `table`/`column`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if `config` does not validate.
    pub fn new(config: SearchConfig, table: u32, column: u16, store: S) -> Result<Self> {
        config.validate()?;
        let layout = config.layout()?;
        Ok(Self {
            pattern_cache: QueryPatternCache::new(config.cache.query_pattern_capacity),
            min_score_cache: ActualMinScoreCache::new(config.cache.actual_min_score_capacity),
            high_freq: HighFreqCache::new(),
            shared: None,
            config,
            layout,
            table,
            column,
            store,
        })
    }

    #[inline]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    #[inline]
    pub fn layout(&self) -> KeyLayout {
        self.layout
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[inline]
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// The process-local high-frequency cache.
    #[inline]
    pub fn high_freq_cache(&self) -> &HighFreqCache {
        &self.high_freq
    }

    pub fn pattern_cache_stats(&self) -> CacheStats {
        self.pattern_cache.stats()
    }

    pub fn min_score_cache_stats(&self) -> CacheStats {
        self.min_score_cache.stats()
    }

    /// Number of cached query patterns.
    pub fn cached_patterns(&self) -> usize {
        self.pattern_cache.len()
    }

    /// Cache key tuple for the active configuration.
    pub fn cache_key(&self) -> HighFreqCacheKey {
        HighFreqCacheKey::from_config(self.table, self.column, &self.config)
    }

    /// Extractor for the active configuration.
    pub fn extractor(&self) -> KmerExtractor {
        KmerExtractor::new(self.layout).with_max_tracked_kmers(self.config.cache.max_tracked_kmers)
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Replaces the configuration and invalidates whatever depended on it.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`]; the active configuration is kept.
    pub fn set_config(&mut self, config: SearchConfig) -> Result<ConfigChanges> {
        config.validate()?;
        let changes = self.config.diff(&config);
        if changes.is_empty() {
            return Ok(changes);
        }

        self.layout = config.layout()?;
        if changes.cache {
            self.pattern_cache.reset(config.cache.query_pattern_capacity);
            self.min_score_cache
                .reset(config.cache.actual_min_score_capacity);
        } else if changes.invalidates_score_caches() {
            self.pattern_cache.clear();
            self.min_score_cache.clear();
        }
        if changes.invalidates_high_freq() {
            self.high_freq.clear();
        }
        debug!(?changes, "configuration updated");
        self.config = config;
        Ok(changes)
    }

    // ========================================================================
    // Keys and Scores
    // ========================================================================

    /// Keys of a query, served from the query-pattern cache.
    ///
    /// # Errors
    ///
    /// [`Error::QueryTooShort`] or [`Error::InvalidCharacter`].
    pub fn query_keys(&mut self, query: &str) -> Result<&[u64]> {
        let extractor = self.extractor();
        cached_query_keys(&mut self.pattern_cache, &extractor, query)
    }

    /// Keys of one stored sequence.
    pub fn sequence_keys(&self, sequence: &PackedSequence) -> Vec<u64> {
        self.extractor().extract(sequence)
    }

    /// Minimum shared count a row needs to match `query_keys`.
    pub fn actual_min_score(&mut self, query_keys: &[u64]) -> Result<usize> {
        let key = self.cache_key();
        let Self {
            config,
            layout,
            min_score_cache,
            high_freq,
            shared,
            store,
            ..
        } = self;
        let tiers = Tiers {
            local: high_freq,
            shared: shared.as_ref(),
            store,
            key,
        };
        cached_min_score(min_score_cache, config, *layout, &tiers, query_keys)
    }

    /// Shared key count between a stored sequence and a query.
    ///
    /// With high-frequency filtering on, high-frequency query keys do not count.
    pub fn score(&mut self, sequence: &PackedSequence, query: &str) -> Result<usize> {
        let key = self.cache_key();
        let extractor = self.extractor();
        let Self {
            config,
            layout,
            pattern_cache,
            high_freq,
            shared,
            store,
            ..
        } = self;
        let tiers = Tiers {
            local: high_freq,
            shared: shared.as_ref(),
            store,
            key,
        };

        let query_keys = cached_query_keys(pattern_cache, &extractor, query)?;
        let match_keys = matching_keys(config, *layout, &tiers, query_keys)?;
        Ok(count_shared(&extractor.extract(sequence), &match_keys))
    }

    /// Whether a stored sequence matches a query.
    pub fn matches(&mut self, sequence: &PackedSequence, query: &str) -> Result<bool> {
        Ok(self.search([(0, sequence.clone())], query)?.len() == 1)
    }

    /// Scores every row of a row source and returns the matching rows with
    /// their shared counts, in input order.
    ///
    /// The minimum score comes from the full query key array; the shared
    /// count ignores high-frequency query keys when filtering is on.
    pub fn search<I>(&mut self, rows: I, query: &str) -> Result<Vec<(RowId, usize)>>
    where
        I: IntoIterator<Item = (RowId, PackedSequence)>,
    {
        let key = self.cache_key();
        let extractor = self.extractor();
        let Self {
            config,
            layout,
            pattern_cache,
            min_score_cache,
            high_freq,
            shared,
            store,
            ..
        } = self;
        let tiers = Tiers {
            local: high_freq,
            shared: shared.as_ref(),
            store,
            key,
        };

        let query_keys = cached_query_keys(pattern_cache, &extractor, query)?;
        let min_score = cached_min_score(min_score_cache, config, *layout, &tiers, query_keys)?;
        let match_keys = matching_keys(config, *layout, &tiers, query_keys)?;

        let mut hits = Vec::new();
        for (row, sequence) in rows {
            let shared_count = count_shared(&extractor.extract(&sequence), &match_keys);
            if is_match(shared_count, min_score) {
                hits.push((row, shared_count));
            }
        }
        Ok(hits)
    }

    // ========================================================================
    // High-frequency K-mers
    // ========================================================================

    /// Loads the local cache from the store for the active tuple.
    ///
    /// # Errors
    ///
    /// [`Error::ConfigMismatch`] or [`Error::CacheBuildFailure`]; the cache is left empty.
    pub fn load_high_freq_cache(&mut self) -> Result<()> {
        let key = self.cache_key();
        let batch = self.config.cache.high_freq_load_batch_size;
        self.min_score_cache.clear();
        self.high_freq.load_from_store(&self.store, key, batch)
    }

    /// Loads the local cache from an explicit source.
    pub fn load_high_freq_cache_from(
        &mut self,
        key: HighFreqCacheKey,
        kmers: impl IntoIterator<Item = u64>,
        expected: usize,
    ) -> Result<()> {
        let batch = self.config.cache.high_freq_load_batch_size;
        self.min_score_cache.clear();
        self.high_freq.load(key, kmers, expected, batch)
    }

    /// Drops the local cache.
    pub fn clear_high_freq_cache(&mut self) {
        self.high_freq.clear();
        self.min_score_cache.clear();
    }

    /// Attaches to a shared segment, replacing any previous attachment.
    pub fn attach_shared(&mut self, segment: &Arc<SharedHighFreqSegment>) {
        if let Some(previous) = self.shared.replace(segment.attach()) {
            previous.detach();
        }
        self.min_score_cache.clear();
    }

    /// Detaches from the shared segment, if attached.
    pub fn detach_shared(&mut self) {
        if let Some(handle) = self.shared.take() {
            handle.detach();
            self.min_score_cache.clear();
        }
    }

    /// Whether a raw k-mer is high-frequency for the active tuple.
    ///
    /// # Errors
    ///
    /// On the slow path: [`Error::ConfigMismatch`] if the store has no
    /// analysis for the active tuple, or the store's own error.
    pub fn is_high_frequency(&self, kmer: u64) -> Result<bool> {
        self.tiers().lookup(kmer)
    }

    /// Removes keys whose k-mer is high-frequency; returns kept keys and the removed count.
    pub fn filter_keys(&self, keys: &[u64]) -> Result<(Vec<u64>, usize)> {
        self.tiers().filter(keys, self.layout)
    }

    /// Runs an appearance analysis over `blocks`, stores the result and
    /// drops the now stale local cache.
    pub fn analyze<B>(&mut self, blocks: &[B]) -> Result<AppearanceAnalysis>
    where
        B: AsRef<[PackedSequence]> + Sync,
    {
        let analysis = analysis::analyze_blocks(blocks, &self.config, self.table, self.column)?;
        analysis.persist(&mut self.store)?;
        self.high_freq.clear();
        self.min_score_cache.clear();
        Ok(analysis)
    }

    fn tiers(&self) -> Tiers<'_, S> {
        Tiers {
            local: &self.high_freq,
            shared: self.shared.as_ref(),
            store: &self.store,
            key: self.cache_key(),
        }
    }
}

/// Borrowed view of the three high-frequency tiers.
struct Tiers<'a, S: MetadataStore> {
    local: &'a HighFreqCache,
    shared: Option<&'a SharedHighFreqHandle>,
    store: &'a S,
    key: HighFreqCacheKey,
}

impl<S: MetadataStore> Tiers<'_, S> {
    fn lookup(&self, kmer: u64) -> Result<bool> {
        if let Some(hit) = self.local.lookup(&self.key, kmer) {
            return Ok(hit);
        }
        if let Some(hit) = self.shared.and_then(|handle| handle.lookup(&self.key, kmer)) {
            return Ok(hit);
        }

        warn!(key = %self.key, "no valid high-frequency cache, querying metadata store");
        if self.store.get_count(&self.key)?.is_none() {
            return Err(Error::ConfigMismatch(format!(
                "no stored analysis for {}",
                self.key
            )));
        }
        self.store.contains_highfreq_key(&self.key, kmer)
    }

    fn filter(&self, keys: &[u64], layout: KeyLayout) -> Result<(Vec<u64>, usize)> {
        let mut failure = None;
        let filtered = high_freq::filter_keys(keys, layout, |kmer| {
            if failure.is_some() {
                return false;
            }
            self.lookup(kmer).unwrap_or_else(|err| {
                failure = Some(err);
                false
            })
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(filtered),
        }
    }

    fn count(&self, keys: &[u64], layout: KeyLayout) -> Result<usize> {
        let mut count = 0;
        for &key in keys {
            if self.lookup(layout.kmer_of(key))? {
                count += 1;
            }
        }
        Ok(count)
    }
}

fn cached_query_keys<'c>(
    cache: &'c mut QueryPatternCache,
    extractor: &KmerExtractor,
    query: &str,
) -> Result<&'c [u64]> {
    cache.get_or_compute(query, extractor.layout().kmer_size(), || {
        extractor.extract_query(query.as_bytes())
    })
}

/// Query keys that take part in matching.
fn matching_keys<'q, S: MetadataStore>(
    config: &SearchConfig,
    layout: KeyLayout,
    tiers: &Tiers<'_, S>,
    query_keys: &'q [u64],
) -> Result<Cow<'q, [u64]>> {
    if !config.high_frequency_filtering {
        return Ok(Cow::Borrowed(query_keys));
    }
    let (kept, removed) = tiers.filter(query_keys, layout)?;
    trace!(removed, kept = kept.len(), "high-frequency query keys excluded");
    Ok(Cow::Owned(kept))
}

fn cached_min_score<S: MetadataStore>(
    cache: &mut ActualMinScoreCache,
    config: &SearchConfig,
    layout: KeyLayout,
    tiers: &Tiers<'_, S>,
    query_keys: &[u64],
) -> Result<usize> {
    cache.get_or_compute(query_keys, || {
        let high_frequency = if config.high_frequency_filtering {
            Some(tiers.count(query_keys, layout)?)
        } else {
            None
        };
        Ok(actual_min_score(
            query_keys.len(),
            config.min_score,
            config.min_shared_rate,
            high_frequency,
        ))
    })
}
