// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Appearance analysis: which k-mers occur in too many rows.
//!
//! Each worker counts, for its own block of rows, how many rows contain each
//! raw k-mer ([`count_appearances`]). The partial maps are then merged by
//! summing counts per k-mer and keeping those above the appearance threshold
//! ([`merge_partial_counts`]). [`analyze_blocks`] runs the whole pass with
//! one rayon task per block.

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::error::Result;
use crate::high_freq::{HighFreqCacheKey, MetadataStore};
use crate::kmer_extractor::KmerExtractor;
use crate::packed_sequence::PackedSequence;

/// Raw k-mer → number of rows containing it.
pub type PartialCounts = FxHashMap<u64, u64>;

/// Row count above which a k-mer is high-frequency.
///
/// `floor(rate * total_rows)`, capped at `max_nrow` when `max_nrow > 0`.
///
/// ```rust
/// use simdkmer::analysis::appearance_threshold;
///
/// assert_eq!(appearance_threshold(10, 0.5, 0), 5);
/// assert_eq!(appearance_threshold(10, 0.5, 3), 3);
/// assert_eq!(appearance_threshold(7, 0.5, 0), 3);
/// ```
pub fn appearance_threshold(total_rows: u64, max_rate: f64, max_nrow: u64) -> u64 {
    let by_rate = (max_rate * total_rows as f64).floor() as u64;
    if max_nrow > 0 {
        by_rate.min(max_nrow)
    } else {
        by_rate
    }
}

/// Counts, per raw k-mer, how many of `rows` contain it.
pub fn count_appearances<'a>(
    rows: impl IntoIterator<Item = &'a PackedSequence>,
    extractor: &KmerExtractor,
) -> PartialCounts {
    let layout = extractor.layout();
    let mut counts = PartialCounts::default();
    let mut seen = FxHashSet::default();

    for row in rows {
        seen.clear();
        for key in extractor.extract(row) {
            let kmer = layout.kmer_of(key);
            if seen.insert(kmer) {
                *counts.entry(kmer).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// Sums partial counts and returns the k-mers whose total exceeds `threshold`, sorted.
pub fn merge_partial_counts(
    partials: impl IntoIterator<Item = PartialCounts>,
    threshold: u64,
) -> Vec<u64> {
    let mut totals = PartialCounts::default();
    for partial in partials {
        for (kmer, count) in partial {
            *totals.entry(kmer).or_insert(0) += count;
        }
    }

    let mut high_frequency: Vec<u64> = totals
        .into_iter()
        .filter(|&(_, count)| count > threshold)
        .map(|(kmer, _)| kmer)
        .collect();
    high_frequency.sort_unstable();
    high_frequency
}

/// Result of one appearance analysis.
#[derive(Debug, Clone)]
pub struct AppearanceAnalysis {
    pub key: HighFreqCacheKey,
    pub total_rows: u64,
    pub threshold: u64,
    /// Sorted raw k-mer values.
    pub high_frequency: Vec<u64>,
}

impl AppearanceAnalysis {
    /// Stores the result under its cache key tuple.
    pub fn persist<S: MetadataStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        store.put_highfreq_keys(&self.key, &mut self.high_frequency.iter().copied())?;
        debug!(key = %self.key, kmers = self.high_frequency.len(), "analysis persisted");
        Ok(())
    }
}

/// Analyzes disjoint blocks of rows in parallel.
///
/// # Errors
///
/// [`crate::error::Error::InvalidParameter`] if `config` is invalid.
pub fn analyze_blocks<B>(
    blocks: &[B],
    config: &SearchConfig,
    table: u32,
    column: u16,
) -> Result<AppearanceAnalysis>
where
    B: AsRef<[PackedSequence]> + Sync,
{
    config.validate()?;
    let extractor = KmerExtractor::new(config.layout()?)
        .with_max_tracked_kmers(config.cache.max_tracked_kmers);

    let partials: Vec<(u64, PartialCounts)> = blocks
        .par_iter()
        .map(|block| {
            let rows = block.as_ref();
            (rows.len() as u64, count_appearances(rows, &extractor))
        })
        .collect();

    let total_rows: u64 = partials.iter().map(|(rows, _)| rows).sum();
    let threshold = appearance_threshold(
        total_rows,
        config.max_appearance_rate,
        config.max_appearance_nrow,
    );
    let high_frequency =
        merge_partial_counts(partials.into_iter().map(|(_, counts)| counts), threshold);

    info!(
        blocks = blocks.len(),
        total_rows,
        threshold,
        high_frequency = high_frequency.len(),
        "appearance analysis finished"
    );

    Ok(AppearanceAnalysis {
        key: HighFreqCacheKey::from_config(table, column, config),
        total_rows,
        threshold,
        high_frequency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::high_freq::InMemoryMetadataStore;
    use crate::key::KeyLayout;
    use crate::packed_sequence::encode_2bit;

    fn rows(texts: &[&[u8]]) -> Vec<PackedSequence> {
        texts.iter().map(|t| encode_2bit(t).unwrap()).collect()
    }

    fn small_config() -> SearchConfig {
        SearchConfig {
            kmer_size: 4,
            occurrence_bits: 2,
            max_appearance_rate: 0.5,
            ..SearchConfig::default()
        }
    }

    #[test]
    fn test_threshold_rounding_and_cap() {
        assert_eq!(appearance_threshold(0, 0.5, 0), 0);
        assert_eq!(appearance_threshold(100, 1.0, 0), 100);
        assert_eq!(appearance_threshold(100, 0.25, 10), 10);
        assert_eq!(appearance_threshold(3, 0.5, 100), 1);
    }

    #[test]
    fn test_count_appearances_counts_rows_not_occurrences() {
        let extractor = KmerExtractor::new(KeyLayout::new(4, 2).unwrap());
        let data = rows(&[b"AAAAAA", b"AAAAC", b"CCCC"]);
        let counts = count_appearances(&data, &extractor);
        assert_eq!(counts[&0], 2); // AAAA
        assert_eq!(counts[&0b00_00_00_01], 1); // AAAC
        assert_eq!(counts[&0b01_01_01_01], 1); // CCCC
        assert_eq!(counts.len(), 3);
    }

    #[test]
    fn test_merge_sums_and_thresholds() {
        let a: PartialCounts = [(1, 2), (2, 1), (3, 5)].into_iter().collect();
        let b: PartialCounts = [(1, 1), (2, 1)].into_iter().collect();
        assert_eq!(merge_partial_counts([a.clone(), b.clone()], 2), vec![1, 3]);
        assert_eq!(merge_partial_counts([a, b], 3), vec![3]);
        assert!(merge_partial_counts(Vec::<PartialCounts>::new(), 0).is_empty());
    }

    #[test]
    fn test_analyze_blocks_matches_single_pass() {
        let config = small_config();
        let block_a = rows(&[b"ACGTAAAA", b"ACGTCCCC"]);
        let block_b = rows(&[b"ACGTGGGG", b"TTTTTTTT"]);
        let analysis = analyze_blocks(&[block_a.clone(), block_b.clone()], &config, 1, 1).unwrap();

        assert_eq!(analysis.total_rows, 4);
        assert_eq!(analysis.threshold, 2);
        // ACGT appears in 3 of 4 rows.
        assert_eq!(analysis.high_frequency, vec![0b00_01_10_11]);

        let all: Vec<PackedSequence> = block_a.into_iter().chain(block_b).collect();
        let extractor = KmerExtractor::new(config.layout().unwrap());
        let single = merge_partial_counts([count_appearances(&all, &extractor)], 2);
        assert_eq!(single, analysis.high_frequency);
    }

    #[test]
    fn test_persist_round_trips_through_store() {
        let config = small_config();
        let analysis = analyze_blocks(&[rows(&[b"ACGTA", b"ACGTC", b"GGGGG"])], &config, 4, 0).unwrap();
        let mut store = InMemoryMetadataStore::new();
        analysis.persist(&mut store).unwrap();

        let key = HighFreqCacheKey::from_config(4, 0, &config);
        assert_eq!(store.get_count(&key).unwrap(), Some(analysis.high_frequency.len()));
        assert!(store.contains_highfreq_key(&key, 0b00_01_10_11).unwrap());
    }

    #[test]
    fn test_analyze_rejects_invalid_config() {
        let config = SearchConfig {
            kmer_size: 2,
            ..SearchConfig::default()
        };
        let blocks: Vec<Vec<PackedSequence>> = Vec::new();
        assert!(analyze_blocks(&blocks, &config, 0, 0).is_err());
    }
}
