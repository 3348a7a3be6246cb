// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! End-to-end scenarios across extraction, matching, caching and storage.

use std::sync::Arc;

use simdkmer::analysis::analyze_blocks;
use simdkmer::high_freq::{CacheState, SharedHighFreqSegment};
use simdkmer::kmer_extractor::{extract_keys, extract_query_keys, text_window_expandable};
use simdkmer::packed_sequence::{encode_2bit, encode_4bit};
use simdkmer::serialization::{from_blob, keys_from_bytes, keys_to_bytes, to_blob};
use simdkmer::{
    ErrorKind, HighFreqCacheKey, InMemoryMetadataStore, KeyLayout, MetadataStore, PackedSequence,
    SearchConfig, SearchSession, count_shared,
};

fn config(kmer_size: usize, occurrence_bits: u32) -> SearchConfig {
    SearchConfig {
        kmer_size,
        occurrence_bits,
        min_shared_rate: 0.5,
        ..SearchConfig::default()
    }
}

fn kmer(text: &[u8]) -> u64 {
    text.iter().fold(0, |acc, &b| {
        let code = match b {
            b'A' => 0,
            b'C' => 1,
            b'G' => 2,
            _ => 3,
        };
        (acc << 2) | code
    })
}

// ============================================================================
// Extraction and Matching
// ============================================================================

#[test]
fn test_worked_example_acgtacgtac() {
    let layout = KeyLayout::new(4, 2).unwrap();
    let sequence = encode_2bit(b"ACGTACGTAC").unwrap();
    let keys = extract_keys(&sequence, 4, 2).unwrap();

    let expected: Vec<u64> = [
        (b"ACGT", 0),
        (b"CGTA", 0),
        (b"GTAC", 0),
        (b"TACG", 0),
        (b"ACGT", 1),
        (b"CGTA", 1),
        (b"GTAC", 1),
    ]
    .iter()
    .map(|(text, occurrence)| layout.compose(kmer(*text), *occurrence))
    .collect();
    assert_eq!(keys, expected);

    let query = extract_query_keys(b"ACGT", 4, 2).unwrap();
    assert_eq!(query, vec![layout.compose(kmer(b"ACGT"), 0)]);
    assert_eq!(count_shared(&keys, &query), 1);
}

#[test]
fn test_repeated_kmer_gets_distinct_keys() {
    let layout = KeyLayout::new(4, 2).unwrap();
    let sequence = encode_2bit(b"GATTACAGATTACAGATTACA").unwrap();
    let keys = extract_keys(&sequence, 4, 2).unwrap();

    let gatt: Vec<u64> = keys
        .iter()
        .copied()
        .filter(|&key| layout.kmer_of(key) == kmer(b"GATT"))
        .collect();
    assert_eq!(gatt.len(), 3);
    let occurrences: Vec<u64> = gatt.iter().map(|&key| layout.occurrence_of(key)).collect();
    assert_eq!(occurrences, vec![0, 1, 2]);

    let query = extract_query_keys(b"GATT", 4, 2).unwrap();
    assert_eq!(count_shared(&keys, &query), 1);
}

#[test]
fn test_degeneracy_limit_on_both_paths() {
    // Two M symbols in one window: refused.
    let packed = encode_4bit(b"AMMA").unwrap();
    assert!(extract_keys(&packed, 4, 2).unwrap().is_empty());
    assert!(!text_window_expandable(b"AMMA", 0, 4));
    assert!(extract_query_keys(b"AMMA", 4, 2).unwrap().is_empty());

    // One V: exactly three concrete k-mers.
    let packed = encode_4bit(b"ACVT").unwrap();
    let layout = KeyLayout::new(4, 2).unwrap();
    let keys = extract_keys(&packed, 4, 2).unwrap();
    let kmers: Vec<u64> = keys.iter().map(|&key| layout.kmer_of(key)).collect();
    assert_eq!(kmers, vec![kmer(b"ACAT"), kmer(b"ACCT"), kmer(b"ACGT")]);
    assert!(text_window_expandable(b"ACVT", 0, 4));
    assert_eq!(extract_query_keys(b"ACVT", 4, 2).unwrap(), keys);
}

#[test]
fn test_invalid_parameters() {
    let sequence = encode_2bit(b"ACGTACGT").unwrap();
    for (k, occ) in [(3, 0), (33, 0), (4, 17), (32, 1)] {
        let err = extract_keys(&sequence, k, occ).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter, "k={k} occ={occ}");
    }
    let err = extract_query_keys(b"ACG", 4, 2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueryTooShort);
    let err = extract_query_keys(b"ACGT-ACGT", 4, 2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCharacter);
}

// ============================================================================
// Sessions and Caches
// ============================================================================

#[test]
fn test_pattern_cache_invalidated_by_kmer_size_change() {
    let mut session = SearchSession::new(config(4, 2), 1, 0, InMemoryMetadataStore::new()).unwrap();
    let stale = session.query_keys("ACGTACGT").unwrap().to_vec();

    session.set_config(config(5, 2)).unwrap();
    let fresh = session.query_keys("ACGTACGT").unwrap().to_vec();
    assert_ne!(fresh, stale);
    assert_eq!(fresh, extract_query_keys(b"ACGTACGT", 5, 2).unwrap());
    assert_eq!(session.pattern_cache_stats().hits, 0);
}

#[test]
fn test_search_over_mixed_alphabets() {
    let mut session = SearchSession::new(config(4, 2), 1, 0, InMemoryMetadataStore::new()).unwrap();
    let rows: Vec<(u64, PackedSequence)> = vec![
        (0, encode_2bit(b"ACGTACGT").unwrap()),
        (1, encode_4bit(b"ACGTNNNNACGT").unwrap()),
        (2, encode_4bit(b"ACGTRCGT").unwrap()),
    ];
    // Query keys: ACGT0 CGTA0 GTAC0 TACG0 ACGT1; min score 3.
    let hits = session.search(rows, "ACGTACGT").unwrap();
    // Row 1 only shares ACGT0 and ACGT1. Row 2 expands R to A and G; the
    // A variants restore every query key.
    assert_eq!(hits, vec![(0, 5), (2, 5)]);
}

#[test]
fn test_analysis_shared_segment_and_filtering() {
    let mut config = config(4, 2);
    config.high_frequency_filtering = true;
    let blocks = vec![
        vec![
            encode_2bit(b"ACGTAAAA").unwrap(),
            encode_2bit(b"ACGTCCCC").unwrap(),
        ],
        vec![
            encode_2bit(b"ACGTGGGG").unwrap(),
            encode_2bit(b"TTTTTTTT").unwrap(),
        ],
    ];

    let analysis = analyze_blocks(&blocks, &config, 3, 1).unwrap();
    assert_eq!(analysis.high_frequency, vec![kmer(b"ACGT")]);

    let mut store = InMemoryMetadataStore::new();
    analysis.persist(&mut store).unwrap();

    // One worker publishes, another reads through its session.
    let segment: Arc<SharedHighFreqSegment> = SharedHighFreqSegment::new();
    segment
        .publish_from_store(&store, HighFreqCacheKey::from_config(3, 1, &config), 16)
        .unwrap();

    let mut session = SearchSession::new(config.clone(), 3, 1, store).unwrap();
    session.attach_shared(&segment);
    assert_eq!(session.high_freq_cache().state(), CacheState::Empty);
    assert!(session.is_high_frequency(kmer(b"ACGT")).unwrap());
    assert!(!session.is_high_frequency(kmer(b"TTTT")).unwrap());

    // "ACGTACGTAC" has 7 keys, 2 of them ACGT: ceil(3.5) - 2 = 2.
    let keys = session.query_keys("ACGTACGTAC").unwrap().to_vec();
    assert_eq!(session.actual_min_score(&keys).unwrap(), 2);

    let (filtered, removed) = session.filter_keys(&keys).unwrap();
    assert_eq!(removed, 2);
    assert_eq!(session.filter_keys(&filtered).unwrap(), (filtered.clone(), 0));

    // A different table has no analysis anywhere.
    let other = HighFreqCacheKey::from_config(4, 1, &config);
    assert_eq!(session.store().get_count(&other).unwrap(), None);

    session.detach_shared();
    segment.invalidate();
}

// ============================================================================
// Storage
// ============================================================================

#[test]
fn test_blob_and_key_storage_roundtrip() {
    let sequence = encode_4bit(b"ACGTNNACGTRYACGT").unwrap();
    let restored = from_blob(&to_blob(&sequence, true).unwrap()).unwrap();
    assert_eq!(restored, sequence);

    let layout = KeyLayout::new(4, 2).unwrap();
    let keys = extract_keys(&restored, 4, 2).unwrap();
    let bytes = keys_to_bytes(&keys, layout.width()).unwrap();
    assert_eq!(keys_from_bytes(&bytes).unwrap(), keys);
}

#[test]
fn test_config_toml_roundtrip() {
    let config = config(12, 4);
    let text = config.to_toml().unwrap();
    assert_eq!(SearchConfig::from_toml(&text).unwrap(), config);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("simdkmer.toml");
    std::fs::write(&path, "kmer_size = 20\n[cache]\nquery_pattern_capacity = 7\n").unwrap();
    let loaded = SearchConfig::load_from_path(&path).unwrap();
    assert_eq!(loaded.kmer_size, 20);
    assert_eq!(loaded.cache.query_pattern_capacity, 7);
    assert_eq!(loaded.occurrence_bits, SearchConfig::default().occurrence_bits);
}
