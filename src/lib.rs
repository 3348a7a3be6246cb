// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! # simdkmer
//!
//! Occurrence-aware k-mer extraction and similarity matching over packed
//! nucleotide sequences, with SIMD encode/decode and matching kernels
//! selected at runtime.
//!
//! ## Features
//!
//! - **2-bit packing** for clean A/C/G/T/U sequences (4 bases per byte)
//! - **4-bit packing** for all 15 IUPAC codes (2 bases per byte)
//! - **SIMD acceleration** on x86_64 (SSSE3, SSE4.1, AVX2) and ARM64 (NEON),
//!   detected once per process with a scalar fallback
//! - **Occurrence-aware keys**: repeated k-mers within one sequence get
//!   distinct keys, so shared counts behave like multiset intersections
//! - **Degenerate expansion** of windows with at most one 2- or 3-way
//!   ambiguous base
//! - **High-frequency k-mer filtering** backed by local, shared and
//!   persistent tiers
//! - **Query-pattern and minimum-score caches** invalidated on configuration change
//!
//! ## Quick Start
//!
//! ```rust
//! use simdkmer::packed_sequence::encode_2bit;
//! use simdkmer::key::KeyLayout;
//! use simdkmer::kmer_extractor::KmerExtractor;
//! use simdkmer::matcher::count_shared;
//!
//! let layout = KeyLayout::new(4, 2).unwrap();
//! let extractor = KmerExtractor::new(layout);
//!
//! let sequence = encode_2bit(b"ACGTACGTAC").unwrap();
//! let sequence_keys = extractor.extract(&sequence);
//! let query_keys = extractor.extract_query(b"ACGT").unwrap();
//!
//! assert_eq!(sequence_keys.len(), 7);
//! assert_eq!(count_shared(&sequence_keys, &query_keys), 1);
//! ```
//!
//! ## Sessions
//!
//! [`session::SearchSession`] bundles a configuration, its caches and a
//! metadata store:
//!
//! ```rust
//! use simdkmer::config::SearchConfig;
//! use simdkmer::high_freq::InMemoryMetadataStore;
//! use simdkmer::packed_sequence::encode_2bit;
//! use simdkmer::session::SearchSession;
//!
//! let config = SearchConfig {
//!     kmer_size: 4,
//!     occurrence_bits: 2,
//!     min_shared_rate: 0.5,
//!     ..SearchConfig::default()
//! };
//! let mut session = SearchSession::new(config, 1, 0, InMemoryMetadataStore::new()).unwrap();
//!
//! let rows = vec![
//!     (1, encode_2bit(b"ACGTACGTAC").unwrap()),
//!     (2, encode_2bit(b"TTTTTTTTTT").unwrap()),
//! ];
//! let hits = session.search(rows, "ACGTACGT").unwrap();
//! assert_eq!(hits, vec![(1, 5)]);
//! ```
//!
//! ## Configuration
//!
//! [`config::SearchConfig::load`] layers `simdkmer.toml` and `SIMDKMER_*`
//! environment variables over the defaults.
//!
//! ## Logging
//!
//! The library emits `tracing` events (kernel selection, cache loads and
//! invalidations, slow-path lookups). Install any subscriber to see them.
//!
//! See [`packed_sequence`], [`kmer_extractor`], [`matcher`], [`high_freq`],
//! [`session`] and [`serialization`] for the complete API.

pub mod analysis;
pub mod config;
pub mod dispatch;
pub mod dna_simd_encoder;
pub mod error;
pub mod high_freq;
pub mod iupac;
pub mod key;
pub mod kmer_extractor;
pub mod matcher;
pub mod min_score_cache;
pub mod occurrence;
pub mod packed_sequence;
pub mod pattern_cache;
pub mod serialization;
pub mod session;

pub use config::{CacheConfig, SearchConfig};
pub use error::{Error, ErrorKind, Result};
pub use high_freq::{HighFreqCacheKey, InMemoryMetadataStore, MetadataStore};
pub use key::{KeyLayout, KeyWidth};
pub use kmer_extractor::KmerExtractor;
pub use matcher::count_shared;
pub use packed_sequence::{Alphabet, PackedSequence};
pub use session::SearchSession;
