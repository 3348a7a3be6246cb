// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use simdkmer::dispatch::{codec_kernels, match_kernels};
use simdkmer::high_freq::InMemoryMetadataStore;
use simdkmer::key::KeyLayout;
use simdkmer::kmer_extractor::KmerExtractor;
use simdkmer::matcher::{count_shared_hashed, count_shared_linear};
use simdkmer::packed_sequence::{encode_2bit, encode_4bit};
use simdkmer::{PackedSequence, SearchConfig, SearchSession};

/// Package version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Print benchmark header with version and timestamp
fn print_benchmark_header() {
    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let now = chrono::Utc::now();
        eprintln!("\n╔════════════════════════════════════════════════════════════╗");
        eprintln!(
            "║ simdkmer benchmark v{}                                   ║",
            VERSION
        );
        eprintln!(
            "║ Run date: {}                              ║",
            now.format("%Y-%m-%d %H:%M:%S UTC")
        );
        eprintln!("║ Platform: {:<49} ║", std::env::consts::ARCH);
        eprintln!("╚════════════════════════════════════════════════════════════╝\n");
    });
}

// ============================================================================
// Inputs
// ============================================================================

/// Deterministic pseudo-random A/C/G/T text.
fn generate_dna_sequence(len: usize) -> Vec<u8> {
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            b"ACGT"[(state >> 62) as usize]
        })
        .collect()
}

/// Same as [`generate_dna_sequence`] with an `N` or `R` every 50 bases.
fn generate_iupac_sequence(len: usize) -> Vec<u8> {
    let mut sequence = generate_dna_sequence(len);
    for (i, base) in sequence.iter_mut().enumerate() {
        if i % 50 == 25 {
            *base = if i % 100 == 25 { b'N' } else { b'R' };
        }
    }
    sequence
}

// ============================================================================
// Codec
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    print_benchmark_header();
    let mut group = c.benchmark_group("encode");

    // 15/16/17 and 31/32/33 straddle the 16- and 32-byte SIMD blocks.
    for size in [15, 16, 17, 31, 32, 33, 64, 127, 256, 1024, 4096, 10000] {
        let clean = generate_dna_sequence(size);
        let iupac = generate_iupac_sequence(size);
        group.throughput(Throughput::Bytes(size as u64));

        for kernel in codec_kernels() {
            group.bench_with_input(
                BenchmarkId::new(format!("{}_2bit", kernel.name()), size),
                &clean,
                |b, seq| b.iter(|| kernel.encode_2bit(black_box(seq))),
            );
            group.bench_with_input(
                BenchmarkId::new(format!("{}_4bit", kernel.name()), size),
                &iupac,
                |b, seq| b.iter(|| kernel.encode_4bit(black_box(seq))),
            );
        }
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for size in [15, 16, 17, 31, 32, 33, 64, 127, 256, 1024, 4096, 10000] {
        let packed_2bit = encode_2bit(&generate_dna_sequence(size)).unwrap();
        let packed_4bit = encode_4bit(&generate_iupac_sequence(size)).unwrap();
        group.throughput(Throughput::Bytes(size as u64));

        for kernel in codec_kernels() {
            group.bench_with_input(
                BenchmarkId::new(format!("{}_2bit", kernel.name()), size),
                &packed_2bit,
                |b, packed| b.iter(|| kernel.decode_2bit(black_box(packed.as_bytes()), size)),
            );
            group.bench_with_input(
                BenchmarkId::new(format!("{}_4bit", kernel.name()), size),
                &packed_4bit,
                |b, packed| b.iter(|| kernel.decode_4bit(black_box(packed.as_bytes()), size)),
            );
        }
    }

    group.finish();
}

// ============================================================================
// Extraction
// ============================================================================

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");
    let extractor = KmerExtractor::new(KeyLayout::new(16, 8).unwrap());

    for size in [64, 256, 1024, 4096] {
        let clean = generate_dna_sequence(size);
        let iupac = generate_iupac_sequence(size);
        let packed_2bit = encode_2bit(&clean).unwrap();
        let packed_4bit = encode_4bit(&iupac).unwrap();
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("sequence_2bit", size), &packed_2bit, |b, seq| {
            b.iter(|| extractor.extract(black_box(seq)))
        });
        group.bench_with_input(BenchmarkId::new("sequence_4bit", size), &packed_4bit, |b, seq| {
            b.iter(|| extractor.extract(black_box(seq)))
        });
        group.bench_with_input(BenchmarkId::new("query_text", size), &iupac, |b, text| {
            b.iter(|| extractor.extract_query(black_box(text)))
        });
    }

    group.finish();
}

// ============================================================================
// Matching
// ============================================================================

fn bench_count_shared(c: &mut Criterion) {
    let mut group = c.benchmark_group("count_shared");
    let extractor = KmerExtractor::new(KeyLayout::new(12, 4).unwrap());

    // Pair sizes on both sides of the linear-scan threshold.
    for (sequence_len, query_len) in [(16, 16), (20, 20), (64, 32), (512, 64), (4096, 256)] {
        let sequence = extractor.extract(&encode_2bit(&generate_dna_sequence(sequence_len)).unwrap());
        let query_text = generate_dna_sequence(query_len);
        let query = extractor.extract_query(&query_text).unwrap();
        let label = format!("{}x{}", sequence.len(), query.len());

        group.bench_with_input(BenchmarkId::new("hashed", &label), &(), |b, _| {
            b.iter(|| count_shared_hashed(black_box(&sequence), black_box(&query)))
        });
        if sequence.len() * query.len() <= 64 * 64 {
            group.bench_with_input(BenchmarkId::new("linear", &label), &(), |b, _| {
                b.iter(|| count_shared_linear(black_box(&sequence), black_box(&query)))
            });
            for kernel in match_kernels() {
                group.bench_with_input(
                    BenchmarkId::new(format!("kernel_{}", kernel.name()), &label),
                    &(),
                    |b, _| b.iter(|| kernel.count_shared(black_box(&sequence), black_box(&query))),
                );
            }
        }
    }

    group.finish();
}

fn bench_session_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_search");

    let rows: Vec<(u64, PackedSequence)> = (0..256)
        .map(|row| {
            let mut text = generate_dna_sequence(300 + row);
            text.rotate_left(row);
            (row as u64, encode_2bit(&text).unwrap())
        })
        .collect();
    let query = String::from_utf8(generate_dna_sequence(120)).unwrap();
    let config = SearchConfig {
        min_shared_rate: 0.1,
        ..SearchConfig::default()
    };
    let mut session = SearchSession::new(config, 1, 0, InMemoryMetadataStore::new()).unwrap();

    group.throughput(Throughput::Elements(rows.len() as u64));
    group.bench_function("256_rows", |b| {
        b.iter(|| session.search(black_box(rows.iter().cloned()), black_box(&query)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_extract,
    bench_count_shared,
    bench_session_search
);
criterion_main!(benches);
