// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

use simdkmer::dispatch::{codec_kernel, match_kernel, simd_features_info};
use simdkmer::high_freq::InMemoryMetadataStore;
use simdkmer::packed_sequence::encode_auto;
use simdkmer::serialization::{from_blob, to_blob};
use simdkmer::{PackedSequence, Result, SearchConfig, SearchSession};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SearchConfig::load()?;
    info!(
        kmer_size = config.kmer_size,
        occurrence_bits = config.occurrence_bits,
        "configuration loaded"
    );

    let features = simd_features_info();
    println!("simdkmer k-mer search demo\n");
    println!("Architecture: {}", std::env::consts::ARCH);
    println!("Instruction set: {}", features.best_instruction_set());
    println!("Codec kernel: {}", codec_kernel().name());
    println!("Match kernel: {}", match_kernel().name());
    println!("\n{}\n", "=".repeat(80));

    let texts: [&[u8]; 6] = [
        b"ACGTACGTACGTACGTACGTACGTACGTACGT",
        b"GATCGATCGATCGATCGATCGATCGATCGATC",
        b"ACGTACGTACGTACGTNNNNACGTACGTACGT",
        b"TTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTT",
        b"ACGTACGTACGTACGTACGTACGTACGTACGA",
        b"ACGTACGTACGTACGTRYACGTACGTACGTAC",
    ];

    let mut rows: Vec<(u64, PackedSequence)> = Vec::with_capacity(texts.len());
    for (row, text) in texts.iter().enumerate() {
        let packed = encode_auto(text)?;
        let blob = to_blob(&packed, true)?;
        let restored = from_blob(&blob)?;
        println!(
            "Row {row}: {} ({} bp, {} alphabet, {} packed bytes, {} blob bytes)",
            String::from_utf8_lossy(text),
            text.len(),
            restored.alphabet(),
            restored.as_bytes().len(),
            blob.len()
        );
        rows.push((row as u64, restored));
    }

    let mut session = SearchSession::new(config, 1, 0, InMemoryMetadataStore::new())?;
    let sequences: Vec<PackedSequence> = rows.iter().map(|(_, s)| s.clone()).collect();
    let analysis = session.analyze(&[sequences])?;
    println!(
        "\nAppearance analysis: {} rows, threshold {}, {} high-frequency k-mers",
        analysis.total_rows,
        analysis.threshold,
        analysis.high_frequency.len()
    );
    session.load_high_freq_cache()?;

    let query = "ACGTACGTACGTACGTACGT";
    let hits = session.search(rows.iter().cloned(), query)?;
    println!("\nQuery: {query}");
    for (row, shared) in &hits {
        println!("  row {row}: {shared} shared keys");
    }
    if hits.is_empty() {
        println!("  no matching rows");
    }

    let stats = session.pattern_cache_stats();
    println!(
        "\nQuery-pattern cache: {} hits, {} misses",
        stats.hits, stats.misses
    );
    Ok(())
}
