// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Query extraction fuzzing.
//!
//! Arbitrary query text must either fail cleanly or produce exactly the keys
//! the packed 4-bit path produces for the same text.

#![no_main]

use libfuzzer_sys::fuzz_target;
use simdkmer::key::KeyLayout;
use simdkmer::kmer_extractor::KmerExtractor;
use simdkmer::packed_sequence::encode_4bit;
use simdkmer::{ErrorKind, count_shared};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, text)) = data.split_first() else {
        return;
    };
    let kmer_size = 4 + usize::from(selector % 16);
    let occurrence_bits = u32::from(selector >> 4);
    let Ok(layout) = KeyLayout::new(kmer_size, occurrence_bits) else {
        return;
    };
    let extractor = KmerExtractor::new(layout);

    match extractor.extract_query(text) {
        Ok(keys) => {
            let packed = encode_4bit(text).unwrap();
            assert_eq!(extractor.extract(&packed), keys);
            assert_eq!(count_shared(&keys, &keys), keys.len());
            for &key in &keys {
                assert!(layout.total_bits() == 64 || key >> layout.total_bits() == 0);
            }
        }
        Err(err) => {
            assert!(matches!(
                err.kind(),
                ErrorKind::QueryTooShort | ErrorKind::InvalidCharacter
            ));
        }
    }
});
