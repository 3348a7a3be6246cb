// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Property-based tests for the codec, dispatch, matcher and filter.

use proptest::prelude::*;
use simdkmer::dispatch::{codec_kernels, match_kernels};
use simdkmer::high_freq::filter_keys;
use simdkmer::key::KeyLayout;
use simdkmer::kmer_extractor::KmerExtractor;
use simdkmer::matcher::{count_shared, count_shared_hashed, count_shared_linear};
use simdkmer::packed_sequence::{decode_2bit, decode_4bit, encode_2bit, encode_4bit};

const TWO_BIT_SYMBOLS: &[u8] = b"ACGTUacgtu";
const FOUR_BIT_SYMBOLS: &[u8] = b"ACGTURYSWKMBDHVNacgturyswkmbdhvn";

fn text(symbols: &'static [u8], max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(proptest::sample::select(symbols), 0..max_len)
}

fn normalize(text: &[u8]) -> Vec<u8> {
    text.iter()
        .map(|b| match b.to_ascii_uppercase() {
            b'U' => b'T',
            other => other,
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_2bit_roundtrip(input in text(TWO_BIT_SYMBOLS, 300)) {
        let packed = encode_2bit(&input).unwrap();
        prop_assert_eq!(packed.len(), input.len());
        prop_assert_eq!(decode_2bit(&packed).unwrap(), normalize(&input));
    }

    #[test]
    fn prop_4bit_roundtrip(input in text(FOUR_BIT_SYMBOLS, 300)) {
        let packed = encode_4bit(&input).unwrap();
        prop_assert_eq!(decode_4bit(&packed).unwrap(), normalize(&input));
    }

    #[test]
    fn prop_every_codec_kernel_matches_scalar(
        clean in text(TWO_BIT_SYMBOLS, 200),
        iupac in text(FOUR_BIT_SYMBOLS, 200),
        noisy in proptest::collection::vec(any::<u8>(), 0..200),
    ) {
        let kernels = codec_kernels();
        let scalar = kernels[kernels.len() - 1];
        for kernel in kernels {
            let expected = scalar.encode_2bit(&clean).unwrap();
            prop_assert_eq!(kernel.encode_2bit(&clean).unwrap(), expected.clone(), "{}", kernel.name());
            prop_assert_eq!(
                kernel.decode_2bit(&expected, clean.len()).unwrap(),
                scalar.decode_2bit(&expected, clean.len()).unwrap(),
                "{}", kernel.name()
            );

            let expected = scalar.encode_4bit(&iupac).unwrap();
            prop_assert_eq!(kernel.encode_4bit(&iupac).unwrap(), expected.clone(), "{}", kernel.name());
            prop_assert_eq!(
                kernel.decode_4bit(&expected, iupac.len()).unwrap(),
                scalar.decode_4bit(&expected, iupac.len()).unwrap(),
                "{}", kernel.name()
            );

            // Arbitrary bytes: same verdict, and the same error when rejected.
            prop_assert_eq!(
                kernel.encode_4bit(&noisy).map_err(|e| e.to_string()),
                scalar.encode_4bit(&noisy).map_err(|e| e.to_string()),
                "{}", kernel.name()
            );
        }
    }

    #[test]
    fn prop_matcher_paths_agree(
        sequence in proptest::collection::vec(0u64..64, 0..40),
        query in proptest::collection::vec(0u64..64, 0..40),
    ) {
        let hashed = count_shared_hashed(&sequence, &query);
        prop_assert_eq!(count_shared_linear(&sequence, &query), hashed);
        prop_assert_eq!(count_shared(&sequence, &query), hashed);
        for kernel in match_kernels() {
            prop_assert_eq!(kernel.count_shared(&sequence, &query), hashed, "{}", kernel.name());
        }
    }

    #[test]
    fn prop_filter_is_idempotent(
        keys in proptest::collection::vec(any::<u16>(), 0..100),
        modulus in 2u64..7,
    ) {
        let layout = KeyLayout::new(4, 2).unwrap();
        let keys: Vec<u64> = keys.into_iter().map(|k| u64::from(k) & 0x3FF).collect();
        let high = |kmer: u64| kmer % modulus == 0;

        let (once, _) = filter_keys(&keys, layout, high);
        let (twice, removed) = filter_keys(&once, layout, high);
        prop_assert_eq!(&twice, &once);
        prop_assert_eq!(removed, 0);
    }

    #[test]
    fn prop_query_matches_4bit_extraction(input in text(FOUR_BIT_SYMBOLS, 60)) {
        prop_assume!(input.len() >= 4);
        let extractor = KmerExtractor::new(KeyLayout::new(4, 3).unwrap());
        let from_text = extractor.extract_query(&input).unwrap();
        let from_packed = extractor.extract(&encode_4bit(&input).unwrap());
        prop_assert_eq!(from_text, from_packed);
    }

    #[test]
    fn prop_self_match_counts_every_key(input in text(b"ACGT", 120)) {
        prop_assume!(input.len() >= 8);
        let extractor = KmerExtractor::new(KeyLayout::new(8, 8).unwrap());
        let keys = extractor.extract(&encode_2bit(&input).unwrap());
        prop_assert_eq!(keys.len(), input.len() - 7);
        prop_assert_eq!(count_shared(&keys, &keys), keys.len());
    }
}
