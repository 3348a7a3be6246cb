// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! SIMD vs scalar equivalence fuzzing.
//!
//! Every codec and membership kernel the CPU supports must agree with the
//! scalar kernel byte for byte, including on rejected input.

#![no_main]

use libfuzzer_sys::fuzz_target;
use simdkmer::dispatch::{codec_kernels, match_kernels};

fuzz_target!(|data: &[u8]| {
    let codecs = codec_kernels();
    let scalar = codecs[codecs.len() - 1];

    let scalar_2bit = scalar.encode_2bit(data).map_err(|e| e.to_string());
    let scalar_4bit = scalar.encode_4bit(data).map_err(|e| e.to_string());

    for kernel in codecs {
        assert_eq!(
            kernel.encode_2bit(data).map_err(|e| e.to_string()),
            scalar_2bit,
            "2-bit encode mismatch in {}",
            kernel.name()
        );
        assert_eq!(
            kernel.encode_4bit(data).map_err(|e| e.to_string()),
            scalar_4bit,
            "4-bit encode mismatch in {}",
            kernel.name()
        );

        // Raw bytes as packed data: decoders must agree on output or error.
        let bases = data.len() * 2;
        assert_eq!(
            kernel.decode_4bit(data, bases).map_err(|e| e.to_string()),
            scalar.decode_4bit(data, bases).map_err(|e| e.to_string()),
            "4-bit decode mismatch in {}",
            kernel.name()
        );
        let bases = data.len() * 4;
        assert_eq!(
            kernel.decode_2bit(data, bases).map_err(|e| e.to_string()),
            scalar.decode_2bit(data, bases).map_err(|e| e.to_string()),
            "2-bit decode mismatch in {}",
            kernel.name()
        );
    }

    // Reinterpret the input as two key arrays.
    let keys: Vec<u64> = data.iter().map(|&b| u64::from(b % 32)).collect();
    let (sequence, query) = keys.split_at(keys.len() / 2);
    let matchers = match_kernels();
    let expected = matchers[matchers.len() - 1].count_shared(sequence, query);
    for kernel in matchers {
        assert_eq!(
            kernel.count_shared(sequence, query),
            expected,
            "count mismatch in {}",
            kernel.name()
        );
    }
});
