// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Round-trip fuzzing: encode -> decode -> blob -> decode.
//!
//! Inputs the 4-bit alphabet accepts must come back normalized; inputs it
//! rejects must fail with the first offending position.

#![no_main]

use libfuzzer_sys::fuzz_target;
use simdkmer::Error;
use simdkmer::packed_sequence::{decode_2bit, decode_4bit, encode_2bit, encode_4bit};
use simdkmer::serialization::{from_blob, to_blob};

fuzz_target!(|data: &[u8]| {
    let first_invalid = data.iter().position(|&c| normalize_char(c).is_none());

    match encode_4bit(data) {
        Ok(packed) => {
            assert_eq!(first_invalid, None);
            let decoded = decode_4bit(&packed).unwrap();
            let expected: Vec<u8> = data.iter().filter_map(|&c| normalize_char(c)).collect();
            assert_eq!(decoded, expected);

            let blob = to_blob(&packed, true).unwrap();
            assert_eq!(from_blob(&blob).unwrap(), packed);
        }
        Err(Error::InvalidCharacter { position, .. }) => {
            assert_eq!(Some(position), first_invalid);
        }
        Err(other) => panic!("unexpected error: {other}"),
    }

    if let Ok(packed) = encode_2bit(data) {
        let decoded = decode_2bit(&packed).unwrap();
        assert!(decoded.iter().all(|b| b"ACGT".contains(b)));
        assert_eq!(decoded.len(), data.len());
    }
});

/// Expected decoded form of a 4-bit symbol, or `None` if it is not one.
#[inline]
fn normalize_char(c: u8) -> Option<u8> {
    match c.to_ascii_uppercase() {
        b'U' => Some(b'T'),
        upper @ (b'A' | b'C' | b'G' | b'T' | b'R' | b'Y' | b'S' | b'W' | b'K' | b'M' | b'B'
        | b'D' | b'H' | b'V' | b'N') => Some(upper),
        _ => None,
    }
}
