// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! # Nucleotide Symbol Table
//!
//! One table describes every accepted symbol. The 4-bit code of a symbol is
//! the bitmask of concrete bases it stands for, so the codec, the
//! sequence-side k-mer expansion and the query-side expansion all read the
//! same data:
//!
//! | Code | Bases   | Mask   | Code | Bases   | Mask   |
//! |------|---------|--------|------|---------|--------|
//! | A    | A       | 0b0001 | K    | G,T     | 0b1100 |
//! | C    | C       | 0b0010 | M    | A,C     | 0b0011 |
//! | G    | G       | 0b0100 | B    | C,G,T   | 0b1110 |
//! | T/U  | T       | 0b1000 | D    | A,G,T   | 0b1101 |
//! | R    | A,G     | 0b0101 | H    | A,C,T   | 0b1011 |
//! | Y    | C,T     | 0b1010 | V    | A,C,G   | 0b0111 |
//! | S    | C,G     | 0b0110 | N    | A,C,G,T | 0b1111 |
//! | W    | A,T     | 0b1001 |      |         |        |
//!
//! Mask `0` is never produced by the encoder and marks invalid data.
//!
//! The 2-bit code of a concrete base is the index of its mask bit:
//! A=0b00, C=0b01, G=0b10, T=0b11.

/// 2-bit codes for the concrete bases.
pub mod encoding_2bit {
    /// Adenine: binary 00
    pub const A: u8 = 0b00;
    /// Cytosine: binary 01
    pub const C: u8 = 0b01;
    /// Guanine: binary 10
    pub const G: u8 = 0b10;
    /// Thymine (and uracil): binary 11
    pub const T: u8 = 0b11;
    /// Mask for extracting a 2-bit value
    pub const MASK: u8 = 0b11;
}

/// 4-bit base masks for every IUPAC symbol.
pub mod encoding_4bit {
    pub const A: u8 = 0b0001;
    pub const C: u8 = 0b0010;
    pub const G: u8 = 0b0100;
    pub const T: u8 = 0b1000;
    pub const M: u8 = A | C;
    pub const R: u8 = A | G;
    pub const W: u8 = A | T;
    pub const S: u8 = C | G;
    pub const Y: u8 = C | T;
    pub const K: u8 = G | T;
    pub const V: u8 = A | C | G;
    pub const H: u8 = A | C | T;
    pub const D: u8 = A | G | T;
    pub const B: u8 = C | G | T;
    pub const N: u8 = A | C | G | T;
    /// Marks an invalid symbol or corrupt packed data.
    pub const INVALID: u8 = 0;
}

pub(crate) const MASK_TABLE: [u8; 256] = {
    use encoding_4bit as e;
    let mut table = [e::INVALID; 256];
    let pairs: [(u8, u8); 16] = [
        (b'A', e::A),
        (b'C', e::C),
        (b'G', e::G),
        (b'T', e::T),
        (b'U', e::T),
        (b'M', e::M),
        (b'R', e::R),
        (b'W', e::W),
        (b'S', e::S),
        (b'Y', e::Y),
        (b'K', e::K),
        (b'V', e::V),
        (b'H', e::H),
        (b'D', e::D),
        (b'B', e::B),
        (b'N', e::N),
    ];
    let mut i = 0;
    while i < pairs.len() {
        let (upper, mask) = pairs[i];
        table[upper as usize] = mask;
        table[upper.to_ascii_lowercase() as usize] = mask;
        i += 1;
    }
    table
};

/// ASCII → 4-bit base mask. Case-insensitive, `U` aliases `T`, 0 = invalid.
pub(crate) static ASCII_TO_MASK: [u8; 256] = MASK_TABLE;

/// ASCII → 2-bit code for concrete bases. 0xFF = not a concrete base.
pub(crate) static ASCII_TO_2BIT: [u8; 256] = {
    let mut table = [0xFFu8; 256];
    let mut i = 0;
    while i < 256 {
        let mask = MASK_TABLE[i];
        if mask.count_ones() == 1 {
            table[i] = mask.trailing_zeros() as u8;
        }
        i += 1;
    }
    table
};

/// 4-bit base mask → canonical uppercase symbol. Index 0 maps to 0.
pub(crate) static MASK_TO_ASCII: [u8; 16] = [
    0, b'A', b'C', b'M', b'G', b'R', b'S', b'V', b'T', b'W', b'Y', b'H', b'K', b'D', b'B', b'N',
];

/// 2-bit code → uppercase base.
pub(crate) static CODE_TO_ASCII: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Returns the 4-bit base mask for an ASCII symbol, or `None` if invalid.
#[inline]
pub fn mask_of(symbol: u8) -> Option<u8> {
    match ASCII_TO_MASK[symbol as usize] {
        encoding_4bit::INVALID => None,
        mask => Some(mask),
    }
}

/// Returns the 2-bit code for a concrete base symbol, or `None`.
#[inline]
pub fn code_of(symbol: u8) -> Option<u8> {
    match ASCII_TO_2BIT[symbol as usize] {
        0xFF => None,
        code => Some(code),
    }
}

/// Number of concrete bases a mask stands for (0 for invalid, 4 for `N`).
#[inline]
pub const fn weight(mask: u8) -> u32 {
    (mask & 0x0F).count_ones()
}

/// Iterates the 2-bit codes of the bases in `mask`, ascending (A, C, G, T).
#[inline]
pub fn expand(mask: u8) -> impl Iterator<Item = u8> {
    (0u8..4).filter(move |code| mask & (1 << code) != 0)
}

/// Classification of one symbol for the degeneracy limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degeneracy {
    /// One concrete base.
    Concrete,
    /// Two or three bases; at most one of these is allowed per window.
    Ambiguous,
    /// `N` or invalid; the window can never be expanded.
    Forbidden,
}

/// Classifies a mask for the degeneracy limit.
#[inline]
pub const fn degeneracy(mask: u8) -> Degeneracy {
    match weight(mask) {
        1 => Degeneracy::Concrete,
        2 | 3 => Degeneracy::Ambiguous,
        _ => Degeneracy::Forbidden,
    }
}
