// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Occurrence-aware key layout.
//!
//! A key packs a k-mer and its occurrence index into one integer:
//!
//! ```text
//! [ k-mer: 2*k bits, first base most significant ][ occurrence: occurrence_bits ]
//! ```
//!
//! Keys are handled as `u64` internally. [`KeyWidth`] is the narrowest
//! unsigned width that holds `total_bits`, used only when key arrays are
//! serialized.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Smallest supported k-mer size.
pub const MIN_KMER_SIZE: usize = 4;
/// Largest supported k-mer size (one `u64` of 2-bit bases).
pub const MAX_KMER_SIZE: usize = 32;
/// Largest supported occurrence field width.
pub const MAX_OCCURRENCE_BITS: u32 = 16;

/// Storage width of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum KeyWidth {
    U16 = 2,
    U32 = 4,
    U64 = 8,
}

impl KeyWidth {
    /// Narrowest width holding `total_bits`, or `None` above 64.
    pub const fn for_bits(total_bits: u32) -> Option<KeyWidth> {
        match total_bits {
            0..=16 => Some(KeyWidth::U16),
            17..=32 => Some(KeyWidth::U32),
            33..=64 => Some(KeyWidth::U64),
            _ => None,
        }
    }

    #[inline]
    pub const fn bytes(&self) -> usize {
        *self as usize
    }

    #[inline]
    pub const fn bits(&self) -> u32 {
        (*self as u32) * 8
    }

    pub const fn from_u8(value: u8) -> Option<KeyWidth> {
        match value {
            2 => Some(KeyWidth::U16),
            4 => Some(KeyWidth::U32),
            8 => Some(KeyWidth::U64),
            _ => None,
        }
    }
}

impl fmt::Display for KeyWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.bits())
    }
}

/// Validated `(kmer_size, occurrence_bits)` pair.
///
/// ```rust
/// use simdkmer::key::{KeyLayout, KeyWidth};
///
/// let layout = KeyLayout::new(4, 2).unwrap();
/// assert_eq!(layout.total_bits(), 10);
/// assert_eq!(layout.width(), KeyWidth::U16);
///
/// let key = layout.compose(0b00_01_10_11, 1); // ACGT, second occurrence
/// assert_eq!(layout.kmer_of(key), 0b00_01_10_11);
/// assert_eq!(layout.occurrence_of(key), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyLayout {
    kmer_size: usize,
    occurrence_bits: u32,
}

impl KeyLayout {
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if `kmer_size` is outside 4..=32,
    /// `occurrence_bits` above 16, or the key would exceed 64 bits.
    pub fn new(kmer_size: usize, occurrence_bits: u32) -> Result<Self> {
        if !(MIN_KMER_SIZE..=MAX_KMER_SIZE).contains(&kmer_size) {
            return Err(Error::InvalidParameter(format!(
                "kmer_size {kmer_size} outside {MIN_KMER_SIZE}..={MAX_KMER_SIZE}"
            )));
        }
        if occurrence_bits > MAX_OCCURRENCE_BITS {
            return Err(Error::InvalidParameter(format!(
                "occurrence_bits {occurrence_bits} outside 0..={MAX_OCCURRENCE_BITS}"
            )));
        }
        let total = kmer_size as u32 * 2 + occurrence_bits;
        if total > 64 {
            return Err(Error::InvalidParameter(format!(
                "kmer_size {kmer_size} with occurrence_bits {occurrence_bits} needs {total} bits (max 64)"
            )));
        }
        Ok(Self {
            kmer_size,
            occurrence_bits,
        })
    }

    #[inline]
    pub const fn kmer_size(&self) -> usize {
        self.kmer_size
    }

    #[inline]
    pub const fn occurrence_bits(&self) -> u32 {
        self.occurrence_bits
    }

    #[inline]
    pub const fn total_bits(&self) -> u32 {
        self.kmer_size as u32 * 2 + self.occurrence_bits
    }

    #[inline]
    pub const fn width(&self) -> KeyWidth {
        match KeyWidth::for_bits(self.total_bits()) {
            Some(width) => width,
            None => KeyWidth::U64,
        }
    }

    /// Mask covering the `2*k` k-mer bits (before shifting into place).
    #[inline]
    pub const fn kmer_mask(&self) -> u64 {
        u64::MAX >> (64 - 2 * self.kmer_size as u32)
    }

    /// Number of occurrences of one k-mer that fit in the occurrence field.
    #[inline]
    pub const fn max_occurrences(&self) -> u64 {
        1u64 << self.occurrence_bits
    }

    /// Builds a key from a raw k-mer value and a zero-based occurrence index.
    ///
    /// The caller guarantees `occurrence < max_occurrences()`.
    #[inline]
    pub const fn compose(&self, kmer: u64, occurrence: u64) -> u64 {
        (kmer << self.occurrence_bits) | occurrence
    }

    /// Builds a key from a 1-based running count, or `None` if the count
    /// does not fit the occurrence field.
    #[inline]
    pub const fn key_for_count(&self, kmer: u64, count: u64) -> Option<u64> {
        if count == 0 || count > self.max_occurrences() {
            None
        } else {
            Some(self.compose(kmer, count - 1))
        }
    }

    /// Raw k-mer value of a key (occurrence stripped).
    #[inline]
    pub const fn kmer_of(&self, key: u64) -> u64 {
        key >> self.occurrence_bits
    }

    #[inline]
    pub const fn occurrence_of(&self, key: u64) -> u64 {
        key & (self.max_occurrences() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_selection() {
        assert_eq!(KeyWidth::for_bits(16), Some(KeyWidth::U16));
        assert_eq!(KeyWidth::for_bits(17), Some(KeyWidth::U32));
        assert_eq!(KeyWidth::for_bits(64), Some(KeyWidth::U64));
        assert_eq!(KeyWidth::for_bits(65), None);

        assert_eq!(KeyLayout::new(4, 8).unwrap().width(), KeyWidth::U16);
        assert_eq!(KeyLayout::new(12, 8).unwrap().width(), KeyWidth::U32);
        assert_eq!(KeyLayout::new(16, 8).unwrap().width(), KeyWidth::U64);
        assert_eq!(KeyLayout::new(32, 0).unwrap().width(), KeyWidth::U64);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(KeyLayout::new(3, 0).is_err());
        assert!(KeyLayout::new(33, 0).is_err());
        assert!(KeyLayout::new(8, 17).is_err());
        // 2*30 + 8 = 68 bits.
        assert!(KeyLayout::new(30, 8).is_err());
        assert!(KeyLayout::new(28, 8).is_ok());
    }

    #[test]
    fn test_compose_and_split() {
        let layout = KeyLayout::new(16, 8).unwrap();
        let kmer = 0xDEAD_BEEF;
        let key = layout.compose(kmer, 7);
        assert_eq!(layout.kmer_of(key), kmer);
        assert_eq!(layout.occurrence_of(key), 7);
    }

    #[test]
    fn test_key_for_count_limits() {
        let layout = KeyLayout::new(4, 2).unwrap();
        assert_eq!(layout.max_occurrences(), 4);
        assert_eq!(layout.key_for_count(5, 1), Some(5 << 2));
        assert_eq!(layout.key_for_count(5, 4), Some((5 << 2) | 3));
        assert_eq!(layout.key_for_count(5, 5), None);

        let single = KeyLayout::new(4, 0).unwrap();
        assert_eq!(single.key_for_count(5, 1), Some(5));
        assert_eq!(single.key_for_count(5, 2), None);
    }

    #[test]
    fn test_kmer_mask_full_width() {
        assert_eq!(KeyLayout::new(32, 0).unwrap().kmer_mask(), u64::MAX);
        assert_eq!(KeyLayout::new(4, 0).unwrap().kmer_mask(), 0xFF);
    }
}
