// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! # Packed Sequences
//!
//! [`PackedSequence`] is the immutable unit the rest of the crate consumes:
//! a byte buffer, a bit length and an [`Alphabet`] tag.
//!
//! ## Invariants
//!
//! - `data.len() == ceil(bit_len / 8)`
//! - `bit_len` is a multiple of the symbol width (2 or 4)
//! - unused trailing bits of the last byte are zero
//!
//! Sequences built by [`encode`], [`encode_2bit`], [`encode_4bit`] or
//! [`encode_auto`] satisfy these by construction. [`PackedSequence::from_parts`]
//! checks them for buffers coming from outside (row sources, blobs).
//!
//! ## Usage
//!
//! ```rust
//! use simdkmer::packed_sequence::{encode_auto, Alphabet};
//!
//! let clean = encode_auto(b"ACGTACGT").unwrap();
//! assert_eq!(clean.alphabet(), Alphabet::TwoBit);
//! assert_eq!(clean.as_bytes().len(), 2);
//!
//! let dirty = encode_auto(b"ACNGT").unwrap();
//! assert_eq!(dirty.alphabet(), Alphabet::FourBit);
//! assert_eq!(dirty.decode().unwrap(), b"ACNGT");
//! ```

use std::fmt;

use crate::dispatch::codec_kernel;
use crate::error::{Error, Result};
use crate::iupac::code_of;

// ============================================================================
// Alphabet Discriminator
// ============================================================================

/// Symbol alphabet of a packed sequence.
///
/// The `repr(u8)` value is the tag stored in serialized blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Alphabet {
    /// A, C, G, T (U accepted on input): 2 bits per base.
    TwoBit = 0,
    /// The 15 IUPAC symbols as base masks: 4 bits per symbol.
    FourBit = 1,
}

impl Alphabet {
    /// Bits used per symbol.
    #[inline]
    pub const fn bits_per_symbol(&self) -> usize {
        match self {
            Alphabet::TwoBit => 2,
            Alphabet::FourBit => 4,
        }
    }

    /// Symbols packed into one byte.
    #[inline]
    pub const fn symbols_per_byte(&self) -> usize {
        8 / self.bits_per_symbol()
    }

    /// Creates an `Alphabet` from its tag, or `None` for unknown tags.
    ///
    /// ```rust
    /// use simdkmer::packed_sequence::Alphabet;
    ///
    /// assert_eq!(Alphabet::from_u8(0), Some(Alphabet::TwoBit));
    /// assert_eq!(Alphabet::from_u8(1), Some(Alphabet::FourBit));
    /// assert_eq!(Alphabet::from_u8(2), None);
    /// ```
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Alphabet> {
        match value {
            0 => Some(Alphabet::TwoBit),
            1 => Some(Alphabet::FourBit),
            _ => None,
        }
    }
}

impl fmt::Display for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alphabet::TwoBit => write!(f, "2-bit"),
            Alphabet::FourBit => write!(f, "4-bit (IUPAC)"),
        }
    }
}

impl From<Alphabet> for u8 {
    #[inline]
    fn from(alphabet: Alphabet) -> u8 {
        alphabet as u8
    }
}

// ============================================================================
// Packed Sequence
// ============================================================================

/// An immutable packed nucleotide sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackedSequence {
    alphabet: Alphabet,
    bit_len: usize,
    data: Vec<u8>,
}

impl PackedSequence {
    /// Wraps an externally produced buffer after checking the invariants.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptSequence`] if the buffer size, bit length or padding
    /// are inconsistent.
    pub fn from_parts(alphabet: Alphabet, bit_len: usize, data: Vec<u8>) -> Result<Self> {
        let width = alphabet.bits_per_symbol();
        if bit_len % width != 0 {
            return Err(Error::CorruptSequence(format!(
                "bit length {bit_len} is not a multiple of {width}"
            )));
        }
        if data.len() != bit_len.div_ceil(8) {
            return Err(Error::CorruptSequence(format!(
                "bit length {bit_len} needs {} bytes, buffer has {}",
                bit_len.div_ceil(8),
                data.len()
            )));
        }
        let tail_bits = bit_len % 8;
        if tail_bits != 0 {
            let padding = data[data.len() - 1] & (0xFF >> tail_bits);
            if padding != 0 {
                return Err(Error::CorruptSequence(format!(
                    "non-zero padding bits {padding:#04X}"
                )));
            }
        }
        Ok(Self {
            alphabet,
            bit_len,
            data,
        })
    }

    #[inline]
    pub fn alphabet(&self) -> Alphabet {
        self.alphabet
    }

    /// Number of meaningful bits.
    #[inline]
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Number of symbols (bases).
    #[inline]
    pub fn len(&self) -> usize {
        self.bit_len / self.alphabet.bits_per_symbol()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bit_len == 0
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Raw symbol at `index`: the 2-bit code or the 4-bit base mask.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    #[inline]
    pub fn symbol(&self, index: usize) -> u8 {
        assert!(index < self.len(), "symbol index {index} out of range");
        match self.alphabet {
            Alphabet::TwoBit => (self.data[index / 4] >> (6 - (index % 4) * 2)) & 0b11,
            Alphabet::FourBit => (self.data[index / 2] >> (4 - (index % 2) * 4)) & 0x0F,
        }
    }

    /// Unpacks to uppercase ASCII.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptSequence`] if a 4-bit symbol is zero.
    pub fn decode(&self) -> Result<Vec<u8>> {
        let kernel = codec_kernel();
        match self.alphabet {
            Alphabet::TwoBit => kernel.decode_2bit(&self.data, self.len()),
            Alphabet::FourBit => kernel.decode_4bit(&self.data, self.len()),
        }
    }
}

// ============================================================================
// Codec Entry Points
// ============================================================================

/// Packs `text` with the chosen alphabet using the dispatched kernel.
///
/// # Errors
///
/// [`Error::InvalidCharacter`] for the first character outside the alphabet.
pub fn encode(text: &[u8], alphabet: Alphabet) -> Result<PackedSequence> {
    let kernel = codec_kernel();
    let data = match alphabet {
        Alphabet::TwoBit => kernel.encode_2bit(text)?,
        Alphabet::FourBit => kernel.encode_4bit(text)?,
    };
    Ok(PackedSequence {
        alphabet,
        bit_len: text.len() * alphabet.bits_per_symbol(),
        data,
    })
}

/// Packs `text` with the 2-bit alphabet.
///
/// ```rust
/// use simdkmer::packed_sequence::encode_2bit;
///
/// let packed = encode_2bit(b"ACGT").unwrap();
/// assert_eq!(packed.as_bytes(), &[0x1B]);
/// assert!(encode_2bit(b"ACGN").is_err());
/// ```
pub fn encode_2bit(text: &[u8]) -> Result<PackedSequence> {
    encode(text, Alphabet::TwoBit)
}

/// Packs `text` with the 4-bit IUPAC alphabet.
pub fn encode_4bit(text: &[u8]) -> Result<PackedSequence> {
    encode(text, Alphabet::FourBit)
}

/// Packs clean A/C/G/T/U text with 2 bits and anything else with 4 bits.
///
/// # Errors
///
/// [`Error::InvalidCharacter`] if `text` is not valid for the 4-bit alphabet either.
pub fn encode_auto(text: &[u8]) -> Result<PackedSequence> {
    if text.iter().all(|&b| code_of(b).is_some()) {
        encode_2bit(text)
    } else {
        encode_4bit(text)
    }
}

/// Unpacks a 2-bit sequence.
///
/// # Errors
///
/// [`Error::InvalidParameter`] if `sequence` uses the 4-bit alphabet.
pub fn decode_2bit(sequence: &PackedSequence) -> Result<Vec<u8>> {
    expect_alphabet(sequence, Alphabet::TwoBit)?;
    sequence.decode()
}

/// Unpacks a 4-bit sequence.
///
/// # Errors
///
/// [`Error::InvalidParameter`] on alphabet mismatch, [`Error::CorruptSequence`]
/// on zero symbols.
pub fn decode_4bit(sequence: &PackedSequence) -> Result<Vec<u8>> {
    expect_alphabet(sequence, Alphabet::FourBit)?;
    sequence.decode()
}

fn expect_alphabet(sequence: &PackedSequence, expected: Alphabet) -> Result<()> {
    if sequence.alphabet != expected {
        return Err(Error::InvalidParameter(format!(
            "expected a {expected} sequence, got {}",
            sequence.alphabet
        )));
    }
    Ok(())
}
