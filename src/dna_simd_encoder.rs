// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! # DNA SIMD Codec Kernels
//!
//! Packing and unpacking of nucleotide text into 2-bit and 4-bit bit arrays,
//! implemented once in scalar code and again with SIMD instructions.
//!
//! ## Encoding Schemes
//!
//! ### 2-bit (A, C, G, T/U)
//!
//! Four bases per byte, first base in the most significant bits:
//!
//! ```text
//! Byte layout: [B0:7-6][B1:5-4][B2:3-2][B3:1-0]
//! ```
//!
//! ### 4-bit (IUPAC)
//!
//! Two symbols per byte, first symbol in the high nibble. The nibble is the
//! base mask from [`crate::iupac`] (`A=0x1`, `C=0x2`, `G=0x4`, `T=0x8`,
//! `M=A|C=0x3`, ..., `N=0xF`). A zero nibble never comes out of the encoder.
//!
//! ## Kernels
//!
//! Each implementation is a [`CodecKernel`], a table of four function
//! pointers sharing one signature set:
//!
//! - **scalar**: always available, the reference implementation
//! - **ssse3** (x86_64): `pshufb` table lookups, `pmaddubsw` packing, 16 bases per step
//! - **avx2** (x86_64): the same scheme over 32 bases per step
//! - **neon** (aarch64): `tbl` lookups, 16 bases per step
//!
//! All kernels produce byte-identical output for identical input, and report
//! the same position for the first invalid character. Which kernel runs is
//! decided once per process by [`crate::dispatch`].
//!
//! ## Validation
//!
//! Encoding never substitutes characters: the first byte outside the
//! alphabet aborts the call with [`Error::InvalidCharacter`]. Matching is
//! case-insensitive and `U` is accepted as `T`.
//!
//! ## Thread Safety
//!
//! Kernels are pure functions over caller-provided buffers and can be used
//! from any number of threads.

// Allow unsafe operations in unsafe functions (Rust 2024 compatibility)
#![allow(unsafe_op_in_unsafe_fn)]

use crate::error::{Error, Result};
use crate::iupac::{ASCII_TO_2BIT, ASCII_TO_MASK, CODE_TO_ASCII, MASK_TABLE, MASK_TO_ASCII};

/// Encoder kernel: writes packed bytes, or returns the position of the first invalid byte.
pub(crate) type EncodeFn = fn(&[u8], &mut [u8]) -> std::result::Result<(), usize>;

/// 2-bit decoder kernel: `(packed, bases, output)`.
pub(crate) type Decode2Fn = fn(&[u8], usize, &mut [u8]);

/// 4-bit decoder kernel: returns the position of the first zero nibble on failure.
pub(crate) type Decode4Fn = fn(&[u8], usize, &mut [u8]) -> std::result::Result<(), usize>;

/// One complete codec implementation.
///
/// Obtain kernels through [`crate::dispatch::codec_kernel`] (the best one
/// for this CPU) or [`crate::dispatch::codec_kernels`] (every one this CPU
/// can run, best first, scalar last).
///
/// # Examples
///
/// ```rust
/// use simdkmer::dispatch::codec_kernels;
///
/// for kernel in codec_kernels() {
///     assert_eq!(kernel.encode_2bit(b"ACGT").unwrap(), vec![0x1B]);
/// }
/// ```
#[derive(Debug)]
pub struct CodecKernel {
    name: &'static str,
    encode_2bit: EncodeFn,
    encode_4bit: EncodeFn,
    decode_2bit: Decode2Fn,
    decode_4bit: Decode4Fn,
}

impl CodecKernel {
    /// Short name of the instruction set (`"scalar"`, `"ssse3"`, `"avx2"`, `"neon"`).
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Packs `text` with the 2-bit alphabet.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCharacter`] for the first byte that is not A, C, G, T or U.
    pub fn encode_2bit(&self, text: &[u8]) -> Result<Vec<u8>> {
        let mut output = vec![0u8; text.len().div_ceil(4)];
        (self.encode_2bit)(text, &mut output)
            .map_err(|position| Error::invalid_byte(text[position], position))?;
        Ok(output)
    }

    /// Packs `text` with the 4-bit IUPAC alphabet.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCharacter`] for the first byte that is not an IUPAC base code.
    pub fn encode_4bit(&self, text: &[u8]) -> Result<Vec<u8>> {
        let mut output = vec![0u8; text.len().div_ceil(2)];
        (self.encode_4bit)(text, &mut output)
            .map_err(|position| Error::invalid_byte(text[position], position))?;
        Ok(output)
    }

    /// Unpacks `bases` 2-bit symbols into uppercase ASCII.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptSequence`] if `packed` holds fewer than `bases` symbols.
    pub fn decode_2bit(&self, packed: &[u8], bases: usize) -> Result<Vec<u8>> {
        check_capacity(packed, bases.div_ceil(4), bases)?;
        let mut output = vec![0u8; bases];
        (self.decode_2bit)(packed, bases, &mut output);
        Ok(output)
    }

    /// Unpacks `bases` 4-bit symbols into uppercase ASCII.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptSequence`] if `packed` is too short or contains a zero nibble.
    pub fn decode_4bit(&self, packed: &[u8], bases: usize) -> Result<Vec<u8>> {
        check_capacity(packed, bases.div_ceil(2), bases)?;
        let mut output = vec![0u8; bases];
        (self.decode_4bit)(packed, bases, &mut output).map_err(|position| {
            Error::CorruptSequence(format!("zero nibble at symbol {position}"))
        })?;
        Ok(output)
    }
}

fn check_capacity(packed: &[u8], needed: usize, bases: usize) -> Result<()> {
    if packed.len() < needed {
        return Err(Error::CorruptSequence(format!(
            "{} bytes cannot hold {bases} symbols (need {needed})",
            packed.len()
        )));
    }
    Ok(())
}

// ============================================================================
// Shared Lookup Rows
// ============================================================================
//
// The SIMD encoders clear the ASCII case bit (`& 0xDF`), then look up the low
// nibble in one of two 16-entry rows selected by the high nibble (0x4_ or
// 0x5_). Every valid symbol is a letter, so anything else lands on a zero
// entry. The 2-bit rows store `code + 1` so that zero still means invalid.

const fn letter_row(row: usize, two_bit: bool) -> [u8; 16] {
    let mut out = [0u8; 16];
    let mut i = 0;
    while i < 16 {
        let mask = MASK_TABLE[row * 16 + i];
        out[i] = if !two_bit {
            mask
        } else if mask.count_ones() == 1 {
            mask.trailing_zeros() as u8 + 1
        } else {
            0
        };
        i += 1;
    }
    out
}

#[cfg_attr(not(any(target_arch = "x86_64", target_arch = "aarch64")), allow(dead_code))]
static ENCODE_2BIT_ROWS: [[u8; 16]; 2] = [letter_row(4, true), letter_row(5, true)];

#[cfg_attr(not(any(target_arch = "x86_64", target_arch = "aarch64")), allow(dead_code))]
static ENCODE_4BIT_ROWS: [[u8; 16]; 2] = [letter_row(4, false), letter_row(5, false)];

/// Decoder row for 2-bit fields isolated in place: a field at bits 7-6 or 3-2
/// shows up as `code << 2`, a field at bits 5-4 or 1-0 as `code`.
#[cfg_attr(not(target_arch = "x86_64"), allow(dead_code))]
static DECODE_2BIT_FIELDS: [u8; 16] = [
    b'A', b'C', b'G', b'T', b'C', 0, 0, 0, b'G', 0, 0, 0, b'T', 0, 0, 0,
];

// ============================================================================
// Scalar Implementation
// ============================================================================

pub(crate) static SCALAR: CodecKernel = CodecKernel {
    name: "scalar",
    encode_2bit: encode_2bit_scalar,
    encode_4bit: encode_4bit_scalar,
    decode_2bit: decode_2bit_scalar,
    decode_4bit: decode_4bit_scalar,
};

/// Scalar 2-bit encoding.
///
/// Processes 4 bases per output byte, then a zero-padded partial byte.
fn encode_2bit_scalar(sequence: &[u8], output: &mut [u8]) -> std::result::Result<(), usize> {
    for (i, chunk) in sequence.chunks(4).enumerate() {
        let mut packed = 0u8;
        for (j, &byte) in chunk.iter().enumerate() {
            let code = ASCII_TO_2BIT[byte as usize];
            if code == 0xFF {
                return Err(i * 4 + j);
            }
            packed |= code << (6 - j * 2);
        }
        output[i] = packed;
    }
    Ok(())
}

/// Scalar 4-bit encoding. An odd trailing symbol gets a zero low nibble.
fn encode_4bit_scalar(sequence: &[u8], output: &mut [u8]) -> std::result::Result<(), usize> {
    for (i, chunk) in sequence.chunks(2).enumerate() {
        let mut packed = 0u8;
        for (j, &byte) in chunk.iter().enumerate() {
            let mask = ASCII_TO_MASK[byte as usize];
            if mask == 0 {
                return Err(i * 2 + j);
            }
            packed |= mask << (4 - j * 4);
        }
        output[i] = packed;
    }
    Ok(())
}

/// Scalar 2-bit decoding of the first `bases` symbols.
fn decode_2bit_scalar(encoded: &[u8], bases: usize, output: &mut [u8]) {
    for (i, slot) in output[..bases].iter_mut().enumerate() {
        let byte = encoded[i / 4];
        let shift = 6 - (i % 4) * 2;
        *slot = CODE_TO_ASCII[((byte >> shift) & 0b11) as usize];
    }
}

/// Scalar 4-bit decoding of the first `bases` symbols.
fn decode_4bit_scalar(
    encoded: &[u8],
    bases: usize,
    output: &mut [u8],
) -> std::result::Result<(), usize> {
    for (i, slot) in output[..bases].iter_mut().enumerate() {
        let byte = encoded[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
        if nibble == 0 {
            return Err(i);
        }
        *slot = MASK_TO_ASCII[nibble as usize];
    }
    Ok(())
}

// ============================================================================
// x86 SSSE3 / AVX2 Implementation
// ============================================================================

#[cfg(target_arch = "x86_64")]
pub(crate) use x86::{AVX2, SSSE3};

#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::*;

    use super::{
        CodecKernel, DECODE_2BIT_FIELDS, ENCODE_2BIT_ROWS, ENCODE_4BIT_ROWS, decode_2bit_scalar,
        decode_4bit_scalar, encode_2bit_scalar, encode_4bit_scalar,
    };
    use crate::iupac::MASK_TO_ASCII;

    // Safety: these tables are only handed out by `dispatch` after
    // `is_x86_feature_detected!` confirmed the instruction set.
    pub(crate) static SSSE3: CodecKernel = CodecKernel {
        name: "ssse3",
        encode_2bit: |s, o| unsafe { encode_2bit_ssse3(s, o) },
        encode_4bit: |s, o| unsafe { encode_4bit_ssse3(s, o) },
        decode_2bit: |e, n, o| unsafe { decode_2bit_ssse3(e, n, o) },
        decode_4bit: |e, n, o| unsafe { decode_4bit_ssse3(e, n, o) },
    };

    pub(crate) static AVX2: CodecKernel = CodecKernel {
        name: "avx2",
        encode_2bit: |s, o| unsafe { encode_2bit_avx2(s, o) },
        encode_4bit: |s, o| unsafe { encode_4bit_avx2(s, o) },
        decode_2bit: |e, n, o| unsafe { decode_2bit_avx2(e, n, o) },
        decode_4bit: |e, n, o| unsafe { decode_4bit_avx2(e, n, o) },
    };

    /// Maps 16 ASCII bytes to `row value` (0 = invalid) using two `pshufb` rows.
    #[inline]
    #[target_feature(enable = "ssse3")]
    unsafe fn lookup_letters_128(chunk: __m128i, rows: &[[u8; 16]; 2]) -> __m128i {
        let row4 = _mm_loadu_si128(rows[0].as_ptr() as *const __m128i);
        let row5 = _mm_loadu_si128(rows[1].as_ptr() as *const __m128i);
        let nibble = _mm_set1_epi8(0x0F);

        let upper = _mm_and_si128(chunk, _mm_set1_epi8(0xDFu8 as i8));
        let lo = _mm_and_si128(upper, nibble);
        let hi = _mm_and_si128(_mm_srli_epi16(upper, 4), nibble);

        let from4 = _mm_and_si128(
            _mm_shuffle_epi8(row4, lo),
            _mm_cmpeq_epi8(hi, _mm_set1_epi8(4)),
        );
        let from5 = _mm_and_si128(
            _mm_shuffle_epi8(row5, lo),
            _mm_cmpeq_epi8(hi, _mm_set1_epi8(5)),
        );
        _mm_or_si128(from4, from5)
    }

    /// Bitmask of lanes equal to zero.
    #[inline]
    #[target_feature(enable = "ssse3")]
    unsafe fn zero_lanes_128(values: __m128i) -> u32 {
        _mm_movemask_epi8(_mm_cmpeq_epi8(values, _mm_setzero_si128())) as u32
    }

    /// SSSE3 2-bit encoding, 16 bases → 4 bytes per step.
    ///
    /// `pmaddubsw` folds base pairs into `(b0 << 2) | b1`, `pmaddwd` folds
    /// those into full bytes inside 32-bit lanes, and a final `pshufb`
    /// gathers the four bytes.
    #[target_feature(enable = "ssse3")]
    unsafe fn encode_2bit_ssse3(
        sequence: &[u8],
        output: &mut [u8],
    ) -> std::result::Result<(), usize> {
        let one = _mm_set1_epi8(1);
        let pair_weights = _mm_set1_epi16(0x0104);
        let quad_weights = _mm_set1_epi32(0x0001_0010);
        let gather = _mm_setr_epi8(0, 4, 8, 12, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1);

        let mut i = 0;
        while i + 16 <= sequence.len() {
            let chunk = _mm_loadu_si128(sequence[i..i + 16].as_ptr() as *const __m128i);
            let biased = lookup_letters_128(chunk, &ENCODE_2BIT_ROWS);
            let invalid = zero_lanes_128(biased);
            if invalid != 0 {
                return Err(i + invalid.trailing_zeros() as usize);
            }

            let codes = _mm_sub_epi8(biased, one);
            let pairs = _mm_maddubs_epi16(codes, pair_weights);
            let quads = _mm_madd_epi16(pairs, quad_weights);
            let packed = _mm_cvtsi128_si32(_mm_shuffle_epi8(quads, gather)) as u32;
            output[i / 4..i / 4 + 4].copy_from_slice(&packed.to_le_bytes());
            i += 16;
        }

        encode_2bit_scalar(&sequence[i..], &mut output[i / 4..]).map_err(|p| p + i)
    }

    /// SSSE3 4-bit encoding, 16 symbols → 8 bytes per step.
    #[target_feature(enable = "ssse3")]
    unsafe fn encode_4bit_ssse3(
        sequence: &[u8],
        output: &mut [u8],
    ) -> std::result::Result<(), usize> {
        let pair_weights = _mm_set1_epi16(0x0110);

        let mut i = 0;
        while i + 16 <= sequence.len() {
            let chunk = _mm_loadu_si128(sequence[i..i + 16].as_ptr() as *const __m128i);
            let masks = lookup_letters_128(chunk, &ENCODE_4BIT_ROWS);
            let invalid = zero_lanes_128(masks);
            if invalid != 0 {
                return Err(i + invalid.trailing_zeros() as usize);
            }

            let pairs = _mm_maddubs_epi16(masks, pair_weights);
            let packed = _mm_cvtsi128_si64(_mm_packus_epi16(pairs, pairs)) as u64;
            output[i / 2..i / 2 + 8].copy_from_slice(&packed.to_le_bytes());
            i += 16;
        }

        encode_4bit_scalar(&sequence[i..], &mut output[i / 2..]).map_err(|p| p + i)
    }

    /// SSSE3 2-bit decoding, 4 bytes → 16 bases per step.
    ///
    /// Each byte is replicated four times, masked down to one field per lane,
    /// folded into a 4-bit index and translated with `pshufb`.
    #[target_feature(enable = "ssse3")]
    unsafe fn decode_2bit_ssse3(encoded: &[u8], bases: usize, output: &mut [u8]) {
        let lut = _mm_loadu_si128(DECODE_2BIT_FIELDS.as_ptr() as *const __m128i);
        let spread = _mm_setr_epi8(0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3);
        let fields = _mm_set1_epi32(0x030C_30C0);
        let nibble = _mm_set1_epi8(0x0F);

        let mut done = 0;
        while done + 16 <= bases {
            let mut word = [0u8; 4];
            word.copy_from_slice(&encoded[done / 4..done / 4 + 4]);
            let bytes = _mm_cvtsi32_si128(i32::from_le_bytes(word));

            let isolated = _mm_and_si128(_mm_shuffle_epi8(bytes, spread), fields);
            let index = _mm_or_si128(
                _mm_and_si128(_mm_srli_epi16(isolated, 4), nibble),
                _mm_and_si128(isolated, nibble),
            );
            let ascii = _mm_shuffle_epi8(lut, index);
            _mm_storeu_si128(
                output[done..done + 16].as_mut_ptr() as *mut __m128i,
                ascii,
            );
            done += 16;
        }

        if done < bases {
            decode_2bit_scalar(&encoded[done / 4..], bases - done, &mut output[done..]);
        }
    }

    /// SSSE3 4-bit decoding, 8 bytes → 16 symbols per step.
    #[target_feature(enable = "ssse3")]
    unsafe fn decode_4bit_ssse3(
        encoded: &[u8],
        bases: usize,
        output: &mut [u8],
    ) -> std::result::Result<(), usize> {
        let lut = _mm_loadu_si128(MASK_TO_ASCII.as_ptr() as *const __m128i);
        let spread = _mm_setr_epi8(0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7);
        let high_lanes = _mm_set1_epi16(0x00FF);
        let nibble = _mm_set1_epi8(0x0F);

        let mut done = 0;
        while done + 16 <= bases {
            let mut block = [0u8; 8];
            block.copy_from_slice(&encoded[done / 2..done / 2 + 8]);
            let bytes = _mm_cvtsi64_si128(i64::from_le_bytes(block));

            let doubled = _mm_shuffle_epi8(bytes, spread);
            let hi = _mm_and_si128(_mm_srli_epi16(doubled, 4), nibble);
            let lo = _mm_and_si128(doubled, nibble);
            let index = _mm_or_si128(
                _mm_and_si128(high_lanes, hi),
                _mm_andnot_si128(high_lanes, lo),
            );

            let invalid = zero_lanes_128(index);
            if invalid != 0 {
                return Err(done + invalid.trailing_zeros() as usize);
            }

            let ascii = _mm_shuffle_epi8(lut, index);
            _mm_storeu_si128(
                output[done..done + 16].as_mut_ptr() as *mut __m128i,
                ascii,
            );
            done += 16;
        }

        if done < bases {
            decode_4bit_scalar(&encoded[done / 2..], bases - done, &mut output[done..])
                .map_err(|p| p + done)?;
        }
        Ok(())
    }

    /// 256-bit variant of [`lookup_letters_128`]; rows are broadcast to both lanes.
    #[inline]
    #[target_feature(enable = "avx2")]
    unsafe fn lookup_letters_256(chunk: __m256i, rows: &[[u8; 16]; 2]) -> __m256i {
        let row4 =
            _mm256_broadcastsi128_si256(_mm_loadu_si128(rows[0].as_ptr() as *const __m128i));
        let row5 =
            _mm256_broadcastsi128_si256(_mm_loadu_si128(rows[1].as_ptr() as *const __m128i));
        let nibble = _mm256_set1_epi8(0x0F);

        let upper = _mm256_and_si256(chunk, _mm256_set1_epi8(0xDFu8 as i8));
        let lo = _mm256_and_si256(upper, nibble);
        let hi = _mm256_and_si256(_mm256_srli_epi16(upper, 4), nibble);

        let from4 = _mm256_and_si256(
            _mm256_shuffle_epi8(row4, lo),
            _mm256_cmpeq_epi8(hi, _mm256_set1_epi8(4)),
        );
        let from5 = _mm256_and_si256(
            _mm256_shuffle_epi8(row5, lo),
            _mm256_cmpeq_epi8(hi, _mm256_set1_epi8(5)),
        );
        _mm256_or_si256(from4, from5)
    }

    #[inline]
    #[target_feature(enable = "avx2")]
    unsafe fn zero_lanes_256(values: __m256i) -> u32 {
        _mm256_movemask_epi8(_mm256_cmpeq_epi8(values, _mm256_setzero_si256())) as u32
    }

    /// AVX2 2-bit encoding, 32 bases → 8 bytes per step.
    #[target_feature(enable = "avx2")]
    unsafe fn encode_2bit_avx2(
        sequence: &[u8],
        output: &mut [u8],
    ) -> std::result::Result<(), usize> {
        let one = _mm256_set1_epi8(1);
        let pair_weights = _mm256_set1_epi16(0x0104);
        let quad_weights = _mm256_set1_epi32(0x0001_0010);
        let gather = _mm256_broadcastsi128_si256(_mm_setr_epi8(
            0, 4, 8, 12, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
        ));

        let mut i = 0;
        while i + 32 <= sequence.len() {
            let chunk = _mm256_loadu_si256(sequence[i..i + 32].as_ptr() as *const __m256i);
            let biased = lookup_letters_256(chunk, &ENCODE_2BIT_ROWS);
            let invalid = zero_lanes_256(biased);
            if invalid != 0 {
                return Err(i + invalid.trailing_zeros() as usize);
            }

            let codes = _mm256_sub_epi8(biased, one);
            let pairs = _mm256_maddubs_epi16(codes, pair_weights);
            let quads = _mm256_madd_epi16(pairs, quad_weights);
            let packed = _mm256_shuffle_epi8(quads, gather);
            let low = _mm256_extract_epi32(packed, 0) as u32;
            let high = _mm256_extract_epi32(packed, 4) as u32;
            output[i / 4..i / 4 + 4].copy_from_slice(&low.to_le_bytes());
            output[i / 4 + 4..i / 4 + 8].copy_from_slice(&high.to_le_bytes());
            i += 32;
        }

        encode_2bit_scalar(&sequence[i..], &mut output[i / 4..]).map_err(|p| p + i)
    }

    /// AVX2 4-bit encoding, 32 symbols → 16 bytes per step.
    #[target_feature(enable = "avx2")]
    unsafe fn encode_4bit_avx2(
        sequence: &[u8],
        output: &mut [u8],
    ) -> std::result::Result<(), usize> {
        let pair_weights = _mm256_set1_epi16(0x0110);

        let mut i = 0;
        while i + 32 <= sequence.len() {
            let chunk = _mm256_loadu_si256(sequence[i..i + 32].as_ptr() as *const __m256i);
            let masks = lookup_letters_256(chunk, &ENCODE_4BIT_ROWS);
            let invalid = zero_lanes_256(masks);
            if invalid != 0 {
                return Err(i + invalid.trailing_zeros() as usize);
            }

            let pairs = _mm256_maddubs_epi16(masks, pair_weights);
            let packed = _mm256_packus_epi16(pairs, pairs);
            let low = _mm256_extract_epi64(packed, 0) as u64;
            let high = _mm256_extract_epi64(packed, 2) as u64;
            output[i / 2..i / 2 + 8].copy_from_slice(&low.to_le_bytes());
            output[i / 2 + 8..i / 2 + 16].copy_from_slice(&high.to_le_bytes());
            i += 32;
        }

        encode_4bit_scalar(&sequence[i..], &mut output[i / 2..]).map_err(|p| p + i)
    }

    /// AVX2 2-bit decoding, 8 bytes → 32 bases per step.
    #[target_feature(enable = "avx2")]
    unsafe fn decode_2bit_avx2(encoded: &[u8], bases: usize, output: &mut [u8]) {
        let lut = _mm256_broadcastsi128_si256(_mm_loadu_si128(
            DECODE_2BIT_FIELDS.as_ptr() as *const __m128i,
        ));
        let spread = _mm256_setr_epi8(
            0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, //
            4, 4, 4, 4, 5, 5, 5, 5, 6, 6, 6, 6, 7, 7, 7, 7,
        );
        let fields = _mm256_set1_epi32(0x030C_30C0);
        let nibble = _mm256_set1_epi8(0x0F);

        let mut done = 0;
        while done + 32 <= bases {
            let mut block = [0u8; 8];
            block.copy_from_slice(&encoded[done / 4..done / 4 + 8]);
            let bytes = _mm256_broadcastsi128_si256(_mm_cvtsi64_si128(i64::from_le_bytes(block)));

            let isolated = _mm256_and_si256(_mm256_shuffle_epi8(bytes, spread), fields);
            let index = _mm256_or_si256(
                _mm256_and_si256(_mm256_srli_epi16(isolated, 4), nibble),
                _mm256_and_si256(isolated, nibble),
            );
            let ascii = _mm256_shuffle_epi8(lut, index);
            _mm256_storeu_si256(
                output[done..done + 32].as_mut_ptr() as *mut __m256i,
                ascii,
            );
            done += 32;
        }

        if done < bases {
            decode_2bit_scalar(&encoded[done / 4..], bases - done, &mut output[done..]);
        }
    }

    /// AVX2 4-bit decoding, 16 bytes → 32 symbols per step.
    #[target_feature(enable = "avx2")]
    unsafe fn decode_4bit_avx2(
        encoded: &[u8],
        bases: usize,
        output: &mut [u8],
    ) -> std::result::Result<(), usize> {
        let lut =
            _mm256_broadcastsi128_si256(_mm_loadu_si128(MASK_TO_ASCII.as_ptr() as *const __m128i));
        let spread = _mm256_setr_epi8(
            0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, //
            8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13, 13, 14, 14, 15, 15,
        );
        let high_lanes = _mm256_set1_epi16(0x00FF);
        let nibble = _mm256_set1_epi8(0x0F);

        let mut done = 0;
        while done + 32 <= bases {
            let bytes = _mm256_broadcastsi128_si256(_mm_loadu_si128(
                encoded[done / 2..done / 2 + 16].as_ptr() as *const __m128i,
            ));

            let doubled = _mm256_shuffle_epi8(bytes, spread);
            let hi = _mm256_and_si256(_mm256_srli_epi16(doubled, 4), nibble);
            let lo = _mm256_and_si256(doubled, nibble);
            let index = _mm256_or_si256(
                _mm256_and_si256(high_lanes, hi),
                _mm256_andnot_si256(high_lanes, lo),
            );

            let invalid = zero_lanes_256(index);
            if invalid != 0 {
                return Err(done + invalid.trailing_zeros() as usize);
            }

            let ascii = _mm256_shuffle_epi8(lut, index);
            _mm256_storeu_si256(
                output[done..done + 32].as_mut_ptr() as *mut __m256i,
                ascii,
            );
            done += 32;
        }

        if done < bases {
            decode_4bit_scalar(&encoded[done / 2..], bases - done, &mut output[done..])
                .map_err(|p| p + done)?;
        }
        Ok(())
    }
}

// ============================================================================
// ARM NEON Implementation
// ============================================================================

#[cfg(target_arch = "aarch64")]
pub(crate) use neon::NEON;

#[cfg(target_arch = "aarch64")]
mod neon {
    use std::arch::aarch64::*;

    use super::{
        CodecKernel, ENCODE_2BIT_ROWS, ENCODE_4BIT_ROWS, decode_2bit_scalar, decode_4bit_scalar,
        encode_2bit_scalar, encode_4bit_scalar,
    };
    use crate::iupac::{CODE_TO_ASCII, MASK_TO_ASCII};

    // Safety: handed out by `dispatch` only after NEON detection.
    pub(crate) static NEON: CodecKernel = CodecKernel {
        name: "neon",
        encode_2bit: |s, o| unsafe { encode_2bit_neon(s, o) },
        encode_4bit: |s, o| unsafe { encode_4bit_neon(s, o) },
        decode_2bit: |e, n, o| unsafe { decode_2bit_neon(e, n, o) },
        decode_4bit: |e, n, o| unsafe { decode_4bit_neon(e, n, o) },
    };

    /// Maps 16 ASCII bytes through the two letter rows with `tbl`.
    #[inline]
    #[target_feature(enable = "neon")]
    unsafe fn lookup_letters(chunk: uint8x16_t, rows: &[[u8; 16]; 2]) -> uint8x16_t {
        let row4 = vld1q_u8(rows[0].as_ptr());
        let row5 = vld1q_u8(rows[1].as_ptr());
        let upper = vandq_u8(chunk, vdupq_n_u8(0xDF));
        let lo = vandq_u8(upper, vdupq_n_u8(0x0F));
        let hi = vshrq_n_u8::<4>(upper);

        let from4 = vandq_u8(vqtbl1q_u8(row4, lo), vceqq_u8(hi, vdupq_n_u8(4)));
        let from5 = vandq_u8(vqtbl1q_u8(row5, lo), vceqq_u8(hi, vdupq_n_u8(5)));
        vorrq_u8(from4, from5)
    }

    /// Stores a vector and returns the lane index of the first zero, if any.
    #[inline]
    #[target_feature(enable = "neon")]
    unsafe fn first_zero(values: uint8x16_t, lanes: &mut [u8; 16]) -> Option<usize> {
        vst1q_u8(lanes.as_mut_ptr(), values);
        if vminvq_u8(values) != 0 {
            return None;
        }
        lanes.iter().position(|&b| b == 0)
    }

    #[target_feature(enable = "neon")]
    unsafe fn encode_2bit_neon(
        sequence: &[u8],
        output: &mut [u8],
    ) -> std::result::Result<(), usize> {
        let mut lanes = [0u8; 16];
        let mut i = 0;
        while i + 16 <= sequence.len() {
            let chunk = vld1q_u8(sequence[i..i + 16].as_ptr());
            let biased = lookup_letters(chunk, &ENCODE_2BIT_ROWS);
            if let Some(lane) = first_zero(biased, &mut lanes) {
                return Err(i + lane);
            }
            vst1q_u8(lanes.as_mut_ptr(), vsubq_u8(biased, vdupq_n_u8(1)));

            for (j, quad) in lanes.chunks_exact(4).enumerate() {
                output[i / 4 + j] = (quad[0] << 6) | (quad[1] << 4) | (quad[2] << 2) | quad[3];
            }
            i += 16;
        }

        encode_2bit_scalar(&sequence[i..], &mut output[i / 4..]).map_err(|p| p + i)
    }

    #[target_feature(enable = "neon")]
    unsafe fn encode_4bit_neon(
        sequence: &[u8],
        output: &mut [u8],
    ) -> std::result::Result<(), usize> {
        let mut lanes = [0u8; 16];
        let mut i = 0;
        while i + 16 <= sequence.len() {
            let chunk = vld1q_u8(sequence[i..i + 16].as_ptr());
            let masks = lookup_letters(chunk, &ENCODE_4BIT_ROWS);
            if let Some(lane) = first_zero(masks, &mut lanes) {
                return Err(i + lane);
            }

            for (j, pair) in lanes.chunks_exact(2).enumerate() {
                output[i / 2 + j] = (pair[0] << 4) | pair[1];
            }
            i += 16;
        }

        encode_4bit_scalar(&sequence[i..], &mut output[i / 2..]).map_err(|p| p + i)
    }

    #[target_feature(enable = "neon")]
    unsafe fn decode_2bit_neon(encoded: &[u8], bases: usize, output: &mut [u8]) {
        let mut table = [0u8; 16];
        table[..4].copy_from_slice(&CODE_TO_ASCII);
        let lut = vld1q_u8(table.as_ptr());

        let mut done = 0;
        while done + 16 <= bases {
            let mut unpacked = [0u8; 16];
            for (j, &byte) in encoded[done / 4..done / 4 + 4].iter().enumerate() {
                unpacked[j * 4] = byte >> 6;
                unpacked[j * 4 + 1] = (byte >> 4) & 0b11;
                unpacked[j * 4 + 2] = (byte >> 2) & 0b11;
                unpacked[j * 4 + 3] = byte & 0b11;
            }
            let ascii = vqtbl1q_u8(lut, vld1q_u8(unpacked.as_ptr()));
            vst1q_u8(output[done..done + 16].as_mut_ptr(), ascii);
            done += 16;
        }

        if done < bases {
            decode_2bit_scalar(&encoded[done / 4..], bases - done, &mut output[done..]);
        }
    }

    #[target_feature(enable = "neon")]
    unsafe fn decode_4bit_neon(
        encoded: &[u8],
        bases: usize,
        output: &mut [u8],
    ) -> std::result::Result<(), usize> {
        let lut = vld1q_u8(MASK_TO_ASCII.as_ptr());
        let mut lanes = [0u8; 16];

        let mut done = 0;
        while done + 16 <= bases {
            let mut unpacked = [0u8; 16];
            for (j, &byte) in encoded[done / 2..done / 2 + 8].iter().enumerate() {
                unpacked[j * 2] = byte >> 4;
                unpacked[j * 2 + 1] = byte & 0x0F;
            }
            let index = vld1q_u8(unpacked.as_ptr());
            if let Some(lane) = first_zero(index, &mut lanes) {
                return Err(done + lane);
            }
            vst1q_u8(output[done..done + 16].as_mut_ptr(), vqtbl1q_u8(lut, index));
            done += 16;
        }

        if done < bases {
            decode_4bit_scalar(&encoded[done / 2..], bases - done, &mut output[done..])
                .map_err(|p| p + done)?;
        }
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
