// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! # Serialization
//!
//! Binary formats for values that leave the process: packed sequences stored
//! as BLOBs next to their rows, and key arrays narrowed to the width their
//! layout needs.
//!
//! ### Sequence blob (version 1)
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │ Bytes 0-1: Magic "KS" (0x4B, 0x53)                             │
//! │ Byte 2: Format version (currently 0x01)                        │
//! │ Byte 3: Alphabet (0x00 = 2-bit, 0x01 = 4-bit IUPAC)            │
//! │ Byte 4: Flags (bit 0 = has_checksum, bits 1-7 reserved)        │
//! │ Byte 5: Reserved (0x00)                                        │
//! │ Bytes 6-9: Symbol count (little-endian u32)                    │
//! │ Bytes 10-13: Packed data length (little-endian u32)            │
//! │ Bytes 14+: Packed data                                         │
//! │ [Optional] Last 4 bytes: CRC32 of everything before it         │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Key array
//!
//! ```text
//! Byte 0: key width in bytes (2, 4 or 8)
//! Bytes 1-4: key count (little-endian u32)
//! Bytes 5+: keys, little-endian, `width` bytes each
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use simdkmer::packed_sequence::encode_2bit;
//! use simdkmer::serialization::{from_blob, to_blob};
//!
//! let sequence = encode_2bit(b"ACGTACGTACGTACGT").unwrap();
//! let blob = to_blob(&sequence, true).unwrap();
//! assert_eq!(&blob[..2], b"KS");
//! assert_eq!(from_blob(&blob).unwrap(), sequence);
//! ```

use thiserror::Error;

use crate::error::Result;
use crate::key::KeyWidth;
use crate::packed_sequence::{Alphabet, PackedSequence};

// ============================================================================
// Constants
// ============================================================================

/// Magic bytes identifying a serialized packed sequence ("KS").
const MAGIC_BYTES: [u8; 2] = [0x4B, 0x53];

/// Current format version.
const FORMAT_VERSION: u8 = 1;

/// Layout: 2 magic + 1 version + 1 alphabet + 1 flags + 1 reserved + 4 symbols + 4 data_len
const HEADER_SIZE: usize = 14;

/// Flag bit: checksum present.
const FLAG_HAS_CHECKSUM: u8 = 0x01;

const CHECKSUM_SIZE: usize = 4;

/// Layout: 1 width + 4 count
const KEY_HEADER_SIZE: usize = 5;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while reading or writing binary formats.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializationError {
    #[error("invalid magic bytes: expected {expected:02X?}, found {found:02X?}")]
    InvalidMagic { expected: [u8; 2], found: [u8; 2] },

    #[error("unsupported format version {version} (max supported: {max_supported})")]
    UnsupportedVersion { version: u8, max_supported: u8 },

    #[error("invalid alphabet: {0} (expected 0 or 1)")]
    InvalidAlphabet(u8),

    #[error("invalid key width: {0} (expected 2, 4 or 8)")]
    InvalidKeyWidth(u8),

    #[error("buffer too small: need {needed} bytes, got {actual} bytes")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("checksum mismatch: expected 0x{expected:08X}, computed 0x{computed:08X}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    #[error("{symbols} symbols need {expected} bytes, header says {header}")]
    DataLengthMismatch {
        symbols: usize,
        expected: usize,
        header: usize,
    },

    #[error("{len} items exceed the u32 length field")]
    TooLong { len: usize },

    #[error("key 0x{key:X} does not fit in {width}")]
    KeyOverflow { key: u64, width: KeyWidth },
}

// ============================================================================
// CRC32 (IEEE polynomial)
// ============================================================================

/// IEEE 802.3 CRC32 lookup table (generated at compile time).
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let polynomial: u32 = 0xEDB88320;
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ polynomial;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// CRC32 (IEEE) of a byte slice.
///
/// ```rust
/// use simdkmer::serialization::crc32;
///
/// assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
/// ```
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFFFFFFu32;
    for &byte in data {
        let index = ((crc ^ (byte as u32)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

// ============================================================================
// Header
// ============================================================================

/// Parsed header of a sequence blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializedHeader {
    pub version: u8,
    pub alphabet: Alphabet,
    pub has_checksum: bool,
    /// Number of packed symbols.
    pub symbols: u32,
    /// Packed data length in bytes.
    pub data_len: u32,
}

impl SerializedHeader {
    /// Total blob size including header and optional checksum.
    #[inline]
    pub const fn total_size(&self) -> usize {
        HEADER_SIZE + self.data_len as usize + if self.has_checksum { CHECKSUM_SIZE } else { 0 }
    }
}

/// Parses and checks the fixed-size header.
///
/// # Errors
///
/// Bad magic, a newer version, an unknown alphabet, or fewer than 14 bytes.
pub fn parse_header(data: &[u8]) -> std::result::Result<SerializedHeader, SerializationError> {
    if data.len() < HEADER_SIZE {
        return Err(SerializationError::BufferTooSmall {
            needed: HEADER_SIZE,
            actual: data.len(),
        });
    }

    let magic = [data[0], data[1]];
    if magic != MAGIC_BYTES {
        return Err(SerializationError::InvalidMagic {
            expected: MAGIC_BYTES,
            found: magic,
        });
    }

    let version = data[2];
    if version == 0 || version > FORMAT_VERSION {
        return Err(SerializationError::UnsupportedVersion {
            version,
            max_supported: FORMAT_VERSION,
        });
    }

    let alphabet = Alphabet::from_u8(data[3]).ok_or(SerializationError::InvalidAlphabet(data[3]))?;
    let has_checksum = data[4] & FLAG_HAS_CHECKSUM != 0;
    let symbols = u32::from_le_bytes([data[6], data[7], data[8], data[9]]);
    let data_len = u32::from_le_bytes([data[10], data[11], data[12], data[13]]);

    let expected = (symbols as usize * alphabet.bits_per_symbol()).div_ceil(8);
    if expected != data_len as usize {
        return Err(SerializationError::DataLengthMismatch {
            symbols: symbols as usize,
            expected,
            header: data_len as usize,
        });
    }

    Ok(SerializedHeader {
        version,
        alphabet,
        has_checksum,
        symbols,
        data_len,
    })
}

// ============================================================================
// Sequence Blobs
// ============================================================================

/// Blob size for `sequence`.
#[inline]
pub fn required_serialized_len(sequence: &PackedSequence, with_checksum: bool) -> usize {
    HEADER_SIZE + sequence.as_bytes().len() + if with_checksum { CHECKSUM_SIZE } else { 0 }
}

/// Serializes a packed sequence without a checksum.
pub fn to_bytes(sequence: &PackedSequence) -> std::result::Result<Vec<u8>, SerializationError> {
    to_blob(sequence, false)
}

/// Serializes a packed sequence, optionally followed by a CRC32.
///
/// # Errors
///
/// [`SerializationError::TooLong`] above `u32::MAX` symbols.
pub fn to_blob(
    sequence: &PackedSequence,
    with_checksum: bool,
) -> std::result::Result<Vec<u8>, SerializationError> {
    let symbols =
        u32::try_from(sequence.len()).map_err(|_| SerializationError::TooLong { len: sequence.len() })?;
    let data = sequence.as_bytes();
    let data_len =
        u32::try_from(data.len()).map_err(|_| SerializationError::TooLong { len: data.len() })?;

    let mut buffer = Vec::with_capacity(required_serialized_len(sequence, with_checksum));
    buffer.extend_from_slice(&MAGIC_BYTES);
    buffer.push(FORMAT_VERSION);
    buffer.push(u8::from(sequence.alphabet()));
    buffer.push(if with_checksum { FLAG_HAS_CHECKSUM } else { 0 });
    buffer.push(0x00);
    buffer.extend_from_slice(&symbols.to_le_bytes());
    buffer.extend_from_slice(&data_len.to_le_bytes());
    buffer.extend_from_slice(data);

    if with_checksum {
        let checksum = crc32(&buffer);
        buffer.extend_from_slice(&checksum.to_le_bytes());
    }
    Ok(buffer)
}

/// Deserializes a blob written by [`to_bytes`] or [`to_blob`].
///
/// The checksum is verified when present; the packed data is then checked
/// with [`PackedSequence::from_parts`].
///
/// # Errors
///
/// [`crate::error::Error::Serialization`] for a malformed blob,
/// [`crate::error::Error::CorruptSequence`] for inconsistent padding.
pub fn from_blob(blob: &[u8]) -> Result<PackedSequence> {
    let header = validate_blob(blob)?;
    let start = HEADER_SIZE;
    let end = start + header.data_len as usize;
    let bit_len = header.symbols as usize * header.alphabet.bits_per_symbol();
    PackedSequence::from_parts(header.alphabet, bit_len, blob[start..end].to_vec())
}

/// Alias of [`from_blob`].
#[inline]
pub fn from_bytes(data: &[u8]) -> Result<PackedSequence> {
    from_blob(data)
}

/// Checks the header, size and checksum without copying the data.
pub fn validate_blob(blob: &[u8]) -> std::result::Result<SerializedHeader, SerializationError> {
    let header = parse_header(blob)?;
    let total = header.total_size();
    if blob.len() < total {
        return Err(SerializationError::BufferTooSmall {
            needed: total,
            actual: blob.len(),
        });
    }

    if header.has_checksum {
        let data_end = HEADER_SIZE + header.data_len as usize;
        let stored = u32::from_le_bytes([
            blob[data_end],
            blob[data_end + 1],
            blob[data_end + 2],
            blob[data_end + 3],
        ]);
        let computed = crc32(&blob[..data_end]);
        if stored != computed {
            return Err(SerializationError::ChecksumMismatch {
                expected: stored,
                computed,
            });
        }
    }
    Ok(header)
}

// ============================================================================
// Key Arrays
// ============================================================================

/// Serializes keys at `width`.
///
/// # Errors
///
/// [`SerializationError::KeyOverflow`] if a key needs more bits than `width`.
///
/// ```rust
/// use simdkmer::key::KeyWidth;
/// use simdkmer::serialization::{keys_from_bytes, keys_to_bytes};
///
/// let bytes = keys_to_bytes(&[1, 0x3FF], KeyWidth::U16).unwrap();
/// assert_eq!(bytes.len(), 5 + 2 * 2);
/// assert_eq!(keys_from_bytes(&bytes).unwrap(), vec![1, 0x3FF]);
/// ```
pub fn keys_to_bytes(
    keys: &[u64],
    width: KeyWidth,
) -> std::result::Result<Vec<u8>, SerializationError> {
    let count = u32::try_from(keys.len()).map_err(|_| SerializationError::TooLong { len: keys.len() })?;
    let bytes = width.bytes();

    let mut buffer = Vec::with_capacity(KEY_HEADER_SIZE + keys.len() * bytes);
    buffer.push(width as u8);
    buffer.extend_from_slice(&count.to_le_bytes());
    for &key in keys {
        if width.bits() < 64 && key >> width.bits() != 0 {
            return Err(SerializationError::KeyOverflow { key, width });
        }
        buffer.extend_from_slice(&key.to_le_bytes()[..bytes]);
    }
    Ok(buffer)
}

/// Reads a key array written by [`keys_to_bytes`], widening to `u64`.
pub fn keys_from_bytes(data: &[u8]) -> std::result::Result<Vec<u64>, SerializationError> {
    if data.len() < KEY_HEADER_SIZE {
        return Err(SerializationError::BufferTooSmall {
            needed: KEY_HEADER_SIZE,
            actual: data.len(),
        });
    }
    let width = KeyWidth::from_u8(data[0]).ok_or(SerializationError::InvalidKeyWidth(data[0]))?;
    let count = u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as usize;
    let bytes = width.bytes();

    let needed = KEY_HEADER_SIZE + count * bytes;
    if data.len() < needed {
        return Err(SerializationError::BufferTooSmall {
            needed,
            actual: data.len(),
        });
    }

    Ok(data[KEY_HEADER_SIZE..needed]
        .chunks_exact(bytes)
        .map(|chunk| {
            let mut le = [0u8; 8];
            le[..bytes].copy_from_slice(chunk);
            u64::from_le_bytes(le)
        })
        .collect())
}
