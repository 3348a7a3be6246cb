// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Error types for `simdkmer`.
//!
//! Every fallible operation in the crate returns [`Result<T>`]. Errors are
//! detected at the smallest scope that can see them (one encode call, one
//! extraction call, one cache load) and are never retried internally.
//!
//! The one designed-in partial failure is [`Error::CapacityExceeded`]: the
//! occurrence tracker raises it when it runs out of slots, and the extractor
//! drops that k-mer occurrence instead of aborting.

use thiserror::Error;

use crate::serialization::SerializationError;

/// Result type alias for `simdkmer` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while encoding, extracting, matching or caching.
#[derive(Error, Debug)]
pub enum Error {
    /// Input text contains a character outside the selected alphabet.
    #[error("invalid character {character:?} at position {position}")]
    InvalidCharacter {
        /// The offending character.
        character: char,
        /// Zero-based position in the input text.
        position: usize,
    },

    /// A k-mer size, occurrence width or other parameter is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A query is shorter than the configured k-mer size.
    #[error("query of length {length} is shorter than k-mer size {kmer_size}")]
    QueryTooShort {
        /// Query length in bases.
        length: usize,
        /// Configured k-mer size.
        kmer_size: usize,
    },

    /// The occurrence tracker has no free slot left.
    #[error("occurrence tracker capacity {capacity} exceeded")]
    CapacityExceeded {
        /// Preallocated tracker capacity.
        capacity: usize,
    },

    /// Building a high-frequency k-mer cache failed; the cache stays empty.
    #[error("high-frequency cache build failed: {0}")]
    CacheBuildFailure(String),

    /// A cache or stored analysis does not match the active configuration.
    #[error("configuration mismatch: {0}")]
    ConfigMismatch(String),

    /// Packed data violates the packed-sequence invariants.
    #[error("corrupt packed sequence: {0}")]
    CorruptSequence(String),

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The external metadata store reported a failure.
    #[error("metadata store error: {0}")]
    Store(String),

    /// Blob (de)serialization failed.
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

/// Coarse classification of an [`Error`], convenient for matching in callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidCharacter,
    InvalidParameter,
    QueryTooShort,
    CapacityExceeded,
    CacheBuildFailure,
    ConfigMismatch,
    CorruptSequence,
    Config,
    Store,
    Serialization,
}

impl Error {
    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCharacter { .. } => ErrorKind::InvalidCharacter,
            Self::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Self::QueryTooShort { .. } => ErrorKind::QueryTooShort,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::CacheBuildFailure(_) => ErrorKind::CacheBuildFailure,
            Self::ConfigMismatch(_) => ErrorKind::ConfigMismatch,
            Self::CorruptSequence(_) => ErrorKind::CorruptSequence,
            Self::Config(_) => ErrorKind::Config,
            Self::Store(_) => ErrorKind::Store,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Builds an [`Error::InvalidCharacter`] from a raw input byte.
    pub(crate) fn invalid_byte(byte: u8, position: usize) -> Self {
        Self::InvalidCharacter {
            character: byte as char,
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidCharacter {
            character: 'X',
            position: 3,
        };
        assert_eq!(err.to_string(), "invalid character 'X' at position 3");

        let err = Error::QueryTooShort {
            length: 3,
            kmer_size: 4,
        };
        assert_eq!(
            err.to_string(),
            "query of length 3 is shorter than k-mer size 4"
        );

        let err = Error::CapacityExceeded { capacity: 16 };
        assert_eq!(err.to_string(), "occurrence tracker capacity 16 exceeded");
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            Error::InvalidParameter("k".into()).kind(),
            ErrorKind::InvalidParameter
        );
        assert_eq!(
            Error::ConfigMismatch("stale".into()).kind(),
            ErrorKind::ConfigMismatch
        );
        assert_eq!(Error::invalid_byte(b'Z', 0).kind(), ErrorKind::InvalidCharacter);
    }

    #[test]
    fn test_serialization_error_converts() {
        let err: Error = SerializationError::UnsupportedVersion {
            version: 9,
            max_supported: 1,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }
}
