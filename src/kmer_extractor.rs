// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! # K-mer Key Extraction
//!
//! Turns a packed sequence (or raw query text) into an array of
//! occurrence-aware keys, see [`crate::key`].
//!
//! ## Windows
//!
//! Every start offset `i` in `0..=len-k` is one window. A 2-bit window is a
//! single k-mer. A 4-bit window is expanded into concrete k-mers, subject to
//! the degeneracy limit:
//!
//! - any `N` (or a zero/invalid symbol) in the window: no k-mers
//! - two or more symbols standing for 2 or 3 bases: no k-mers
//! - otherwise: one k-mer per base of the single ambiguous symbol, if any
//!
//! Queries are extracted from text with the same rules, reading symbols
//! through [`crate::iupac`], so the text path and the packed path agree.
//!
//! ## Occurrences
//!
//! One [`OccurrenceTracker`] is shared across a whole sequence. The `n`-th
//! time a k-mer is seen it gets occurrence index `n - 1`. Occurrences whose
//! index does not fit in `occurrence_bits`, or that arrive after the tracker
//! filled up, are dropped.
//!
//! ## Ordering
//!
//! Keys come out in window order; expanded variants of one window come out
//! in base order (A, C, G, T).

use tracing::trace;

use crate::error::{Error, Result};
use crate::iupac::{Degeneracy, degeneracy, expand, mask_of};
use crate::key::KeyLayout;
use crate::occurrence::OccurrenceTracker;
use crate::packed_sequence::{Alphabet, PackedSequence};

/// Most concrete k-mers one 4-bit window can expand into.
const MAX_VARIANTS_PER_WINDOW: usize = 3;

/// Extracts keys for one [`KeyLayout`].
///
/// ```rust
/// use simdkmer::key::KeyLayout;
/// use simdkmer::kmer_extractor::KmerExtractor;
/// use simdkmer::packed_sequence::encode_2bit;
///
/// let extractor = KmerExtractor::new(KeyLayout::new(4, 2).unwrap());
/// let keys = extractor.extract(&encode_2bit(b"ACGTACGTAC").unwrap());
/// assert_eq!(keys.len(), 7);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct KmerExtractor {
    layout: KeyLayout,
    max_tracked_kmers: usize,
}

impl KmerExtractor {
    pub fn new(layout: KeyLayout) -> Self {
        Self {
            layout,
            max_tracked_kmers: 0,
        }
    }

    /// Caps the occurrence tracker at `max_tracked_kmers` distinct k-mers
    /// per sequence. `0` sizes it from the sequence length.
    pub fn with_max_tracked_kmers(mut self, max_tracked_kmers: usize) -> Self {
        self.max_tracked_kmers = max_tracked_kmers;
        self
    }

    #[inline]
    pub fn layout(&self) -> KeyLayout {
        self.layout
    }

    /// Extracts the keys of a packed sequence.
    ///
    /// Sequences shorter than `k` yield no keys.
    pub fn extract(&self, sequence: &PackedSequence) -> Vec<u64> {
        let k = self.layout.kmer_size();
        if sequence.len() < k {
            return Vec::new();
        }

        match sequence.alphabet() {
            Alphabet::TwoBit => self.extract_2bit(sequence),
            Alphabet::FourBit => {
                let masks: Vec<u8> = (0..sequence.len()).map(|i| sequence.symbol(i)).collect();
                self.extract_masks(&masks)
            }
        }
    }

    /// Extracts the keys of a query string.
    ///
    /// # Errors
    ///
    /// - [`Error::QueryTooShort`] if `text` is shorter than `k`
    /// - [`Error::InvalidCharacter`] for a character outside the IUPAC alphabet
    pub fn extract_query(&self, text: &[u8]) -> Result<Vec<u64>> {
        let k = self.layout.kmer_size();
        if text.len() < k {
            return Err(Error::QueryTooShort {
                length: text.len(),
                kmer_size: k,
            });
        }

        let masks = text
            .iter()
            .enumerate()
            .map(|(position, &byte)| mask_of(byte).ok_or_else(|| Error::invalid_byte(byte, position)))
            .collect::<Result<Vec<u8>>>()?;
        Ok(self.extract_masks(&masks))
    }

    fn tracker(&self, windows: usize, variants: usize) -> OccurrenceTracker {
        let capacity = match self.max_tracked_kmers {
            0 => windows * variants,
            limit => limit,
        };
        OccurrenceTracker::with_capacity(capacity)
    }

    /// Rolling 2-bit path: one k-mer per window.
    fn extract_2bit(&self, sequence: &PackedSequence) -> Vec<u64> {
        let k = self.layout.kmer_size();
        let windows = sequence.len() - k + 1;
        let mut sink = KeySink::new(self.layout, self.tracker(windows, 1), windows);
        let kmer_mask = self.layout.kmer_mask();

        let mut value = 0u64;
        for i in 0..sequence.len() {
            value = ((value << 2) | u64::from(sequence.symbol(i))) & kmer_mask;
            if i + 1 >= k {
                sink.push(value);
            }
        }
        sink.finish()
    }

    /// Base-mask path shared by 4-bit sequences and query text.
    fn extract_masks(&self, masks: &[u8]) -> Vec<u64> {
        let k = self.layout.kmer_size();
        let windows = masks.len() - k + 1;
        let mut sink = KeySink::new(
            self.layout,
            self.tracker(windows, MAX_VARIANTS_PER_WINDOW),
            windows,
        );
        let kmer_mask = self.layout.kmer_mask();

        // Rolling value of the concrete bases; non-concrete symbols contribute 0.
        let mut value = 0u64;
        let mut ambiguous_in_window = 0usize;
        let mut forbidden_in_window = 0usize;
        let mut last_ambiguous = 0usize;

        for (end, &mask) in masks.iter().enumerate() {
            let class = degeneracy(mask);
            let code = match class {
                Degeneracy::Concrete => u64::from(mask.trailing_zeros()),
                _ => 0,
            };
            match class {
                Degeneracy::Concrete => {}
                Degeneracy::Ambiguous => {
                    ambiguous_in_window += 1;
                    last_ambiguous = end;
                }
                Degeneracy::Forbidden => forbidden_in_window += 1,
            }
            if end >= k {
                match degeneracy(masks[end - k]) {
                    Degeneracy::Concrete => {}
                    Degeneracy::Ambiguous => ambiguous_in_window -= 1,
                    Degeneracy::Forbidden => forbidden_in_window -= 1,
                }
            }
            value = ((value << 2) | code) & kmer_mask;

            if end + 1 < k || forbidden_in_window > 0 {
                continue;
            }
            match ambiguous_in_window {
                0 => sink.push(value),
                1 => {
                    let shift = 2 * (end - last_ambiguous) as u32;
                    for base in expand(masks[last_ambiguous]) {
                        sink.push(value | (u64::from(base) << shift));
                    }
                }
                _ => {}
            }
        }
        sink.finish()
    }
}

/// Collects keys while counting occurrences.
struct KeySink {
    layout: KeyLayout,
    tracker: OccurrenceTracker,
    keys: Vec<u64>,
    dropped: usize,
}

impl KeySink {
    fn new(layout: KeyLayout, tracker: OccurrenceTracker, expected: usize) -> Self {
        Self {
            layout,
            tracker,
            keys: Vec::with_capacity(expected),
            dropped: 0,
        }
    }

    #[inline]
    fn push(&mut self, kmer: u64) {
        let count = match self.tracker.find_or_increment(kmer) {
            Ok(count) => count,
            Err(err) => {
                trace!(kmer, %err, "dropping k-mer occurrence");
                self.dropped += 1;
                return;
            }
        };
        match self.layout.key_for_count(kmer, count) {
            Some(key) => self.keys.push(key),
            None => {
                trace!(kmer, count, "occurrence index overflows key field");
                self.dropped += 1;
            }
        }
    }

    fn finish(self) -> Vec<u64> {
        if self.dropped > 0 {
            trace!(
                kept = self.keys.len(),
                dropped = self.dropped,
                "extraction pass dropped occurrences"
            );
        }
        self.keys
    }
}

/// Extracts the keys of `sequence` for `k` and `occurrence_bits`.
///
/// # Errors
///
/// [`Error::InvalidParameter`] for an unsupported layout.
pub fn extract_keys(
    sequence: &PackedSequence,
    kmer_size: usize,
    occurrence_bits: u32,
) -> Result<Vec<u64>> {
    let layout = KeyLayout::new(kmer_size, occurrence_bits)?;
    Ok(KmerExtractor::new(layout).extract(sequence))
}

/// Extracts the keys of a query string for `k` and `occurrence_bits`.
///
/// # Errors
///
/// [`Error::InvalidParameter`], [`Error::QueryTooShort`] or [`Error::InvalidCharacter`].
pub fn extract_query_keys(text: &[u8], kmer_size: usize, occurrence_bits: u32) -> Result<Vec<u64>> {
    let layout = KeyLayout::new(kmer_size, occurrence_bits)?;
    KmerExtractor::new(layout).extract_query(text)
}

/// Whether the `k`-length window of `text` at `offset` may be expanded.
///
/// Returns `false` for windows running past the end of `text`.
pub fn text_window_expandable(text: &[u8], offset: usize, kmer_size: usize) -> bool {
    let Some(window) = offset
        .checked_add(kmer_size)
        .and_then(|end| text.get(offset..end))
    else {
        return false;
    };

    let mut ambiguous = 0;
    for &byte in window {
        match degeneracy(mask_of(byte).unwrap_or(0)) {
            Degeneracy::Concrete => {}
            Degeneracy::Ambiguous => ambiguous += 1,
            Degeneracy::Forbidden => return false,
        }
    }
    ambiguous < 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::packed_sequence::{encode_2bit, encode_4bit};

    /// 2-bit value of a concrete k-mer string.
    fn kmer(text: &[u8]) -> u64 {
        text.iter()
            .fold(0, |acc, &b| (acc << 2) | u64::from(crate::iupac::code_of(b).unwrap()))
    }

    fn extractor(k: usize, occ: u32) -> KmerExtractor {
        KmerExtractor::new(KeyLayout::new(k, occ).unwrap())
    }

    // ========================================================================
    // 2-bit Sequences
    // ========================================================================

    #[test]
    fn test_2bit_windows_and_occurrences() {
        let ex = extractor(4, 2);
        let keys = ex.extract(&encode_2bit(b"ACGTACGTAC").unwrap());
        let layout = ex.layout();
        let expected = vec![
            layout.compose(kmer(b"ACGT"), 0),
            layout.compose(kmer(b"CGTA"), 0),
            layout.compose(kmer(b"GTAC"), 0),
            layout.compose(kmer(b"TACG"), 0),
            layout.compose(kmer(b"ACGT"), 1),
            layout.compose(kmer(b"CGTA"), 1),
            layout.compose(kmer(b"GTAC"), 1),
        ];
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_short_sequence_yields_nothing() {
        let ex = extractor(8, 2);
        assert!(ex.extract(&encode_2bit(b"ACGTACG").unwrap()).is_empty());
        assert!(ex.extract(&encode_4bit(b"ACG").unwrap()).is_empty());
        assert_eq!(ex.extract(&encode_2bit(b"ACGTACGT").unwrap()).len(), 1);
    }

    #[test]
    fn test_occurrence_overflow_is_dropped() {
        // AAAA x 7 windows; 2 occurrence bits keep the first 4.
        let ex = extractor(4, 2);
        let keys = ex.extract(&encode_2bit(b"AAAAAAAAAA").unwrap());
        assert_eq!(keys, vec![0, 1, 2, 3]);

        let ex = extractor(4, 0);
        assert_eq!(ex.extract(&encode_2bit(b"AAAAAAAAAA").unwrap()), vec![0]);
    }

    #[test]
    fn test_tracker_capacity_limit_drops_new_kmers() {
        let ex = extractor(4, 4).with_max_tracked_kmers(2);
        let keys = ex.extract(&encode_2bit(b"ACGTACGTAC").unwrap());
        let layout = ex.layout();
        // Only ACGT and CGTA fit; both are still counted twice.
        assert_eq!(
            keys,
            vec![
                layout.compose(kmer(b"ACGT"), 0),
                layout.compose(kmer(b"CGTA"), 0),
                layout.compose(kmer(b"ACGT"), 1),
                layout.compose(kmer(b"CGTA"), 1),
            ]
        );
    }

    #[test]
    fn test_full_width_kmer() {
        let ex = extractor(32, 0);
        let text = [b'T'; 32];
        let keys = ex.extract(&encode_2bit(&text).unwrap());
        assert_eq!(keys, vec![u64::MAX]);
    }

    // ========================================================================
    // 4-bit Sequences and Degeneracy
    // ========================================================================

    #[test]
    fn test_4bit_concrete_matches_2bit() {
        let ex = extractor(5, 3);
        let text = b"GATTACAGATTACACCGT";
        assert_eq!(
            ex.extract(&encode_4bit(text).unwrap()),
            ex.extract(&encode_2bit(text).unwrap())
        );
    }

    #[test]
    fn test_single_v_expands_to_three() {
        let ex = extractor(4, 2);
        let keys = ex.extract(&encode_4bit(b"ACVT").unwrap());
        let layout = ex.layout();
        assert_eq!(
            keys,
            vec![
                layout.compose(kmer(b"ACAT"), 0),
                layout.compose(kmer(b"ACCT"), 0),
                layout.compose(kmer(b"ACGT"), 0),
            ]
        );
    }

    #[test]
    fn test_two_ambiguous_symbols_refuse_expansion() {
        let ex = extractor(4, 2);
        assert!(ex.extract(&encode_4bit(b"AMMA").unwrap()).is_empty());
        assert!(ex.extract_query(b"AMMA").unwrap().is_empty());
        assert!(!text_window_expandable(b"AMMA", 0, 4));
    }

    #[test]
    fn test_n_refuses_expansion() {
        let ex = extractor(4, 2);
        // Windows: ACGN, CGNA, GNAC, NACG, ACGT -> only the last survives.
        let keys = ex.extract(&encode_4bit(b"ACGNACGT").unwrap());
        assert_eq!(keys, vec![ex.layout().compose(kmer(b"ACGT"), 0)]);
    }

    #[test]
    fn test_ambiguity_leaving_window() {
        let ex = extractor(4, 2);
        // RACGT: window 0 has R (A|G), window 1 is ACGT.
        let keys = ex.extract(&encode_4bit(b"RACGT").unwrap());
        let layout = ex.layout();
        assert_eq!(
            keys,
            vec![
                layout.compose(kmer(b"AACG"), 0),
                layout.compose(kmer(b"GACG"), 0),
                layout.compose(kmer(b"ACGT"), 0),
            ]
        );
    }

    #[test]
    fn test_expanded_variants_share_tracker() {
        let ex = extractor(4, 2);
        // Window 0 expands to AAAA/GAAA, window 1 is AAAA again.
        let keys = ex.extract(&encode_4bit(b"RAAAA").unwrap());
        let layout = ex.layout();
        assert_eq!(
            keys,
            vec![
                layout.compose(kmer(b"AAAA"), 0),
                layout.compose(kmer(b"GAAA"), 0),
                layout.compose(kmer(b"AAAA"), 1),
            ]
        );
    }

    // ========================================================================
    // Query Extraction
    // ========================================================================

    #[test]
    fn test_query_matches_packed_path() {
        let ex = extractor(4, 2);
        for text in [&b"ACGTACGTAC"[..], b"ACVTRRACGTN", b"acgtyacgt", b"NNNNACGT"] {
            let packed = ex.extract(&encode_4bit(text).unwrap());
            assert_eq!(ex.extract_query(text).unwrap(), packed);
        }
    }

    #[test]
    fn test_query_too_short() {
        let err = extractor(4, 2).extract_query(b"ACG").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QueryTooShort);
        assert!(matches!(
            err,
            Error::QueryTooShort {
                length: 3,
                kmer_size: 4
            }
        ));
    }

    #[test]
    fn test_query_invalid_character() {
        let err = extractor(4, 2).extract_query(b"ACGT-ACGT").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCharacter {
                character: '-',
                position: 4
            }
        ));
    }

    #[test]
    fn test_free_functions_validate_layout() {
        let seq = encode_2bit(b"ACGTACGT").unwrap();
        assert_eq!(
            extract_keys(&seq, 2, 0).unwrap_err().kind(),
            ErrorKind::InvalidParameter
        );
        assert_eq!(extract_keys(&seq, 4, 2).unwrap().len(), 5);
        assert_eq!(extract_query_keys(b"ACGTACGT", 4, 2).unwrap().len(), 5);
    }

    #[test]
    fn test_text_window_expandable_bounds() {
        assert!(text_window_expandable(b"ACGTV", 1, 4));
        assert!(!text_window_expandable(b"ACGTV", 2, 4));
        assert!(!text_window_expandable(b"ACNT", 0, 4));
        assert!(!text_window_expandable(b"AC?T", 0, 4));
        assert!(!text_window_expandable(b"ACGT", usize::MAX, 4));
    }
}
