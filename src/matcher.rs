// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! # Key Array Matching
//!
//! [`count_shared`] returns the number of sequence keys that also occur in
//! the query key array. Occurrence indices are part of every key, so for
//! arrays produced by the extractor this is the multiset intersection size
//! of the underlying k-mers.
//!
//! Two paths compute the same number:
//!
//! - **linear** (`seq.len() * query.len() < 100`): for each sequence key,
//!   scan the query with a dispatched [`MatchKernel`] and stop at the first hit
//! - **hashed**: build an `FxHashSet` of the query keys, probe once per sequence key
//!
//! The threshold only picks the faster path; counts never depend on it or on
//! the CPU features detected.

// Allow unsafe operations in unsafe functions (Rust 2024 compatibility)
#![allow(unsafe_op_in_unsafe_fn)]

use rustc_hash::FxHashSet;

use crate::dispatch::match_kernel;

/// Pair-count below which the linear path is used.
pub const LINEAR_SCAN_THRESHOLD: usize = 100;

/// Membership test: does `haystack` contain `needle`?
pub(crate) type ContainsFn = fn(&[u64], u64) -> bool;

/// One membership scan implementation.
#[derive(Debug)]
pub struct MatchKernel {
    name: &'static str,
    contains: ContainsFn,
}

impl MatchKernel {
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Whether `haystack` contains `needle`.
    #[inline]
    pub fn contains(&self, haystack: &[u64], needle: u64) -> bool {
        (self.contains)(haystack, needle)
    }

    /// Linear-path shared count using this kernel.
    pub fn count_shared(&self, sequence: &[u64], query: &[u64]) -> usize {
        sequence
            .iter()
            .filter(|&&key| (self.contains)(query, key))
            .count()
    }
}

pub(crate) static SCALAR: MatchKernel = MatchKernel {
    name: "scalar",
    contains: |haystack, needle| haystack.contains(&needle),
};

#[cfg(target_arch = "x86_64")]
pub(crate) use x86::{AVX2, SSE41};

#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::*;

    use super::MatchKernel;

    // Safety: only handed out by `dispatch` after feature detection.
    pub(crate) static SSE41: MatchKernel = MatchKernel {
        name: "sse4.1",
        contains: |haystack, needle| unsafe { contains_sse41(haystack, needle) },
    };

    pub(crate) static AVX2: MatchKernel = MatchKernel {
        name: "avx2",
        contains: |haystack, needle| unsafe { contains_avx2(haystack, needle) },
    };

    #[target_feature(enable = "sse4.1")]
    unsafe fn contains_sse41(haystack: &[u64], needle: u64) -> bool {
        let target = _mm_set1_epi64x(needle as i64);
        let mut chunks = haystack.chunks_exact(2);
        for chunk in &mut chunks {
            let keys = _mm_loadu_si128(chunk.as_ptr() as *const __m128i);
            if _mm_movemask_epi8(_mm_cmpeq_epi64(keys, target)) != 0 {
                return true;
            }
        }
        chunks.remainder().contains(&needle)
    }

    #[target_feature(enable = "avx2")]
    unsafe fn contains_avx2(haystack: &[u64], needle: u64) -> bool {
        let target = _mm256_set1_epi64x(needle as i64);
        let mut chunks = haystack.chunks_exact(4);
        for chunk in &mut chunks {
            let keys = _mm256_loadu_si256(chunk.as_ptr() as *const __m256i);
            if _mm256_movemask_epi8(_mm256_cmpeq_epi64(keys, target)) != 0 {
                return true;
            }
        }
        chunks.remainder().contains(&needle)
    }
}

#[cfg(target_arch = "aarch64")]
pub(crate) use neon::NEON;

#[cfg(target_arch = "aarch64")]
mod neon {
    use std::arch::aarch64::*;

    use super::MatchKernel;

    pub(crate) static NEON: MatchKernel = MatchKernel {
        name: "neon",
        contains: |haystack, needle| unsafe { contains_neon(haystack, needle) },
    };

    #[target_feature(enable = "neon")]
    unsafe fn contains_neon(haystack: &[u64], needle: u64) -> bool {
        let target = vdupq_n_u64(needle);
        let mut chunks = haystack.chunks_exact(2);
        for chunk in &mut chunks {
            let hits = vceqq_u64(vld1q_u64(chunk.as_ptr()), target);
            if vmaxvq_u32(vreinterpretq_u32_u64(hits)) != 0 {
                return true;
            }
        }
        chunks.remainder().contains(&needle)
    }
}

/// Number of `sequence` keys present in `query`.
///
/// ```rust
/// use simdkmer::matcher::count_shared;
///
/// assert_eq!(count_shared(&[1, 2, 3, 4], &[2, 4, 6]), 2);
/// assert_eq!(count_shared(&[], &[1]), 0);
/// ```
pub fn count_shared(sequence: &[u64], query: &[u64]) -> usize {
    if sequence.len().saturating_mul(query.len()) < LINEAR_SCAN_THRESHOLD {
        count_shared_linear(sequence, query)
    } else {
        count_shared_hashed(sequence, query)
    }
}

/// Nested scan with the dispatched membership kernel.
pub fn count_shared_linear(sequence: &[u64], query: &[u64]) -> usize {
    match_kernel().count_shared(sequence, query)
}

/// Hash-set probe, O(n + m).
pub fn count_shared_hashed(sequence: &[u64], query: &[u64]) -> usize {
    let mut lookup = FxHashSet::default();
    lookup.reserve(query.len());
    lookup.extend(query.iter().copied());
    sequence.iter().filter(|key| lookup.contains(*key)).count()
}

/// A row matches when its shared count reaches the minimum score.
#[inline]
pub const fn is_match(shared: usize, min_score: usize) -> bool {
    shared >= min_score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::match_kernels;

    #[test]
    fn test_count_shared_basic() {
        assert_eq!(count_shared(&[1, 2, 3], &[3, 4, 5]), 1);
        assert_eq!(count_shared(&[1, 2, 3], &[]), 0);
        assert_eq!(count_shared(&[7, 7], &[7]), 2);
    }

    #[test]
    fn test_paths_agree_across_threshold() {
        for (n, m) in [(9, 11), (10, 10), (11, 9), (50, 3), (3, 50), (200, 200)] {
            let sequence: Vec<u64> = (0..n as u64).map(|i| i * 3).collect();
            let query: Vec<u64> = (0..m as u64).map(|i| i * 5).collect();
            let hashed = count_shared_hashed(&sequence, &query);
            assert_eq!(count_shared_linear(&sequence, &query), hashed, "{n}x{m}");
            assert_eq!(count_shared(&sequence, &query), hashed, "{n}x{m}");
        }
    }

    #[test]
    fn test_every_kernel_matches_scalar() {
        let haystack: Vec<u64> = (0..37u64).map(|i| (i << 40) | (i * 1000 + 7)).collect();
        for kernel in match_kernels() {
            for &needle in &haystack {
                assert!(kernel.contains(&haystack, needle), "{}", kernel.name());
            }
            assert!(!kernel.contains(&haystack, 1), "{}", kernel.name());
            assert!(!kernel.contains(&[], 0), "{}", kernel.name());
            // Needle in the scalar remainder only.
            assert!(kernel.contains(&[1, 2, 3, 4, 5], 5), "{}", kernel.name());
            assert_eq!(
                kernel.count_shared(&haystack, &haystack[..10]),
                SCALAR.count_shared(&haystack, &haystack[..10])
            );
        }
    }

    #[test]
    fn test_high_bit_keys() {
        let keys = [u64::MAX, 1 << 63, 0];
        for kernel in match_kernels() {
            assert!(kernel.contains(&keys, u64::MAX));
            assert!(kernel.contains(&keys, 1 << 63));
            assert!(!kernel.contains(&keys, (1 << 63) - 1));
        }
    }

    #[test]
    fn test_is_match() {
        assert!(is_match(3, 3));
        assert!(is_match(4, 3));
        assert!(!is_match(2, 3));
        assert!(is_match(0, 0));
    }
}
