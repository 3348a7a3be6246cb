// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Runtime SIMD dispatch.
//!
//! CPU features are detected once, on first use, and the matching strategy
//! tables are cached in [`OnceLock`]s. Afterwards every call goes straight
//! through a function pointer with no per-call feature checks.
//!
//! Two strategy families exist:
//!
//! - [`CodecKernel`]: 2-bit/4-bit encode and decode
//! - [`MatchKernel`]: key membership scans used by the small-input matcher path
//!
//! [`codec_kernels`] and [`match_kernels`] list every strategy the running
//! CPU can execute, best first and scalar last, so tests can check each one
//! against the scalar reference.

use std::sync::OnceLock;

use tracing::debug;

use crate::dna_simd_encoder::{self, CodecKernel};
use crate::matcher::{self, MatchKernel};

static CODEC_KERNELS: OnceLock<Vec<&'static CodecKernel>> = OnceLock::new();

static MATCH_KERNELS: OnceLock<Vec<&'static MatchKernel>> = OnceLock::new();

// =============================================================================
// Feature detection and dispatch selection
// =============================================================================

fn select_codec_kernels() -> Vec<&'static CodecKernel> {
    let mut kernels: Vec<&'static CodecKernel> = Vec::with_capacity(3);

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            kernels.push(&dna_simd_encoder::AVX2);
        }
        if is_x86_feature_detected!("ssse3") {
            kernels.push(&dna_simd_encoder::SSSE3);
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        if std::arch::is_aarch64_feature_detected!("neon") {
            kernels.push(&dna_simd_encoder::NEON);
        }
    }

    kernels.push(&dna_simd_encoder::SCALAR);
    debug!(
        selected = kernels[0].name(),
        available = kernels.len(),
        "codec kernel dispatch initialized"
    );
    kernels
}

fn select_match_kernels() -> Vec<&'static MatchKernel> {
    let mut kernels: Vec<&'static MatchKernel> = Vec::with_capacity(3);

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            kernels.push(&matcher::AVX2);
        }
        if is_x86_feature_detected!("sse4.1") {
            kernels.push(&matcher::SSE41);
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        if std::arch::is_aarch64_feature_detected!("neon") {
            kernels.push(&matcher::NEON);
        }
    }

    kernels.push(&matcher::SCALAR);
    debug!(
        selected = kernels[0].name(),
        available = kernels.len(),
        "match kernel dispatch initialized"
    );
    kernels
}

// =============================================================================
// Public dispatch API
// =============================================================================

/// Best codec kernel for this CPU.
#[inline]
pub fn codec_kernel() -> &'static CodecKernel {
    codec_kernels()[0]
}

/// Every codec kernel this CPU can run, best first, scalar last.
pub fn codec_kernels() -> &'static [&'static CodecKernel] {
    CODEC_KERNELS.get_or_init(select_codec_kernels)
}

/// Best membership kernel for this CPU.
#[inline]
pub fn match_kernel() -> &'static MatchKernel {
    match_kernels()[0]
}

/// Every membership kernel this CPU can run, best first, scalar last.
pub fn match_kernels() -> &'static [&'static MatchKernel] {
    MATCH_KERNELS.get_or_init(select_match_kernels)
}

/// Returns information about available SIMD features.
#[must_use]
pub fn simd_features_info() -> SimdFeatures {
    SimdFeatures::detect()
}

/// Available SIMD features on the current CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct SimdFeatures {
    /// SSSE3 (`pshufb`) available.
    pub ssse3: bool,
    /// SSE4.1 (`pcmpeqq`) available.
    pub sse41: bool,
    /// AVX2 available.
    pub avx2: bool,
    /// ARM NEON available.
    pub neon: bool,
}

impl SimdFeatures {
    /// Detects available SIMD features.
    #[must_use]
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            Self {
                ssse3: is_x86_feature_detected!("ssse3"),
                sse41: is_x86_feature_detected!("sse4.1"),
                avx2: is_x86_feature_detected!("avx2"),
                neon: false,
            }
        }
        #[cfg(target_arch = "aarch64")]
        {
            Self {
                ssse3: false,
                sse41: false,
                avx2: false,
                neon: std::arch::is_aarch64_feature_detected!("neon"),
            }
        }
        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        {
            Self {
                ssse3: false,
                sse41: false,
                avx2: false,
                neon: false,
            }
        }
    }

    /// Returns the best available instruction set name.
    #[must_use]
    pub const fn best_instruction_set(&self) -> &'static str {
        if self.avx2 {
            "avx2"
        } else if self.sse41 || self.ssse3 {
            "sse"
        } else if self.neon {
            "neon"
        } else {
            "scalar"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_is_always_last() {
        assert_eq!(codec_kernels().last().map(|k| k.name()), Some("scalar"));
        assert_eq!(match_kernels().last().map(|k| k.name()), Some("scalar"));
    }

    #[test]
    fn test_best_kernel_is_first() {
        assert_eq!(codec_kernel().name(), codec_kernels()[0].name());
        assert_eq!(match_kernel().name(), match_kernels()[0].name());
    }

    #[test]
    fn test_selection_is_stable() {
        let first = codec_kernel() as *const CodecKernel;
        let second = codec_kernel() as *const CodecKernel;
        assert_eq!(first, second);
    }

    #[test]
    fn test_kernels_follow_detected_features() {
        let features = simd_features_info();
        let names: Vec<&str> = codec_kernels().iter().map(|k| k.name()).collect();
        assert_eq!(names.contains(&"avx2"), features.avx2);
        assert_eq!(names.contains(&"ssse3"), features.ssse3);
        assert_eq!(names.contains(&"neon"), features.neon);

        let names: Vec<&str> = match_kernels().iter().map(|k| k.name()).collect();
        assert_eq!(names.contains(&"sse4.1"), features.sse41);
    }

    #[test]
    fn test_best_instruction_set_name() {
        let none = SimdFeatures {
            ssse3: false,
            sse41: false,
            avx2: false,
            neon: false,
        };
        assert_eq!(none.best_instruction_set(), "scalar");
        let avx = SimdFeatures { avx2: true, ..none };
        assert_eq!(avx.best_instruction_set(), "avx2");
    }
}
