// Copyright (c) 2025-present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! `simdkmer` configuration.
//!
//! # Priority (highest to lowest)
//!
//! 1. Runtime updates through [`crate::session::SearchSession::set_config`]
//! 2. Environment variables (`SIMDKMER_*`, nested keys split on `__`)
//! 3. Configuration file (`simdkmer.toml`)
//! 4. Default values
//!
//! ```toml
//! kmer_size = 8
//! occurrence_bits = 4
//! min_shared_rate = 0.8
//!
//! [cache]
//! query_pattern_capacity = 1000
//! ```

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::key::KeyLayout;

/// Search and extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Bases per k-mer (4..=32).
    pub kmer_size: usize,
    /// Low key bits reserved for the occurrence index (0..=16).
    pub occurrence_bits: u32,
    /// Fraction of rows above which a k-mer counts as high-frequency.
    pub max_appearance_rate: f64,
    /// Absolute row count cap for the same threshold (0 = unlimited).
    pub max_appearance_nrow: u64,
    /// Floor for the minimum shared-key score.
    pub min_score: usize,
    /// Fraction of query keys that must be shared.
    pub min_shared_rate: f64,
    /// Exclude high-frequency query keys from the shared count and discount
    /// them from the minimum score.
    pub high_frequency_filtering: bool,
    /// Cache sizing.
    pub cache: CacheConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            kmer_size: 16,
            occurrence_bits: 8,
            max_appearance_rate: 0.5,
            max_appearance_nrow: 0,
            min_score: 1,
            min_shared_rate: 0.9,
            high_frequency_filtering: false,
            cache: CacheConfig::default(),
        }
    }
}

/// Cache capacities and load tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries kept by the query-pattern LRU cache.
    pub query_pattern_capacity: usize,
    /// Entries kept by the actual-min-score cache.
    pub actual_min_score_capacity: usize,
    /// Keys inserted per batch while loading a high-frequency cache.
    pub high_freq_load_batch_size: usize,
    /// Distinct k-mers tracked per sequence (0 = derived from length).
    pub max_tracked_kmers: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            query_pattern_capacity: 50_000,
            actual_min_score_capacity: 50_000,
            high_freq_load_batch_size: 10_000,
            max_tracked_kmers: 0,
        }
    }
}

/// Which dependency groups differ between two configurations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigChanges {
    /// `kmer_size` or `occurrence_bits`.
    pub layout: bool,
    /// `min_score` or `min_shared_rate`.
    pub scoring: bool,
    /// `max_appearance_rate` or `max_appearance_nrow`.
    pub appearance: bool,
    /// `high_frequency_filtering`.
    pub filtering: bool,
    /// Any `cache` setting.
    pub cache: bool,
}

impl ConfigChanges {
    /// Query-pattern and min-score caches must be cleared.
    #[inline]
    pub fn invalidates_score_caches(&self) -> bool {
        self.layout || self.scoring || self.appearance || self.filtering
    }

    /// High-frequency caches no longer match the active cache key tuple.
    #[inline]
    pub fn invalidates_high_freq(&self) -> bool {
        self.layout || self.appearance
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl SearchConfig {
    /// Loads `simdkmer.toml` and `SIMDKMER_*` over the defaults.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from_path("simdkmer.toml")
    }

    /// Loads a specific file and `SIMDKMER_*` over the defaults.
    /// A missing file is not an error.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SIMDKMER_").split("__"));

        figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Parses a TOML string over the defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Serializes the configuration to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Checks every value against its allowed range.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        self.layout()?;

        if !(0.0..=1.0).contains(&self.max_appearance_rate) {
            return Err(invalid(
                "max_appearance_rate",
                format!("{} is outside [0.0, 1.0]", self.max_appearance_rate),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_shared_rate) {
            return Err(invalid(
                "min_shared_rate",
                format!("{} is outside [0.0, 1.0]", self.min_shared_rate),
            ));
        }
        if self.cache.query_pattern_capacity == 0 {
            return Err(invalid("cache.query_pattern_capacity", "must be at least 1".into()));
        }
        if self.cache.actual_min_score_capacity == 0 {
            return Err(invalid(
                "cache.actual_min_score_capacity",
                "must be at least 1".into(),
            ));
        }
        if self.cache.high_freq_load_batch_size == 0 {
            return Err(invalid(
                "cache.high_freq_load_batch_size",
                "must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Key layout for `kmer_size` and `occurrence_bits`.
    pub fn layout(&self) -> Result<KeyLayout> {
        KeyLayout::new(self.kmer_size, self.occurrence_bits)
    }

    /// Compares two configurations by dependency group.
    pub fn diff(&self, other: &SearchConfig) -> ConfigChanges {
        ConfigChanges {
            layout: self.kmer_size != other.kmer_size
                || self.occurrence_bits != other.occurrence_bits,
            scoring: self.min_score != other.min_score
                || self.min_shared_rate.to_bits() != other.min_shared_rate.to_bits(),
            appearance: self.max_appearance_rate.to_bits() != other.max_appearance_rate.to_bits()
                || self.max_appearance_nrow != other.max_appearance_nrow,
            filtering: self.high_frequency_filtering != other.high_frequency_filtering,
            cache: self.cache != other.cache,
        }
    }
}

fn invalid(key: &str, message: String) -> Error {
    Error::InvalidParameter(format!("{key}: {message}"))
}
