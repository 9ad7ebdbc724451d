//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Process-wide cache configuration, immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default TTL applied when a `set` or `get_or_set` call does not
    /// specify one, in milliseconds.
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    /// Maximum number of resident entries. Inserting beyond this bound
    /// triggers eviction. Zero keeps the store permanently empty.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Number of victims removed per eviction pass. Batching amortizes the
    /// scoring scan across many inserts.
    #[serde(default = "default_eviction_batch_size")]
    pub eviction_batch_size: usize,

    /// Interval between background sweeps of expired entries, in
    /// milliseconds.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Fraction of an entry's TTL after which a hit may trigger a
    /// background refresh (stale-while-revalidate).
    #[serde(default = "default_prefetch_threshold")]
    pub prefetch_threshold: f64,
}

fn default_ttl_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_max_entries() -> usize {
    1000
}

fn default_eviction_batch_size() -> usize {
    10
}

fn default_sweep_interval_ms() -> u64 {
    120_000 // 2 minutes
}

fn default_prefetch_threshold() -> f64 {
    0.8
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: default_ttl_ms(),
            max_entries: default_max_entries(),
            eviction_batch_size: default_eviction_batch_size(),
            sweep_interval_ms: default_sweep_interval_ms(),
            prefetch_threshold: default_prefetch_threshold(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.eviction_batch_size == 0 {
            return Err("cache.eviction_batch_size must be > 0".into());
        }
        if self.sweep_interval_ms == 0 {
            return Err("cache.sweep_interval_ms must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.prefetch_threshold) {
            return Err("cache.prefetch_threshold must be within [0.0, 1.0]".into());
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
