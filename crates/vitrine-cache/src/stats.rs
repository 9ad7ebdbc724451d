//! Derived cache statistics. Observability only, never drives behavior.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// How many of the most-accessed keys a stats snapshot reports.
pub(crate) const TOP_KEYS_LIMIT: usize = 10;

/// Live counters updated by cache operations.
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub expired_removed: AtomicU64,
}

impl CacheCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        if count > 0 {
            self.evictions.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn record_expired(&self, count: usize) {
        if count > 0 {
            self.expired_removed
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total == 0.0 { 0.0 } else { hits / total }
    }
}

/// A point-in-time snapshot of cache state. Recomputed on demand from the
/// entry store and counters.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Fraction of reads served from cache, in `[0.0, 1.0]`.
    pub hit_rate: f64,
    pub evictions: u64,
    pub expired_removed: u64,
    /// Rough footprint: sum of serialized value lengths.
    pub memory_estimate_bytes: usize,
    /// Most-accessed keys, most accessed first.
    pub top_keys: Vec<KeyAccess>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyAccess {
    pub key: String,
    pub access_count: u64,
}
