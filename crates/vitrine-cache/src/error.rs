//! Error types for cache operations.

use std::sync::Arc;

/// Boxed error type accepted from fetchers at the cache boundary.
///
/// A fetcher may be a database query, an HTTP call, or a pure computation;
/// the cache places no constraint on its error type beyond it being an
/// `Error` that can cross task boundaries.
pub type FetchError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the cache public API.
///
/// The enum is `Clone` because a single fetch outcome is shared by every
/// caller coalesced onto the same in-flight request; the underlying errors
/// are wrapped in `Arc` to make that sharing cheap.
///
/// Only [`CacheError::Fetch`] can reach callers on the `get_or_set` miss
/// path. Internal failures (capacity pressure, broadcast loss, codec
/// mismatches on read) are handled locally and logged.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The fetcher passed to `get_or_set` failed. Nothing was cached, so
    /// the next call for the same key retries the fetch.
    #[error("fetch failed: {0}")]
    Fetch(Arc<FetchError>),

    /// The fetched value could not be serialized for storage.
    #[error("value serialization failed: {0}")]
    Serialize(Arc<serde_json::Error>),

    /// A cached value could not be deserialized into the requested type.
    #[error("cached value deserialization failed: {0}")]
    Deserialize(Arc<serde_json::Error>),
}

impl CacheError {
    /// Wrap a fetcher error.
    pub fn fetch(err: impl Into<FetchError>) -> Self {
        CacheError::Fetch(Arc::new(err.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = CacheError::fetch("backend unreachable");
        assert_eq!(err.to_string(), "fetch failed: backend unreachable");
    }

    #[test]
    fn test_error_is_clone() {
        let err = CacheError::fetch("boom");
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }
}
