//! The cache instance: public API and stale-while-revalidate orchestration.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::broadcast::{CacheMessage, CacheTransport, MessageKind, NoopTransport};
use crate::config::CacheConfig;
use crate::dedupe::{FetchOutcome, RequestDeduplicator};
use crate::error::{CacheError, FetchError};
use crate::stats::{CacheCounters, CacheStats, KeyAccess, TOP_KEYS_LIMIT};
use crate::store::EntryStore;

/// Options for a direct `set`.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// TTL for the entry; the configured default when `None`.
    pub ttl: Option<Duration>,
    /// Tags indexed for bulk invalidation.
    pub tags: Vec<String>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// Options for `get_or_set`.
#[derive(Debug, Clone, Default)]
pub struct GetOrSetOptions {
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
    /// When enabled, a hit on an entry past the prefetch threshold kicks
    /// off a background refresh without delaying the returned value.
    pub prefetch: bool,
}

impl GetOrSetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }
}

struct CacheShared {
    config: CacheConfig,
    store: Mutex<EntryStore>,
    dedupe: RequestDeduplicator,
    transport: Arc<dyn CacheTransport>,
    counters: CacheCounters,
    /// Identity carried on published messages so this instance can drop
    /// its own broadcasts.
    origin: Uuid,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CacheShared {
    fn store_lock(&self) -> MutexGuard<'_, EntryStore> {
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a value, publishing the mutation unless it came off the wire.
    fn insert_value(
        &self,
        key: String,
        value: Arc<Value>,
        ttl: Duration,
        tags: Vec<String>,
        publish: bool,
    ) -> bool {
        let outcome = self.store_lock().insert(
            key.clone(),
            Arc::clone(&value),
            ttl,
            tags.clone(),
            Instant::now(),
        );
        self.counters.record_evictions(outcome.evicted);
        if outcome.inserted {
            tracing::debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "cache set");
            if publish {
                self.transport
                    .publish(CacheMessage::set(self.origin, key, (*value).clone(), tags));
            }
        }
        outcome.inserted
    }

    /// Run the deduplicated fetch for `key`, storing a successful result
    /// before the outcome becomes visible to waiters.
    async fn fetch_and_store<T, F, Fut, E>(
        shared: Arc<Self>,
        key: String,
        fetcher: F,
        ttl: Duration,
        tags: Vec<String>,
    ) -> FetchOutcome
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<FetchError>,
    {
        let owned_key = key.clone();
        let store_to = Arc::clone(&shared);
        shared
            .dedupe
            .run(&key, move || {
                let fut = fetcher();
                async move {
                    match fut.await {
                        Ok(value) => match serde_json::to_value(&value) {
                            Ok(json) => {
                                let json = Arc::new(json);
                                store_to.insert_value(
                                    owned_key,
                                    Arc::clone(&json),
                                    ttl,
                                    tags,
                                    true,
                                );
                                Ok(json)
                            }
                            Err(err) => {
                                tracing::warn!(
                                    key = %owned_key,
                                    error = %err,
                                    "fetched value could not be serialized, not cached"
                                );
                                Err(CacheError::Serialize(Arc::new(err)))
                            }
                        },
                        Err(err) => Err(CacheError::Fetch(Arc::new(err.into()))),
                    }
                }
            })
            .await
    }

    /// Apply a mutation received from a sibling context. Never re-published.
    fn apply_remote(&self, message: CacheMessage) {
        match message.kind {
            MessageKind::Set => match message.value {
                Some(value) => {
                    // The wire shape carries no TTL; the receiving side
                    // applies its own default.
                    self.insert_value(
                        message.key,
                        Arc::new(value),
                        self.config.default_ttl(),
                        message.tags,
                        false,
                    );
                }
                None => {
                    tracing::warn!(key = %message.key, "set message without value dropped");
                }
            },
            MessageKind::Delete => {
                self.store_lock().remove(&message.key);
            }
        }
    }
}

impl Drop for CacheShared {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for handle in tasks.drain(..) {
                handle.abort();
            }
        }
    }
}

/// A process-wide, tag-indexed, TTL-based cache with request coalescing,
/// stale-while-revalidate refresh, least-value eviction, and best-effort
/// cross-context invalidation.
///
/// Construct one instance at application start and hand clones to every
/// domain adapter; cloning is cheap and all clones share state. Must be
/// constructed inside a Tokio runtime, which hosts the periodic sweep and
/// the broadcast listener.
#[derive(Clone)]
pub struct Cache {
    shared: Arc<CacheShared>,
}

impl Cache {
    /// Create a single-context cache (no cross-context broadcast).
    pub fn new(config: CacheConfig) -> Self {
        Self::with_transport(config, Arc::new(NoopTransport))
    }

    /// Create a cache wired to a transport shared with sibling contexts.
    pub fn with_transport(config: CacheConfig, transport: Arc<dyn CacheTransport>) -> Self {
        let shared = Arc::new(CacheShared {
            store: Mutex::new(EntryStore::new(config.max_entries, config.eviction_batch_size)),
            dedupe: RequestDeduplicator::new(),
            transport,
            counters: CacheCounters::default(),
            origin: Uuid::new_v4(),
            tasks: Mutex::new(Vec::new()),
            config,
        });
        let cache = Self { shared };
        cache.spawn_sweeper();
        cache.spawn_listener();
        cache
    }

    /// Look up `key`, returning the value if present and not expired.
    ///
    /// Never suspends and never fetches. A value that does not match the
    /// requested type behaves as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.shared.store_lock().get(key, Instant::now());
        match value {
            Some(value) => {
                self.shared.counters.record_hit();
                match T::deserialize(&*value) {
                    Ok(typed) => Some(typed),
                    Err(err) => {
                        tracing::warn!(
                            key = %key,
                            error = %err,
                            "cached value does not match requested type"
                        );
                        None
                    }
                }
            }
            None => {
                self.shared.counters.record_miss();
                None
            }
        }
    }

    /// Insert or overwrite `key`.
    ///
    /// An unserializable value is skipped with a warning; `set` has no
    /// error channel by contract.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, options: SetOptions) {
        match serde_json::to_value(value) {
            Ok(json) => {
                let ttl = options.ttl.unwrap_or_else(|| self.shared.config.default_ttl());
                self.shared
                    .insert_value(key.to_string(), Arc::new(json), ttl, options.tags, true);
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "value could not be serialized, not cached");
            }
        }
    }

    /// Remove `key`, returning whether an entry was removed.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.shared.store_lock().remove(key);
        if removed {
            tracing::debug!(key = %key, "cache delete");
            self.shared
                .transport
                .publish(CacheMessage::delete(self.shared.origin, key.to_string()));
        }
        removed
    }

    /// Delete every entry carrying any of the given tags. Returns the
    /// number of entries removed. Never fails.
    pub fn invalidate_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> usize {
        let removed = self.shared.store_lock().invalidate_by_tags(tags);
        for key in &removed {
            self.shared
                .transport
                .publish(CacheMessage::delete(self.shared.origin, key.clone()));
        }
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "invalidated by tags");
        }
        removed.len()
    }

    /// Read through the cache: return the cached value on a hit, otherwise
    /// run `fetcher` (coalesced with concurrent callers of the same key),
    /// cache its result, and return it.
    ///
    /// On a hit the call never suspends; with `prefetch` enabled, a hit on
    /// an entry past the prefetch threshold additionally kicks off a
    /// detached refresh whose failure is logged, never surfaced. On a miss
    /// the fetcher's failure propagates and nothing is cached, so the next
    /// call retries.
    pub async fn get_or_set<T, F, Fut, E>(
        &self,
        key: &str,
        fetcher: F,
        options: GetOrSetOptions,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<FetchError>,
    {
        let ttl = options.ttl.unwrap_or_else(|| self.shared.config.default_ttl());

        let hit = {
            let mut store = self.shared.store_lock();
            let now = Instant::now();
            store.get(key, now).map(|value| {
                let stale = options.prefetch
                    && store
                        .peek(key)
                        .is_some_and(|entry| {
                            entry.age_fraction(now) >= self.shared.config.prefetch_threshold
                        });
                (value, stale)
            })
        };

        if let Some((value, stale)) = hit {
            self.shared.counters.record_hit();
            if stale {
                let shared = Arc::clone(&self.shared);
                let key = key.to_string();
                let tags = options.tags;
                tokio::spawn(async move {
                    let outcome =
                        CacheShared::fetch_and_store(shared, key.clone(), fetcher, ttl, tags).await;
                    match outcome {
                        Ok(_) => {
                            tracing::debug!(key = %key, "background revalidation refreshed entry");
                        }
                        Err(err) => {
                            tracing::warn!(key = %key, error = %err, "background revalidation failed");
                        }
                    }
                });
            }
            return T::deserialize(&*value).map_err(|err| CacheError::Deserialize(Arc::new(err)));
        }

        self.shared.counters.record_miss();
        let value = CacheShared::fetch_and_store(
            Arc::clone(&self.shared),
            key.to_string(),
            fetcher,
            ttl,
            options.tags,
        )
        .await?;
        T::deserialize(&*value).map_err(|err| CacheError::Deserialize(Arc::new(err)))
    }

    /// A point-in-time snapshot of cache state. Never fails.
    pub fn stats(&self) -> CacheStats {
        use std::sync::atomic::Ordering;

        let (entries, memory_estimate_bytes, top_keys) = {
            let store = self.shared.store_lock();
            (
                store.len(),
                store.memory_estimate(),
                store
                    .top_keys(TOP_KEYS_LIMIT)
                    .into_iter()
                    .map(|(key, access_count)| KeyAccess { key, access_count })
                    .collect(),
            )
        };
        let counters = &self.shared.counters;
        CacheStats {
            entries,
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            hit_rate: counters.hit_rate(),
            evictions: counters.evictions.load(Ordering::Relaxed),
            expired_removed: counters.expired_removed.load(Ordering::Relaxed),
            memory_estimate_bytes,
            top_keys,
        }
    }

    /// Empty the store and tag index unconditionally. Used for logout and
    /// hard resets. Not broadcast.
    pub fn clear(&self) {
        self.shared.store_lock().clear();
        tracing::debug!("cache cleared");
    }

    /// Stop the background sweep and broadcast listener. Idempotent; also
    /// happens when the last handle is dropped.
    pub fn shutdown(&self) {
        let mut tasks = self
            .shared
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for handle in tasks.drain(..) {
            handle.abort();
        }
    }

    fn spawn_sweeper(&self) {
        let weak = Arc::downgrade(&self.shared);
        let period = self.shared.config.sweep_interval();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(shared) = weak.upgrade() else { break };
                let removed = shared.store_lock().sweep_expired(Instant::now());
                shared.counters.record_expired(removed);
                if removed > 0 {
                    tracing::debug!(removed, "sweep removed expired entries");
                }
            }
        });
        self.push_task(handle);
    }

    fn spawn_listener(&self) {
        let Some(mut receiver) = self.shared.transport.subscribe() else {
            return;
        };
        let weak = Arc::downgrade(&self.shared);
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => {
                        let Some(shared) = weak.upgrade() else { break };
                        if message.origin == shared.origin {
                            continue;
                        }
                        shared.apply_remote(message);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "broadcast receiver lagged, messages dropped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.push_task(handle);
    }

    fn push_task(&self, handle: JoinHandle<()>) {
        self.shared
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn small_config() -> CacheConfig {
        CacheConfig {
            default_ttl_ms: 60_000,
            max_entries: 100,
            eviction_batch_size: 5,
            sweep_interval_ms: 60_000,
            prefetch_threshold: 0.8,
        }
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = Cache::new(small_config());
        cache.set("k", &vec![1, 2, 3], SetOptions::new());
        assert_eq!(cache.get::<Vec<i32>>("k"), Some(vec![1, 2, 3]));
        cache.shutdown();
    }

    #[tokio::test]
    async fn test_get_wrong_type_behaves_as_miss() {
        let cache = Cache::new(small_config());
        cache.set("k", &"text", SetOptions::new());
        assert_eq!(cache.get::<u64>("k"), None);
        cache.shutdown();
    }

    #[tokio::test]
    async fn test_delete_reports_removal() {
        let cache = Cache::new(small_config());
        cache.set("k", &1, SetOptions::new());
        assert!(cache.delete("k"));
        assert!(!cache.delete("k"));
        assert_eq!(cache.get::<i32>("k"), None);
        cache.shutdown();
    }

    #[tokio::test]
    async fn test_invalidate_by_tags_counts_union() {
        let cache = Cache::new(small_config());
        cache.set("a", &1, SetOptions::new().tag("x"));
        cache.set("b", &2, SetOptions::new().tags(["x", "y"]));
        cache.set("c", &3, SetOptions::new().tag("z"));

        assert_eq!(cache.invalidate_by_tags(&["x", "y"]), 2);
        assert_eq!(cache.get::<i32>("c"), Some(3));
        cache.shutdown();
    }

    #[tokio::test]
    async fn test_get_or_set_fetches_once_then_hits() {
        let cache = Cache::new(small_config());
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let value: u32 = cache
                .get_or_set(
                    "k",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, std::io::Error>(7)
                    },
                    GetOrSetOptions::new(),
                )
                .await
                .unwrap();
            assert_eq!(value, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        cache.shutdown();
    }

    #[tokio::test]
    async fn test_get_or_set_failure_caches_nothing() {
        let cache = Cache::new(small_config());

        let result = cache
            .get_or_set(
                "k",
                || async { Err::<u32, _>(std::io::Error::other("boom")) },
                GetOrSetOptions::new(),
            )
            .await;
        assert!(matches!(result, Err(CacheError::Fetch(_))));
        assert_eq!(cache.get::<u32>("k"), None);
        cache.shutdown();
    }

    #[tokio::test]
    async fn test_stats_snapshot() {
        let cache = Cache::new(small_config());
        cache.set("a", &"aa", SetOptions::new());
        cache.get::<String>("a");
        cache.get::<String>("a");
        cache.get::<String>("missing");

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!(stats.memory_estimate_bytes > 0);
        assert_eq!(stats.top_keys[0].key, "a");
        assert_eq!(stats.top_keys[0].access_count, 2);
        cache.shutdown();
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let cache = Cache::new(small_config());
        cache.set("a", &1, SetOptions::new().tag("t"));
        cache.clear();
        cache.clear();
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.invalidate_by_tags(&["t"]), 0);
        cache.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let cache = Cache::new(small_config());
        cache.shutdown();
        cache.shutdown();
    }
}
