//! Entry store and tag index.
//!
//! Both structures live behind one lock (owned by [`crate::Cache`]) because
//! `insert` composes a read-modify-write over the entry table and the tag
//! index, and must not interleave with a concurrent `invalidate_by_tags` or
//! `sweep_expired`. Nothing in this module blocks or awaits.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

/// Weight applied to an entry's access count when scoring eviction
/// candidates. Favors frequently-accessed entries surviving bursts of
/// unrelated inserts despite being less recent. Tunable, not a contract.
const FREQUENCY_WEIGHT: u64 = 1000;

/// One cached value with its bookkeeping.
pub(crate) struct CacheEntry {
    pub value: Arc<Value>,
    pub created_at: Instant,
    pub last_accessed: Instant,
    pub ttl: Duration,
    pub access_count: u64,
    pub tags: Vec<String>,
    /// Serialized length captured at insert. Observability only.
    pub size_bytes: usize,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.created_at + self.ttl
    }

    /// Elapsed fraction of this entry's TTL, used by the revalidation
    /// decision. An entry with a zero TTL counts as fully aged.
    pub fn age_fraction(&self, now: Instant) -> f64 {
        if self.ttl.is_zero() {
            return 1.0;
        }
        now.duration_since(self.created_at).as_secs_f64() / self.ttl.as_secs_f64()
    }
}

/// Result of an insert attempt.
pub(crate) struct InsertOutcome {
    pub inserted: bool,
    pub evicted: usize,
}

/// Entry table plus the tag secondary index.
///
/// Invariants, restored after every operation:
/// - every tag in an entry's tag set maps back to that entry's key in the
///   index, and every indexed key carries the tag;
/// - no tag maps to an empty key set.
pub(crate) struct EntryStore {
    entries: HashMap<String, CacheEntry>,
    tags: HashMap<String, HashSet<String>>,
    max_entries: usize,
    eviction_batch_size: usize,
    /// Reference point for eviction scoring timestamps.
    epoch: Instant,
}

impl EntryStore {
    pub fn new(max_entries: usize, eviction_batch_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            tags: HashMap::new(),
            max_entries,
            eviction_batch_size: eviction_batch_size.max(1),
            epoch: Instant::now(),
        }
    }

    /// Look up a live entry, updating its access bookkeeping.
    ///
    /// An expired entry is removed on the spot and reported as absent; the
    /// caller cannot distinguish "never set" from "expired".
    pub fn get(&mut self, key: &str, now: Instant) -> Option<Arc<Value>> {
        match self.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.last_accessed = now;
                entry.access_count += 1;
                Some(Arc::clone(&entry.value))
            }
            Some(_) => {
                self.remove(key);
                None
            }
            None => None,
        }
    }

    /// Peek at an entry without access bookkeeping. Used by the
    /// revalidation decision after a hit has already been counted.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Insert or overwrite an entry, evicting first when at capacity.
    ///
    /// If the store is still full after an eviction pass (only possible
    /// with `max_entries == 0`), the insert is skipped.
    pub fn insert(
        &mut self,
        key: String,
        value: Arc<Value>,
        ttl: Duration,
        tags: Vec<String>,
        now: Instant,
    ) -> InsertOutcome {
        let mut evicted = 0;
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            evicted = self.evict_batch();
            if self.entries.len() >= self.max_entries {
                tracing::warn!(
                    key = %key,
                    max_entries = self.max_entries,
                    "cache at capacity, skipping insert"
                );
                return InsertOutcome {
                    inserted: false,
                    evicted,
                };
            }
        }

        let size_bytes = value.to_string().len();
        if let Some(old) = self.entries.remove(&key) {
            self.unindex(&key, &old.tags);
        }
        self.index(&key, &tags);
        self.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                last_accessed: now,
                ttl,
                access_count: 0,
                tags,
                size_bytes,
            },
        );
        InsertOutcome {
            inserted: true,
            evicted,
        }
    }

    /// Remove an entry and its tag associations.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.unindex(key, &entry.tags);
                true
            }
            None => false,
        }
    }

    /// Delete every entry carrying any of the given tags.
    ///
    /// Keys are collected as a set union first so an entry tagged with
    /// several of the requested tags is deleted exactly once; the result
    /// does not depend on tag order. Returns the removed keys.
    pub fn invalidate_by_tags<S: AsRef<str>>(&mut self, tags: &[S]) -> Vec<String> {
        let mut keys: HashSet<String> = HashSet::new();
        for tag in tags {
            if let Some(tagged) = self.tags.get(tag.as_ref()) {
                keys.extend(tagged.iter().cloned());
            }
        }
        let keys: Vec<String> = keys.into_iter().collect();
        for key in &keys {
            self.remove(key);
        }
        keys
    }

    /// Remove every expired entry regardless of access. Returns the count.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.tags.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Sum of the per-entry serialized sizes.
    pub fn memory_estimate(&self) -> usize {
        self.entries.values().map(|e| e.size_bytes).sum()
    }

    /// The `n` most-accessed keys, most accessed first.
    pub fn top_keys(&self, n: usize) -> Vec<(String, u64)> {
        let mut keys: Vec<(String, u64)> = self
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.access_count))
            .collect();
        keys.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        keys.truncate(n);
        keys
    }

    /// Evict the lowest-scoring entries to free capacity.
    ///
    /// Score is recency with a frequency bonus: entries accessed often
    /// survive even when a burst of unrelated inserts makes them less
    /// recent than the newcomers.
    fn evict_batch(&mut self) -> usize {
        let batch = self.eviction_batch_size.min(self.entries.len());
        if batch == 0 {
            return 0;
        }
        let mut scored: Vec<(String, u64)> = self
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), self.score(entry)))
            .collect();
        scored.sort_by_key(|(_, score)| *score);
        let victims: Vec<String> = scored.into_iter().take(batch).map(|(key, _)| key).collect();
        for key in &victims {
            self.remove(key);
            tracing::debug!(key = %key, "evicted");
        }
        victims.len()
    }

    fn score(&self, entry: &CacheEntry) -> u64 {
        let recency = entry.last_accessed.duration_since(self.epoch).as_millis() as u64;
        recency + entry.access_count * FREQUENCY_WEIGHT
    }

    fn index(&mut self, key: &str, tags: &[String]) {
        for tag in tags {
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    fn unindex(&mut self, key: &str, tags: &[String]) {
        for tag in tags {
            if let Some(tagged) = self.tags.get_mut(tag) {
                tagged.remove(key);
                if tagged.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn val(n: i64) -> Arc<Value> {
        Arc::new(Value::from(n))
    }

    fn insert(store: &mut EntryStore, key: &str, tags: &[&str]) {
        store.insert(
            key.to_string(),
            val(1),
            Duration::from_secs(60),
            tags.iter().map(|t| t.to_string()).collect(),
            Instant::now(),
        );
    }

    /// Every tag maps back to a live key and no tag has an empty key set.
    fn assert_index_consistent(store: &EntryStore) {
        for (tag, keys) in &store.tags {
            assert!(!keys.is_empty(), "tag {tag} maps to an empty set");
            for key in keys {
                let entry = store.entries.get(key).expect("indexed key missing");
                assert!(entry.tags.contains(tag), "entry {key} lost tag {tag}");
            }
        }
        for (key, entry) in &store.entries {
            for tag in &entry.tags {
                assert!(
                    store.tags.get(tag).is_some_and(|keys| keys.contains(key)),
                    "tag {tag} of {key} not indexed"
                );
            }
        }
    }

    #[test]
    fn test_get_returns_live_entry() {
        let mut store = EntryStore::new(10, 2);
        insert(&mut store, "k", &[]);
        assert!(store.get("k", Instant::now()).is_some());
        assert_eq!(store.peek("k").unwrap().access_count, 1);
    }

    #[test]
    fn test_zero_ttl_is_immediately_expired() {
        let mut store = EntryStore::new(10, 2);
        store.insert("k".into(), val(1), Duration::ZERO, vec![], Instant::now());
        assert!(store.get("k", Instant::now()).is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_expired_entry_removed_on_read() {
        let mut store = EntryStore::new(10, 2);
        let created = Instant::now();
        store.insert(
            "k".into(),
            val(1),
            Duration::from_millis(10),
            vec!["t".into()],
            created,
        );
        assert!(store.get("k", created + Duration::from_millis(50)).is_none());
        assert_eq!(store.len(), 0);
        assert_index_consistent(&store);
        assert!(store.tags.is_empty());
    }

    #[test]
    fn test_overwrite_reindexes_tags() {
        let mut store = EntryStore::new(10, 2);
        insert(&mut store, "k", &["a", "b"]);
        insert(&mut store, "k", &["b", "c"]);
        assert_index_consistent(&store);
        assert!(!store.tags.contains_key("a"));
        assert!(store.tags.contains_key("c"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_invalidate_by_tags_deletes_union_once() {
        let mut store = EntryStore::new(10, 2);
        insert(&mut store, "k1", &["a"]);
        insert(&mut store, "k2", &["a", "b"]);
        insert(&mut store, "k3", &["b"]);
        insert(&mut store, "k4", &["c"]);

        // k2 carries both tags but is deleted exactly once
        let removed = store.invalidate_by_tags(&["a", "b"]);
        assert_eq!(removed.len(), 3);
        assert_eq!(store.len(), 1);
        assert!(store.get("k4", Instant::now()).is_some());
        assert_index_consistent(&store);
    }

    #[test]
    fn test_invalidate_unknown_tag_is_noop() {
        let mut store = EntryStore::new(10, 2);
        insert(&mut store, "k", &["a"]);
        assert!(store.invalidate_by_tags(&["nope"]).is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let mut store = EntryStore::new(10, 2);
        let now = Instant::now();
        store.insert(
            "old".into(),
            val(1),
            Duration::from_millis(10),
            vec!["t".into()],
            now,
        );
        store.insert(
            "fresh".into(),
            val(2),
            Duration::from_secs(60),
            vec!["t".into()],
            now,
        );
        assert_eq!(store.sweep_expired(now + Duration::from_millis(50)), 1);
        assert_eq!(store.len(), 1);
        assert_index_consistent(&store);
    }

    #[test]
    fn test_eviction_prefers_low_score() {
        let mut store = EntryStore::new(3, 1);
        let now = Instant::now();
        insert(&mut store, "cold", &[]);
        insert(&mut store, "warm", &[]);
        insert(&mut store, "hot", &[]);
        // Access counts separate the scores; recency is near-identical here
        store.get("warm", now);
        for _ in 0..5 {
            store.get("hot", now);
        }

        let outcome = store.insert("new".into(), val(9), Duration::from_secs(60), vec![], now);
        assert!(outcome.inserted);
        assert_eq!(outcome.evicted, 1);
        assert_eq!(store.len(), 3);
        assert!(store.peek("cold").is_none());
        assert!(store.peek("hot").is_some());
    }

    #[test]
    fn test_eviction_batch_size() {
        let mut store = EntryStore::new(4, 3);
        let now = Instant::now();
        for key in ["a", "b", "c", "d"] {
            insert(&mut store, key, &[]);
        }
        let outcome = store.insert("e".into(), val(9), Duration::from_secs(60), vec![], now);
        assert!(outcome.inserted);
        assert_eq!(outcome.evicted, 3);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_zero_capacity_refuses_inserts() {
        let mut store = EntryStore::new(0, 2);
        let outcome = store.insert("k".into(), val(1), Duration::from_secs(60), vec![], Instant::now());
        assert!(!outcome.inserted);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let mut store = EntryStore::new(2, 1);
        insert(&mut store, "a", &[]);
        insert(&mut store, "b", &[]);
        let outcome = store.insert(
            "a".into(),
            val(2),
            Duration::from_secs(60),
            vec![],
            Instant::now(),
        );
        assert!(outcome.inserted);
        assert_eq!(outcome.evicted, 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_top_keys_ordering() {
        let mut store = EntryStore::new(10, 2);
        let now = Instant::now();
        for key in ["a", "b", "c"] {
            insert(&mut store, key, &[]);
        }
        for _ in 0..3 {
            store.get("b", now);
        }
        store.get("c", now);

        let top = store.top_keys(2);
        assert_eq!(top, vec![("b".to_string(), 3), ("c".to_string(), 1)]);
    }

    #[test]
    fn test_clear_empties_both_structures() {
        let mut store = EntryStore::new(10, 2);
        insert(&mut store, "k", &["t"]);
        store.clear();
        store.clear(); // idempotent
        assert_eq!(store.len(), 0);
        assert!(store.tags.is_empty());
    }
}
