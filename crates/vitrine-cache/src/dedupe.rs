//! Request deduplication (coalescing of concurrent identical fetches).

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio::sync::watch;

use crate::error::CacheError;

/// Outcome of one underlying fetch, shared by every coalesced waiter.
pub(crate) type FetchOutcome = Result<Arc<Value>, CacheError>;

type OutcomeReceiver = watch::Receiver<Option<FetchOutcome>>;

/// Tracks in-flight fetches by key so concurrent callers share one
/// underlying fetch.
///
/// The first caller for a key becomes the leader: it installs a channel
/// and spawns the fetch as a detached task. The task runs to completion
/// even if every caller abandons its await, so the result still lands in
/// the store for the benefit of later reads. Waiters clone the channel and
/// observe the same settled outcome, success or failure.
///
/// The in-flight entry is removed when the fetch settles, immediately
/// before the outcome is published; a caller that arrives after removal
/// starts a fresh fetch (or, on the orchestrated path, finds the value
/// already cached).
pub(crate) struct RequestDeduplicator {
    in_flight: Arc<DashMap<String, OutcomeReceiver>>,
}

impl RequestDeduplicator {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Run `fetch` for `key`, or join the fetch already running for it.
    ///
    /// `fetch` is invoked at most once per in-flight window; joining
    /// callers never invoke it.
    pub async fn run<F, Fut>(&self, key: &str, fetch: F) -> FetchOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchOutcome> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let joined = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                vacant.insert(rx.clone());
                let fut = fetch();
                let in_flight = Arc::clone(&self.in_flight);
                let key = key.to_string();
                // Detached so an abandoned caller cannot cancel the shared
                // fetch. Remove-before-send: once the outcome is visible
                // the in-flight window is already closed.
                tokio::spawn(async move {
                    let outcome = fut.await;
                    in_flight.remove(&key);
                    let _ = tx.send(Some(outcome));
                });
                rx
            }
        };
        Self::wait(joined).await
    }

    /// Number of fetches currently in flight.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    async fn wait(mut rx: OutcomeReceiver) -> FetchOutcome {
        match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(settled) => settled
                .clone()
                .unwrap_or_else(|| Err(CacheError::fetch("empty fetch outcome"))),
            // Sender dropped without settling (fetch task panicked)
            Err(_) => Err(CacheError::fetch("in-flight fetch was interrupted")),
        }
    }
}
