//! Tag-indexed, TTL-based cache with request coalescing, background
//! revalidation, least-value eviction, and best-effort cross-context
//! invalidation.
//!
//! ## Architecture
//!
//! ```text
//! domain adapters ──► Cache (get_or_set / get / set / invalidate_by_tags)
//!                       │
//!          ┌────────────┼──────────────┐
//!          ▼            ▼              ▼
//!     EntryStore   Deduplicator   CacheTransport
//!     + TagIndex   (in-flight     (set/delete events
//!     (one lock)    fetches)       to sibling contexts)
//!          ▲
//!          └── sweep task (periodic expiry)
//! ```
//!
//! ## Read path
//!
//! `get_or_set` checks the store first. A hit returns immediately and,
//! when the entry has aged past the prefetch threshold, kicks off a
//! detached refresh. A miss runs the fetcher through the deduplicator so
//! concurrent callers for the same key share one underlying fetch, stores
//! the result, and returns it.
//!
//! ## Invalidation path
//!
//! `invalidate_by_tags` walks the tag index and deletes every matching
//! entry once; deletions are broadcast to sibling contexts as tombstones.
//! Expiry is otherwise lazy on read, backed by a periodic sweep so unread
//! expired entries do not occupy capacity indefinitely.

pub mod broadcast;
pub mod cache;
pub mod config;
pub mod error;
pub mod stats;

mod dedupe;
mod store;

pub use broadcast::{CacheMessage, CacheTransport, ChannelTransport, MessageKind, NoopTransport};
pub use cache::{Cache, GetOrSetOptions, SetOptions};
pub use config::CacheConfig;
pub use error::{CacheError, FetchError};
pub use stats::{CacheStats, KeyAccess};
