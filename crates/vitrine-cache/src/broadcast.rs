//! Best-effort propagation of cache mutations to sibling contexts.
//!
//! A transport carries `set`/`delete` events between cache instances of
//! the same logical client so a sibling does not keep serving data the
//! originating context has invalidated. This is an optimization, not a
//! consistency protocol: delivery is at-most-once and unordered, and
//! recipients tolerate missing or duplicate messages. The worst outcome of
//! a lost message is a sibling serving a slightly stale value until its
//! own TTL or sweep catches up.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default buffer size for the in-process broadcast channel. Slow
/// receivers past this limit lose the oldest messages.
const DEFAULT_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Set,
    Delete,
}

/// One cache mutation on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub key: String,
    /// Present for `set`, absent for delete tombstones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Wall-clock publish time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Identity of the publishing cache instance. A recipient drops its
    /// own messages, the way a storage event never fires on the context
    /// that wrote it.
    pub origin: Uuid,
}

impl CacheMessage {
    pub fn set(origin: Uuid, key: String, value: serde_json::Value, tags: Vec<String>) -> Self {
        Self {
            kind: MessageKind::Set,
            key,
            value: Some(value),
            tags,
            timestamp: now_ms(),
            origin,
        }
    }

    pub fn delete(origin: Uuid, key: String) -> Self {
        Self {
            kind: MessageKind::Delete,
            key,
            value: None,
            tags: Vec::new(),
            timestamp: now_ms(),
            origin,
        }
    }
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Transport seam between sibling cache instances.
///
/// The core is transport-agnostic: a single-context deployment uses
/// [`NoopTransport`], sibling instances in one process share a
/// [`ChannelTransport`], and a multi-process deployment plugs in its own
/// implementation over whatever side channel it has.
pub trait CacheTransport: Send + Sync {
    /// Publish a mutation, fire-and-forget. There is no backpressure
    /// contract; a saturated transport may drop messages silently.
    fn publish(&self, message: CacheMessage);

    /// Subscribe to mutations from sibling contexts. Transports with no
    /// inbound side return `None`.
    fn subscribe(&self) -> Option<broadcast::Receiver<CacheMessage>>;
}

/// Single-context transport: publishes nowhere, receives nothing.
pub struct NoopTransport;

impl CacheTransport for NoopTransport {
    fn publish(&self, _message: CacheMessage) {}

    fn subscribe(&self) -> Option<broadcast::Receiver<CacheMessage>> {
        None
    }
}

/// In-process transport over a tokio broadcast channel.
///
/// Cloning the transport shares the underlying channel, so every cache
/// constructed with a clone of the same `ChannelTransport` sees the
/// others' mutations.
#[derive(Clone)]
pub struct ChannelTransport {
    sender: broadcast::Sender<CacheMessage>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Number of attached receivers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheTransport for ChannelTransport {
    fn publish(&self, message: CacheMessage) {
        // Publishing with no subscribers is not an error
        let _ = self.sender.send(message);
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<CacheMessage>> {
        Some(self.sender.subscribe())
    }
}
