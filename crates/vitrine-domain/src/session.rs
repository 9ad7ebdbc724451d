//! Session data cached through the core.
//!
//! Entries are keyed by a hash of the bearer token, so raw tokens never
//! appear in cache keys or broadcast messages. A revoked token is removed
//! immediately; `logout_all` empties the whole cache as part of a hard
//! reset.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use vitrine_cache::{Cache, CacheError, GetOrSetOptions};

use crate::backend::StorefrontBackend;
use crate::config::DomainConfig;
use crate::types::Session;

pub const TAG_SESSIONS: &str = "sessions";

fn session_key(token: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    token.hash(&mut hasher);
    format!("session:{:016x}", hasher.finish())
}

/// Read-through session adapter.
pub struct SessionCache {
    cache: Cache,
    backend: Arc<dyn StorefrontBackend>,
    config: DomainConfig,
}

impl SessionCache {
    pub fn new(cache: Cache, backend: Arc<dyn StorefrontBackend>, config: DomainConfig) -> Self {
        Self {
            cache,
            backend,
            config,
        }
    }

    pub async fn session(&self, token: &str) -> Result<Session, CacheError> {
        let backend = Arc::clone(&self.backend);
        let owned_token = token.to_string();
        self.cache
            .get_or_set(
                &session_key(token),
                move || async move { backend.load_session(&owned_token).await },
                GetOrSetOptions::new()
                    .ttl(self.config.session_ttl())
                    .tag(TAG_SESSIONS),
            )
            .await
    }

    /// Remove one session after token revocation. Returns whether a
    /// cached session was present.
    pub fn invalidate(&self, token: &str) -> bool {
        self.cache.delete(&session_key(token))
    }

    /// Remove every cached session, e.g. after a credential rotation.
    pub fn invalidate_all(&self) -> usize {
        self.cache.invalidate_by_tags(&[TAG_SESSIONS])
    }

    /// Hard reset on logout: empties the entire cache, not just sessions.
    pub fn logout_all(&self) {
        self.cache.clear();
    }
}
