//! Storefront domain adapters over the vitrine cache core.
//!
//! Each adapter wraps one domain (catalog, sessions), assigns the TTLs
//! and tags appropriate to its data, and reads through the cache to the
//! [`backend::StorefrontBackend`] fetch boundary. Adapters are the cache's
//! only clients; nothing here touches cache internals.
//!
//! ```ignore
//! let cache = Cache::new(CacheConfig::default());
//! let backend: Arc<dyn StorefrontBackend> = Arc::new(HostedBackend::connect(..).await?);
//!
//! let catalog = CatalogCache::new(cache.clone(), backend.clone(), DomainConfig::default());
//! let tiers = catalog.tiers().await?;
//! ```

pub mod backend;
pub mod catalog;
pub mod config;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use backend::{BackendError, StorefrontBackend};
pub use catalog::CatalogCache;
pub use config::DomainConfig;
pub use session::SessionCache;
pub use types::{FlashSale, Product, Session, Tier};
