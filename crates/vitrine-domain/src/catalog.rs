//! Catalog data cached through the core.
//!
//! TTL and tag policy per kind of data:
//! - tiers: long TTL, changes only on repricing
//! - flash sales: short TTL with background revalidation, hot and volatile
//! - products: medium TTL, one per-product tag for targeted invalidation

use std::sync::Arc;

use vitrine_cache::{Cache, CacheError, GetOrSetOptions};

use crate::backend::StorefrontBackend;
use crate::config::DomainConfig;
use crate::types::{FlashSale, Product, Tier};

const KEY_TIERS: &str = "tiers:all";
const KEY_FLASH_SALES: &str = "flash-sales:active";

/// Tag carried by every catalog entry; invalidating it flushes the whole
/// catalog after a bulk import.
pub const TAG_CATALOG: &str = "catalog";
pub const TAG_TIERS: &str = "tiers";
pub const TAG_PRODUCTS: &str = "products";
pub const TAG_FLASH_SALES: &str = "flash-sales";

fn product_key(id: u64) -> String {
    format!("product:{id}")
}

/// Read-through catalog adapter.
pub struct CatalogCache {
    cache: Cache,
    backend: Arc<dyn StorefrontBackend>,
    config: DomainConfig,
}

impl CatalogCache {
    pub fn new(cache: Cache, backend: Arc<dyn StorefrontBackend>, config: DomainConfig) -> Self {
        Self {
            cache,
            backend,
            config,
        }
    }

    pub async fn tiers(&self) -> Result<Vec<Tier>, CacheError> {
        let backend = Arc::clone(&self.backend);
        self.cache
            .get_or_set(
                KEY_TIERS,
                move || async move { backend.load_tiers().await },
                GetOrSetOptions::new()
                    .ttl(self.config.tiers_ttl())
                    .tags([TAG_CATALOG, TAG_TIERS]),
            )
            .await
    }

    /// Active flash sales. Served from cache with a background refresh
    /// once the entry ages past the prefetch threshold, so the storefront
    /// never waits on the backend for a list that changes by the minute.
    pub async fn flash_sales(&self) -> Result<Vec<FlashSale>, CacheError> {
        let backend = Arc::clone(&self.backend);
        self.cache
            .get_or_set(
                KEY_FLASH_SALES,
                move || async move { backend.load_flash_sales().await },
                GetOrSetOptions::new()
                    .ttl(self.config.flash_sales_ttl())
                    .tags([TAG_CATALOG, TAG_FLASH_SALES])
                    .prefetch(true),
            )
            .await
    }

    pub async fn product(&self, id: u64) -> Result<Product, CacheError> {
        let backend = Arc::clone(&self.backend);
        self.cache
            .get_or_set(
                &product_key(id),
                move || async move { backend.load_product(id).await },
                GetOrSetOptions::new()
                    .ttl(self.config.product_ttl())
                    .tags([
                        TAG_CATALOG.to_string(),
                        TAG_PRODUCTS.to_string(),
                        product_key(id),
                    ]),
            )
            .await
    }

    /// Drop one product after a mutation (price change, stock update).
    pub fn invalidate_product(&self, id: u64) -> usize {
        self.cache.invalidate_by_tags(&[product_key(id)])
    }

    /// Drop every catalog entry, e.g. after a bulk import.
    pub fn invalidate_catalog(&self) -> usize {
        let removed = self.cache.invalidate_by_tags(&[TAG_CATALOG]);
        tracing::debug!(removed, "catalog invalidated");
        removed
    }
}
