//! Per-domain TTL configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// TTLs assigned by the domain adapters, in milliseconds.
///
/// Volatile data (flash sales) gets a short TTL with background
/// revalidation; near-static data (tiers) a long one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    #[serde(default = "default_tiers_ttl_ms")]
    pub tiers_ttl_ms: u64,

    #[serde(default = "default_flash_sales_ttl_ms")]
    pub flash_sales_ttl_ms: u64,

    #[serde(default = "default_product_ttl_ms")]
    pub product_ttl_ms: u64,

    #[serde(default = "default_session_ttl_ms")]
    pub session_ttl_ms: u64,
}

fn default_tiers_ttl_ms() -> u64 {
    1_800_000 // 30 minutes
}

fn default_flash_sales_ttl_ms() -> u64 {
    60_000
}

fn default_product_ttl_ms() -> u64 {
    300_000
}

fn default_session_ttl_ms() -> u64 {
    300_000
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            tiers_ttl_ms: default_tiers_ttl_ms(),
            flash_sales_ttl_ms: default_flash_sales_ttl_ms(),
            product_ttl_ms: default_product_ttl_ms(),
            session_ttl_ms: default_session_ttl_ms(),
        }
    }
}

impl DomainConfig {
    pub fn tiers_ttl(&self) -> Duration {
        Duration::from_millis(self.tiers_ttl_ms)
    }

    pub fn flash_sales_ttl(&self) -> Duration {
        Duration::from_millis(self.flash_sales_ttl_ms)
    }

    pub fn product_ttl(&self) -> Duration {
        Duration::from_millis(self.product_ttl_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_millis(self.session_ttl_ms)
    }
}
