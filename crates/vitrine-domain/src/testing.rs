//! Shared test double for the fetch boundary.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::backend::{BackendError, StorefrontBackend};
use crate::types::{FlashSale, Product, Session, Tier};

/// Backend double counting calls per operation. Product id 404 is never
/// found; `fail_*` flags simulate an outage.
#[derive(Default)]
pub struct MockBackend {
    pub tiers_calls: AtomicUsize,
    pub flash_sales_calls: AtomicUsize,
    pub product_calls: AtomicUsize,
    pub session_calls: AtomicUsize,
    pub fail_tiers: AtomicBool,
}

#[async_trait]
impl StorefrontBackend for MockBackend {
    async fn load_tiers(&self) -> Result<Vec<Tier>, BackendError> {
        self.tiers_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_tiers.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("maintenance window".into()));
        }
        Ok(vec![
            Tier {
                id: "basic".into(),
                name: "Basic".into(),
                price_cents: 0,
                perks: vec![],
            },
            Tier {
                id: "plus".into(),
                name: "Plus".into(),
                price_cents: 900,
                perks: vec!["free shipping".into()],
            },
            Tier {
                id: "pro".into(),
                name: "Pro".into(),
                price_cents: 2900,
                perks: vec!["free shipping".into(), "early access".into()],
            },
        ])
    }

    async fn load_flash_sales(&self) -> Result<Vec<FlashSale>, BackendError> {
        self.flash_sales_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![FlashSale {
            id: "fs-1".into(),
            product_id: 1,
            discount_pct: 25,
            ends_at_ms: 0,
        }])
    }

    async fn load_product(&self, id: u64) -> Result<Product, BackendError> {
        self.product_calls.fetch_add(1, Ordering::SeqCst);
        if id == 404 {
            return Err(BackendError::ProductNotFound(id));
        }
        Ok(Product {
            id,
            title: format!("Product {id}"),
            price_cents: 1000 + id,
            in_stock: true,
        })
    }

    async fn load_session(&self, token: &str) -> Result<Session, BackendError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Session {
            user_id: format!("user-{token}"),
            email: format!("{token}@example.com"),
            roles: vec!["customer".into()],
            expires_at_ms: i64::MAX,
        })
    }
}
