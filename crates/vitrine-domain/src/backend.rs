//! The fetch boundary.
//!
//! Everything behind this trait is an external collaborator: the hosted
//! database/auth backend, the payment-invoice provider, the messaging
//! provider. The cache adapters only ever see "an operation that returns a
//! value or fails" and never look inside.

use async_trait::async_trait;

use crate::types::{FlashSale, Product, Session, Tier};

/// Errors crossing the fetch boundary.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("product {0} not found")]
    ProductNotFound(u64),

    #[error("session not found or expired")]
    SessionNotFound,
}

/// Data source for the storefront adapters.
#[async_trait]
pub trait StorefrontBackend: Send + Sync {
    async fn load_tiers(&self) -> Result<Vec<Tier>, BackendError>;

    async fn load_flash_sales(&self) -> Result<Vec<FlashSale>, BackendError>;

    async fn load_product(&self, id: u64) -> Result<Product, BackendError>;

    async fn load_session(&self, token: &str) -> Result<Session, BackendError>;
}
