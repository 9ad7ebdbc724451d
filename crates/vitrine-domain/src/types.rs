//! Storefront domain types carried through the cache.

use serde::{Deserialize, Serialize};

/// A pricing tier shown on the storefront.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub id: String,
    pub name: String,
    pub price_cents: u64,
    pub perks: Vec<String>,
}

/// A time-boxed discount campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashSale {
    pub id: String,
    pub product_id: u64,
    pub discount_pct: u8,
    /// Unix epoch milliseconds.
    pub ends_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub title: String,
    pub price_cents: u64,
    pub in_stock: bool,
}

/// An authenticated storefront session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub roles: Vec<String>,
    /// Unix epoch milliseconds.
    pub expires_at_ms: i64,
}
