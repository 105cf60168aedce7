//! Common test utilities for vidya-billing-core integration tests

pub mod mock_repos;

use chrono::{DateTime, TimeZone, Utc};
use vidya_billing_core::{BillingConfig, BillingService};

#[allow(unused_imports)]
pub use mock_repos::*;

pub const KEY_SECRET: &str = "rzp_test_key_secret";
pub const WEBHOOK_SECRET: &str = "rzp_test_webhook_secret";

/// Fixed clock for deterministic windows
#[allow(dead_code)]
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

/// Billing service over a catalog-seeded in-memory store
#[allow(dead_code)]
pub fn billing() -> (BillingService, MockStore) {
    let store = MockStore::with_catalog();
    let config = BillingConfig::new(KEY_SECRET).with_webhook_secret(WEBHOOK_SECRET);
    (BillingService::new(store.repositories(), config), store)
}
