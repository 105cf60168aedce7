//! Application state for the Vidya API service.

use std::sync::Arc;

use vidya_auth_core::TokenValidator;
use vidya_billing_core::BillingService;
use vidya_db::DbPool;

use crate::config::Config;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Billing service (subscriptions, entitlements, payments, referrals, analytics)
    pub billing: Arc<BillingService>,
    /// Access-token validator
    pub auth: Arc<TokenValidator>,
    /// Database pool, used by the readiness probe
    pub pool: DbPool,
    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        billing: BillingService,
        auth: TokenValidator,
        pool: DbPool,
        config: Config,
    ) -> Self {
        Self {
            billing: Arc::new(billing),
            auth: Arc::new(auth),
            pool,
            config: Arc::new(config),
        }
    }

    /// Get request timeout from config
    pub fn request_timeout(&self) -> std::time::Duration {
        self.config.request_timeout
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
