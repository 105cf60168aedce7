//! Vidya Billing Core - Billing business logic
//!
//! Subscription lifecycle, entitlement metering, payment gateway events,
//! referral rewards, revenue analytics and exports.
//!
//! # Example
//!
//! ```rust,ignore
//! use vidya_billing_core::{BillingConfig, BillingService};
//! use vidya_db::Repositories;
//!
//! let config = BillingConfig::new("rzp_key_secret").with_webhook_secret("whsec_...");
//! let billing = BillingService::new(Repositories::postgres(pool), config);
//!
//! // Gate a feature, then record the use once it ran
//! let check = billing.check_entitlement(user_id, &"doubt_video".into(), Utc::now()).await?;
//! if check.allowed {
//!     billing.increment_usage(user_id, &"doubt_video".into(), Utc::now()).await?;
//! }
//! ```

pub mod config;
pub mod entitlement;
pub mod error;
pub mod export;
pub mod outbox;
pub mod payments;
pub mod plans;
pub mod referral;
pub mod revenue;
pub mod service;
pub mod subscription;
pub mod webhook;

pub use config::{BillingConfig, OutboxConfig};
pub use entitlement::EntitlementLedger;
pub use error::BillingError;
pub use outbox::{OutboxHandler, OutboxProcessor, OutboxRunStats, REFERRAL_REWARD};
pub use payments::{PaymentIngestor, PaymentResult};
pub use plans::PlanCatalog;
pub use referral::ReferralEngine;
pub use revenue::{MonthlyMrr, RevenueAggregator, RevenueMetrics, RevenueSnapshot};
pub use service::{BillingService, WebhookAck};
pub use subscription::{SubscriptionLifecycle, SubscriptionOverview};
pub use webhook::{WebhookEvent, WebhookHandler, SIGNATURE_HEADER};
