//! Billing service - ties together subscriptions, entitlements, payments,
//! referrals, revenue and exports behind one handle

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use vidya_db::Repositories;
use vidya_types::{
    CouponValidation, DailyRevenue, Entitlement, EntitlementCheck, FeatureSlug, Invoice,
    ReferralStatus, RewardOutcome, Subscription, SubscriptionStatus, UsageIncrement, UserId,
    UserProfile,
};

use crate::config::BillingConfig;
use crate::entitlement::EntitlementLedger;
use crate::error::BillingError;
use crate::export::{schedule_ics, transactions_csv};
use crate::outbox::{OutboxProcessor, OutboxRunStats, ReferralRewardHandler, REFERRAL_REWARD};
use crate::payments::{PaymentIngestor, PaymentResult};
use crate::plans::PlanCatalog;
use crate::referral::ReferralEngine;
use crate::revenue::{RevenueAggregator, RevenueMetrics};
use crate::subscription::{SubscriptionLifecycle, SubscriptionOverview};
use crate::webhook::{verify_payment_signature, WebhookEvent, WebhookHandler};

/// Days covered by the daily revenue series
const DAILY_REVENUE_DAYS: i32 = 30;

/// Acknowledgement returned to the gateway
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    /// Always true once the signature checked out and the body parsed
    pub received: bool,
    pub event: String,
    /// False for event types this service ignores
    pub handled: bool,
    /// For payment events: false when the payment had already been applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<bool>,
}

impl WebhookAck {
    fn handled(event: &WebhookEvent, applied: Option<bool>) -> Self {
        Self {
            received: true,
            event: event.name().to_string(),
            handled: true,
            applied,
        }
    }

    fn ignored(event: &str) -> Self {
        Self {
            received: true,
            event: event.to_string(),
            handled: false,
            applied: None,
        }
    }
}

fn record_duration(operation: &'static str, start: Instant, success: bool) {
    metrics::histogram!(
        "billing_operation_duration_seconds",
        "operation" => operation,
        "result" => if success { "ok" } else { "err" }
    )
    .record(start.elapsed().as_secs_f64());
}

/// Billing service
///
/// Provides a unified interface for:
/// - Subscription lifecycle and lazy expiry
/// - Entitlement checks and usage counting
/// - Gateway webhooks and client-side payment verification
/// - Referral rewards, revenue metrics and exports
#[derive(Clone)]
pub struct BillingService {
    config: BillingConfig,
    repos: Repositories,
    webhooks: WebhookHandler,
    lifecycle: SubscriptionLifecycle,
    entitlements: EntitlementLedger,
    payments: PaymentIngestor,
    referrals: ReferralEngine,
    revenue: RevenueAggregator,
    outbox: OutboxProcessor,
}

impl BillingService {
    /// Create a new billing service
    pub fn new(repos: Repositories, config: BillingConfig) -> Self {
        let plans = PlanCatalog::new(Arc::clone(&repos.plans), config.plan_cache_ttl);
        let lifecycle = SubscriptionLifecycle::new(
            Arc::clone(&repos.subscriptions),
            Arc::clone(&repos.audit),
            plans.clone(),
            config.trial_days,
        );
        let entitlements = EntitlementLedger::new(
            Arc::clone(&repos.entitlements),
            lifecycle.clone(),
            config.free_tier,
        );
        let payments = PaymentIngestor::new(
            Arc::clone(&repos.payments),
            Arc::clone(&repos.subscriptions),
            Arc::clone(&repos.referrals),
            plans,
        );
        let referrals = ReferralEngine::new(
            Arc::clone(&repos.referrals),
            Arc::clone(&repos.subscriptions),
            config.referral_monthly_cap,
            config.referral_reward_days,
        );
        let revenue = RevenueAggregator::new(
            Arc::clone(&repos.subscriptions),
            Arc::clone(&repos.plans),
            Arc::clone(&repos.payments),
            Arc::clone(&repos.referrals),
            Arc::clone(&repos.users),
        );
        let outbox = OutboxProcessor::new(Arc::clone(&repos.outbox), config.outbox).with_handler(
            REFERRAL_REWARD,
            Arc::new(ReferralRewardHandler::new(referrals.clone())),
        );

        Self {
            webhooks: WebhookHandler::new(config.webhook_secret.clone()),
            config,
            repos,
            lifecycle,
            entitlements,
            payments,
            referrals,
            revenue,
            outbox,
        }
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscription overview, applying lazy expiry
    pub async fn subscription(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionOverview, BillingError> {
        self.lifecycle.overview(user_id, now).await
    }

    pub async fn start_trial(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Subscription, BillingError> {
        self.lifecycle.start_trial(user_id, now).await
    }

    pub async fn cancel_subscription(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Subscription, BillingError> {
        self.lifecycle.cancel(user_id, now).await
    }

    // =========================================================================
    // Entitlements
    // =========================================================================

    pub async fn check_entitlement(
        &self,
        user_id: UserId,
        feature: &FeatureSlug,
        now: DateTime<Utc>,
    ) -> Result<EntitlementCheck, BillingError> {
        self.entitlements.check(user_id, feature, now).await
    }

    pub async fn increment_usage(
        &self,
        user_id: UserId,
        feature: &FeatureSlug,
        now: DateTime<Utc>,
    ) -> Result<UsageIncrement, BillingError> {
        self.entitlements.increment_usage(user_id, feature, now).await
    }

    pub async fn usage_summary(&self, user_id: UserId) -> Result<Vec<Entitlement>, BillingError> {
        self.entitlements.usage_summary(user_id).await
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Verify and apply a gateway webhook.
    ///
    /// Errors inside a recognized event propagate so the gateway retries.
    #[instrument(skip(self, payload, signature))]
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WebhookAck, BillingError> {
        let start = Instant::now();
        let result = self.dispatch_webhook(payload, signature, now).await;

        let status = match &result {
            Ok(ack) if !ack.handled => "ignored",
            Ok(_) => "success",
            Err(BillingError::InvalidSignature) => "invalid_signature",
            Err(_) => "error",
        };
        metrics::counter!("billing_webhooks_processed_total", "status" => status).increment(1);
        record_duration("process_webhook", start, result.is_ok());

        result
    }

    async fn dispatch_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WebhookAck, BillingError> {
        let event = self.webhooks.verify_and_parse(payload, signature)?;

        let applied = match &event {
            WebhookEvent::PaymentCaptured(payment) => {
                Some(self.payments.handle_captured(payment, now).await?.applied)
            }
            WebhookEvent::PaymentFailed(payment) => {
                self.payments.handle_failed(payment).await?;
                None
            }
            WebhookEvent::SubscriptionActivated(entity) => {
                self.payments
                    .handle_status_change(entity, SubscriptionStatus::Active, now)
                    .await?;
                None
            }
            WebhookEvent::SubscriptionCancelled(entity) => {
                self.payments
                    .handle_status_change(entity, SubscriptionStatus::Canceled, now)
                    .await?;
                None
            }
            WebhookEvent::SubscriptionCharged {
                subscription,
                payment,
            } => Some(
                self.payments
                    .handle_charged(subscription, payment, now)
                    .await?
                    .applied,
            ),
            WebhookEvent::Unknown(name) => {
                info!(event = %name, "unhandled webhook event acknowledged");
                return Ok(WebhookAck::ignored(name));
            }
        };

        Ok(WebhookAck::handled(&event, applied))
    }

    /// Client-side confirmation after checkout
    #[instrument(skip(self, signature), fields(user_id = %user_id))]
    pub async fn verify_payment(
        &self,
        user_id: UserId,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentResult, BillingError> {
        let start = Instant::now();
        let result = async {
            verify_payment_signature(
                gateway_order_id,
                gateway_payment_id,
                signature,
                &self.config.key_secret,
            )?;
            self.payments
                .capture_verified(user_id, gateway_order_id, gateway_payment_id, now)
                .await
        }
        .await;
        record_duration("verify_payment", start, result.is_ok());
        result
    }

    pub async fn invoices(&self, user_id: UserId) -> Result<Vec<Invoice>, BillingError> {
        Ok(self.repos.payments.list_invoices_for_user(user_id).await?)
    }

    /// Coupon check through the store's validation routine
    pub async fn validate_coupon(
        &self,
        user_id: UserId,
        code: &str,
        plan_slug: &str,
        amount_paise: i64,
    ) -> Result<CouponValidation, BillingError> {
        Ok(self
            .repos
            .payments
            .validate_coupon(code.trim(), user_id, plan_slug, amount_paise)
            .await?)
    }

    // =========================================================================
    // Referrals
    // =========================================================================

    pub async fn apply_referral_reward(
        &self,
        referred_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<RewardOutcome, BillingError> {
        self.referrals.apply_reward(referred_id, now).await
    }

    pub async fn advance_referral(
        &self,
        referred_id: UserId,
        to: ReferralStatus,
    ) -> Result<bool, BillingError> {
        self.referrals.advance(referred_id, to).await
    }

    /// Process one batch of outbox items
    pub async fn run_outbox(&self, now: DateTime<Utc>) -> Result<OutboxRunStats, BillingError> {
        self.outbox.run_once(now).await
    }

    // =========================================================================
    // Analytics & exports
    // =========================================================================

    pub async fn revenue_metrics(&self, now: DateTime<Utc>) -> RevenueMetrics {
        let start = Instant::now();
        let metrics = self.revenue.metrics(now).await;
        record_duration("revenue_metrics", start, true);
        metrics
    }

    pub async fn daily_revenue(&self) -> Vec<DailyRevenue> {
        self.revenue.daily_revenue(DAILY_REVENUE_DAYS).await
    }

    /// Transactions in `[from, to)` as CSV
    pub async fn export_transactions_csv(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<String, BillingError> {
        let rows = self.repos.payments.export_transactions(from, to).await?;
        Ok(transactions_csv(&rows))
    }

    /// The user's study schedule as an iCalendar feed
    pub async fn calendar(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<String, BillingError> {
        let tasks = self.repos.schedule.list_for_user(user_id).await?;
        Ok(schedule_ics(&tasks, &self.config.calendar_uid_domain, now))
    }

    /// Profile of a user, used for role checks
    pub async fn profile(&self, user_id: UserId) -> Result<Option<UserProfile>, BillingError> {
        Ok(self.repos.users.find_by_id(user_id).await?)
    }
}
