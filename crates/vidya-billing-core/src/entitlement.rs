//! Entitlement ledger
//!
//! Decides whether a user may use a feature right now. Trials and paid
//! subscriptions bypass the counters; everyone else is metered per feature
//! with a rolling daily window. Checking never consumes; callers record a
//! use with [`EntitlementLedger::increment_usage`] after the feature ran.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument};

use vidya_db::EntitlementRepository;
use vidya_types::{
    Entitlement, EntitlementCheck, EntitlementDefaults, EntitlementReason, FeatureSlug, LimitType,
    SubscriptionStatus, UsageIncrement, UserId,
};

use crate::error::BillingError;
use crate::subscription::SubscriptionLifecycle;

/// Whether a daily counter is due for a reset at `now`
pub fn is_reset_due(entitlement: &Entitlement, now: DateTime<Utc>) -> bool {
    entitlement.limit_type == LimitType::Daily
        && now - entitlement.last_reset_at >= Duration::hours(24)
}

/// Entitlement checks and usage counting
#[derive(Clone)]
pub struct EntitlementLedger {
    entitlements: Arc<dyn EntitlementRepository>,
    lifecycle: SubscriptionLifecycle,
    defaults: EntitlementDefaults,
}

impl EntitlementLedger {
    pub fn new(
        entitlements: Arc<dyn EntitlementRepository>,
        lifecycle: SubscriptionLifecycle,
        defaults: EntitlementDefaults,
    ) -> Self {
        Self {
            entitlements,
            lifecycle,
            defaults,
        }
    }

    /// Decide access to `feature`. First matching rule wins.
    #[instrument(skip(self), fields(user_id = %user_id, feature = %feature))]
    pub async fn check(
        &self,
        user_id: UserId,
        feature: &FeatureSlug,
        now: DateTime<Utc>,
    ) -> Result<EntitlementCheck, BillingError> {
        let result = self.decide(user_id, feature, now).await?;
        metrics::counter!(
            "billing_entitlement_checks_total",
            "allowed" => if result.allowed { "true" } else { "false" }
        )
        .increment(1);
        debug!(allowed = result.allowed, reason = %result.reason, "entitlement checked");
        Ok(result)
    }

    async fn decide(
        &self,
        user_id: UserId,
        feature: &FeatureSlug,
        now: DateTime<Utc>,
    ) -> Result<EntitlementCheck, BillingError> {
        // Lapsed trial/active/canceled rows are flipped to expired here and fall through.
        let Some(sub) = self
            .lifecycle
            .check_and_maybe_transition(user_id, now)
            .await?
        else {
            return Ok(EntitlementCheck::denied(
                EntitlementReason::NoSubscription,
                None,
            ));
        };

        match sub.status {
            SubscriptionStatus::Trial if sub.is_trial_active(now) => {
                return Ok(EntitlementCheck::granted(EntitlementReason::TrialActive));
            }
            SubscriptionStatus::Active if sub.is_subscription_active(now) => {
                return Ok(EntitlementCheck::granted(
                    EntitlementReason::SubscriptionActive,
                ));
            }
            SubscriptionStatus::Canceled if sub.is_in_canceled_grace(now) => {
                return Ok(EntitlementCheck::granted(
                    EntitlementReason::SubscriptionActive,
                ));
            }
            _ => {}
        }

        let mut entitlement = self
            .entitlements
            .get_or_create(user_id, feature, self.defaults, now)
            .await?;

        if entitlement.limit_type == LimitType::Unlimited {
            return Ok(EntitlementCheck::metered(
                EntitlementReason::Unlimited,
                &entitlement,
            ));
        }

        if is_reset_due(&entitlement, now) {
            match self
                .entitlements
                .reset_if_stale(user_id, feature, now)
                .await?
            {
                Some(reset) => {
                    return Ok(EntitlementCheck::metered(
                        EntitlementReason::DailyLimitReset,
                        &reset,
                    ));
                }
                // A concurrent caller reset it first; judge the fresh row.
                None => {
                    entitlement = self
                        .entitlements
                        .get_or_create(user_id, feature, self.defaults, now)
                        .await?;
                }
            }
        }

        if entitlement.has_remaining() {
            Ok(EntitlementCheck::metered(
                EntitlementReason::WithinLimit,
                &entitlement,
            ))
        } else {
            Ok(EntitlementCheck::denied(
                EntitlementReason::LimitReached,
                Some(&entitlement),
            ))
        }
    }

    /// Record one use of `feature`. Never exceeds the limit of a daily counter.
    #[instrument(skip(self), fields(user_id = %user_id, feature = %feature))]
    pub async fn increment_usage(
        &self,
        user_id: UserId,
        feature: &FeatureSlug,
        now: DateTime<Utc>,
    ) -> Result<UsageIncrement, BillingError> {
        let current = self
            .entitlements
            .get_or_create(user_id, feature, self.defaults, now)
            .await?;

        if is_reset_due(&current, now) {
            self.entitlements
                .reset_if_stale(user_id, feature, now)
                .await?;
        }

        let (incremented, row) = match self.entitlements.increment(user_id, feature).await? {
            Some(row) => (true, row),
            None => (
                false,
                self.entitlements
                    .get_or_create(user_id, feature, self.defaults, now)
                    .await?,
            ),
        };

        debug!(incremented, usage_count = row.usage_count, "usage recorded");
        Ok(UsageIncrement {
            incremented,
            usage_count: row.usage_count,
            limit_value: row.limit_value,
            limit_type: row.limit_type,
        })
    }

    /// All counters for a user
    pub async fn usage_summary(&self, user_id: UserId) -> Result<Vec<Entitlement>, BillingError> {
        Ok(self.entitlements.list_for_user(user_id).await?)
    }
}
