//! Subscription state machine
//!
//! ```text
//! none ──start_trial──▶ trial ──capture──▶ active ──cancel──▶ canceled
//!                         │                  │                  │
//!                         └──────── lapsed (read time) ─────────┴──▶ expired
//! ```
//!
//! Expiry is applied lazily: readers call [`SubscriptionLifecycle::check_and_maybe_transition`],
//! which flips a lapsed row with a conditional update so concurrent readers
//! agree on the result.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use vidya_db::{AuditLogRepository, SubscriptionRepository};
use vidya_types::{AuditEntry, Plan, Subscription, SubscriptionStatus, UserId};

use crate::error::BillingError;
use crate::plans::PlanCatalog;

/// Dashboard view of a user's subscription
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionOverview {
    pub subscription: Option<Subscription>,
    pub plan: Option<Plan>,
    pub is_trial_active: bool,
    pub is_subscription_active: bool,
    pub has_access: bool,
    pub days_remaining: i64,
}

/// Subscription lifecycle operations
#[derive(Clone)]
pub struct SubscriptionLifecycle {
    subscriptions: Arc<dyn SubscriptionRepository>,
    audit: Arc<dyn AuditLogRepository>,
    plans: PlanCatalog,
    trial_days: i64,
}

impl SubscriptionLifecycle {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        audit: Arc<dyn AuditLogRepository>,
        plans: PlanCatalog,
        trial_days: i64,
    ) -> Self {
        Self {
            subscriptions,
            audit,
            plans,
            trial_days,
        }
    }

    /// Start a trial for a user without a subscription. Existing rows are returned untouched.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn start_trial(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Subscription, BillingError> {
        let sub = self
            .subscriptions
            .start_trial(user_id, now, self.trial_days)
            .await?;
        debug!(status = %sub.status, "trial ensured");
        Ok(sub)
    }

    /// Load the subscription and expire it if its window has passed.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn check_and_maybe_transition(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, BillingError> {
        let Some(mut sub) = self.subscriptions.find_by_user(user_id).await? else {
            return Ok(None);
        };

        if sub.is_lapsed(now) {
            self.expire(&mut sub, now).await?;
        }

        Ok(Some(sub))
    }

    /// Flip a lapsed subscription to `expired`, updating the local copy.
    ///
    /// When the conditional update matches nothing the row moved underneath
    /// us, so the local copy is replaced with what is stored now.
    pub(crate) async fn expire(
        &self,
        sub: &mut Subscription,
        now: DateTime<Utc>,
    ) -> Result<(), BillingError> {
        let from = sub.status;
        let changed = self
            .subscriptions
            .expire_if_lapsed(sub.user_id, from, now)
            .await?;
        if changed {
            info!(user_id = %sub.user_id, from = %from, "subscription expired");
            sub.status = SubscriptionStatus::Expired;
            sub.updated_at = now;
            return Ok(());
        }

        match self.subscriptions.find_by_user(sub.user_id).await? {
            Some(current) => {
                debug!(user_id = %sub.user_id, status = %current.status, "subscription changed before expiry");
                *sub = current;
            }
            None => {
                sub.status = SubscriptionStatus::Expired;
                sub.updated_at = now;
            }
        }
        Ok(())
    }

    /// Cancel an active subscription. Access continues until the paid period ends.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn cancel(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Subscription, BillingError> {
        let current = self
            .subscriptions
            .find_by_user(user_id)
            .await?
            .ok_or(BillingError::SubscriptionNotFound)?;

        if current.status != SubscriptionStatus::Active {
            return Err(BillingError::InvalidTransition {
                from: current.status,
                to: SubscriptionStatus::Canceled,
            });
        }

        // The row can leave `active` between the read and the conditional update.
        let canceled = self
            .subscriptions
            .cancel_active(user_id, now)
            .await?
            .ok_or(BillingError::InvalidTransition {
                from: current.status,
                to: SubscriptionStatus::Canceled,
            })?;

        self.audit
            .record(
                AuditEntry::new("subscription_canceled", "subscription")
                    .by(user_id)
                    .entity(canceled.id.0)
                    .details(serde_json::json!({
                        "access_until": canceled.subscription_expires_at,
                    })),
            )
            .await?;

        info!(subscription_id = %canceled.id.0, "subscription canceled");
        Ok(canceled)
    }

    /// Subscription, plan and access flags for the dashboard
    pub async fn overview(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionOverview, BillingError> {
        let sub = self.check_and_maybe_transition(user_id, now).await?;

        let plan = match sub.as_ref().and_then(|s| s.plan_id) {
            Some(plan_id) => match self.plans.by_id(plan_id).await {
                Ok(plan) => Some(plan),
                Err(BillingError::PlanNotFound) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };

        Ok(SubscriptionOverview {
            is_trial_active: sub.as_ref().is_some_and(|s| s.is_trial_active(now)),
            is_subscription_active: sub.as_ref().is_some_and(|s| s.is_subscription_active(now)),
            has_access: sub.as_ref().is_some_and(|s| s.has_access(now)),
            days_remaining: sub.as_ref().map_or(0, |s| s.days_remaining(now)),
            subscription: sub,
            plan,
        })
    }
}
