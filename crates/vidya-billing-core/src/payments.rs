//! Payment event ingestor
//!
//! Applies gateway payment events to orders, subscriptions and the invoice
//! ledger. The webhook and the client-side verify call share one capture
//! path; the store dedupes on the gateway payment id, so whichever arrives
//! second is a no-op.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use vidya_db::{
    CaptureOutcome, CaptureRecord, ChargeRecord, NewOutboxItem, PaymentRepository,
    ReferralRepository, SubscriptionRepository,
};
use vidya_types::{
    OrderStatus, PaymentOrder, ReferralStatus, Subscription, SubscriptionStatus,
    SubscriptionWindow, UserId,
};

use crate::error::BillingError;
use crate::outbox::REFERRAL_REWARD;
use crate::plans::PlanCatalog;
use crate::webhook::{PaymentEntity, SubscriptionEntity};

/// Invoice number for a payment: `INV-YYYYMMDD-XXXXXXXX`
pub fn invoice_number(now: DateTime<Utc>, gateway_payment_id: &str) -> String {
    let alnum: Vec<char> = gateway_payment_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    let tail: String = alnum[alnum.len().saturating_sub(8)..].iter().collect();
    format!("INV-{}-{}", now.format("%Y%m%d"), tail.to_ascii_uppercase())
}

/// Result of a capture as reported to callers
#[derive(Debug, Clone, Serialize)]
pub struct PaymentResult {
    /// False when the payment had already been applied
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
}

impl From<CaptureOutcome> for PaymentResult {
    fn from(outcome: CaptureOutcome) -> Self {
        match outcome {
            CaptureOutcome::Applied {
                subscription,
                invoice,
            } => Self {
                applied: true,
                subscription: Some(subscription),
                invoice_number: Some(invoice.invoice_number),
            },
            CaptureOutcome::Duplicate => Self {
                applied: false,
                subscription: None,
                invoice_number: None,
            },
        }
    }
}

/// Payment event ingestor
#[derive(Clone)]
pub struct PaymentIngestor {
    payments: Arc<dyn PaymentRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    referrals: Arc<dyn ReferralRepository>,
    plans: PlanCatalog,
}

impl PaymentIngestor {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        referrals: Arc<dyn ReferralRepository>,
        plans: PlanCatalog,
    ) -> Self {
        Self {
            payments,
            subscriptions,
            referrals,
            plans,
        }
    }

    /// Order by gateway order id, `OrderNotFound` when absent
    pub async fn order(&self, gateway_order_id: &str) -> Result<PaymentOrder, BillingError> {
        self.payments
            .find_order_by_gateway_id(gateway_order_id)
            .await?
            .ok_or(BillingError::OrderNotFound)
    }

    /// Apply a captured payment for `order`
    #[instrument(skip(self, order, payment), fields(order_id = %order.gateway_order_id, payment_id = %payment.id))]
    pub async fn capture(
        &self,
        order: &PaymentOrder,
        payment: &PaymentEntity,
        now: DateTime<Utc>,
    ) -> Result<PaymentResult, BillingError> {
        if order.status == OrderStatus::Paid
            && order.gateway_payment_id.as_deref() == Some(payment.id.as_str())
        {
            info!("order already paid by this payment");
            return Ok(CaptureOutcome::Duplicate.into());
        }

        let plan = self.plans.by_id(order.plan_id).await?;

        let mut follow_ups = Vec::new();
        if let Some(referral) = self.referrals.find_by_referred(order.user_id).await? {
            if referral.status != ReferralStatus::Rewarded {
                follow_ups.push(NewOutboxItem::new(
                    REFERRAL_REWARD,
                    serde_json::json!({ "referred_id": order.user_id }),
                ));
            }
        }

        let record = CaptureRecord {
            order_id: order.id,
            user_id: order.user_id,
            plan_id: plan.id,
            plan_slug: plan.slug.clone(),
            gateway_payment_id: payment.id.clone(),
            gateway_customer_id: payment.customer_id.clone(),
            amount_paise: order.amount_paise,
            discount_paise: order.discount_paise,
            coupon_code: order.coupon_code.clone(),
            payment_method: payment.method.clone(),
            currency: order.currency.clone(),
            window: SubscriptionWindow::starting_at(now, plan.duration_days),
            invoice_number: invoice_number(now, &payment.id),
            now,
            follow_ups,
        };

        let outcome = self.payments.record_capture(record).await?;
        match &outcome {
            CaptureOutcome::Applied { subscription, .. } => info!(
                user_id = %subscription.user_id,
                plan = %plan.slug,
                "payment captured; subscription active"
            ),
            CaptureOutcome::Duplicate => info!("payment already recorded"),
        }

        Ok(outcome.into())
    }

    /// Apply a `payment.captured` webhook
    pub async fn handle_captured(
        &self,
        payment: &PaymentEntity,
        now: DateTime<Utc>,
    ) -> Result<PaymentResult, BillingError> {
        let order_id = payment
            .order_id
            .as_deref()
            .ok_or_else(|| BillingError::MalformedEvent("payment without order_id".to_string()))?;
        let order = self.order(order_id).await?;
        self.capture(&order, payment, now).await
    }

    /// Client-side verification after checkout. The signature must already be checked.
    pub async fn capture_verified(
        &self,
        user_id: UserId,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentResult, BillingError> {
        let order = self.order(gateway_order_id).await?;
        // Someone else's order is reported as missing.
        if order.user_id != user_id {
            return Err(BillingError::OrderNotFound);
        }

        let payment = PaymentEntity {
            id: gateway_payment_id.to_string(),
            order_id: Some(gateway_order_id.to_string()),
            amount: order.amount_paise,
            currency: order.currency.clone(),
            method: None,
            customer_id: None,
            error_description: None,
        };
        self.capture(&order, &payment, now).await
    }

    /// Apply a `payment.failed` webhook. A paid order is never downgraded.
    #[instrument(skip(self, payment), fields(payment_id = %payment.id))]
    pub async fn handle_failed(&self, payment: &PaymentEntity) -> Result<(), BillingError> {
        let order_id = payment
            .order_id
            .as_deref()
            .ok_or_else(|| BillingError::MalformedEvent("payment without order_id".to_string()))?;

        let changed = self
            .payments
            .mark_order_failed(
                order_id,
                Some(payment.id.as_str()),
                payment.error_description.as_deref(),
            )
            .await?;

        if changed {
            info!(order_id, "order marked failed");
        } else {
            let order = self.order(order_id).await?;
            info!(order_id, status = order.status.as_str(), "failure ignored");
        }
        Ok(())
    }

    /// Apply `subscription.activated` / `subscription.cancelled`
    #[instrument(skip(self, entity), fields(gateway_subscription_id = %entity.id))]
    pub async fn handle_status_change(
        &self,
        entity: &SubscriptionEntity,
        status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> Result<(), BillingError> {
        let Some(current) = self
            .subscriptions
            .find_by_gateway_ref(Some(entity.id.as_str()), entity.customer_id.as_deref())
            .await?
        else {
            warn!("no subscription matches gateway reference");
            return Ok(());
        };

        if status == SubscriptionStatus::Active && current.subscription_expires_at.is_none() {
            warn!(
                user_id = %current.user_id,
                from = %current.status,
                "activation without a paid window skipped"
            );
            return Ok(());
        }

        let updated = self
            .subscriptions
            .set_status_by_gateway_ref(
                Some(entity.id.as_str()),
                entity.customer_id.as_deref(),
                status,
                now,
            )
            .await?;

        match updated {
            Some(sub) => info!(user_id = %sub.user_id, status = %status, "subscription status synced"),
            None => warn!(user_id = %current.user_id, "subscription changed before status sync"),
        }
        Ok(())
    }

    /// Apply `subscription.charged`: ledger the payment and extend the paid
    /// period by the plan duration.
    ///
    /// A row that lapsed to `expired` is reactivated. A canceled row still
    /// gets its invoice but keeps its current window.
    #[instrument(skip(self, entity, payment), fields(gateway_subscription_id = %entity.id, payment_id = %payment.id))]
    pub async fn handle_charged(
        &self,
        entity: &SubscriptionEntity,
        payment: &PaymentEntity,
        now: DateTime<Utc>,
    ) -> Result<PaymentResult, BillingError> {
        let subscription = self
            .subscriptions
            .find_by_gateway_ref(Some(entity.id.as_str()), entity.customer_id.as_deref())
            .await?
            .ok_or(BillingError::SubscriptionNotFound)?;

        let extend = subscription.status != SubscriptionStatus::Canceled;
        if !extend {
            warn!(user_id = %subscription.user_id, "charge for canceled subscription recorded without extension");
        }

        let plan_id = subscription.plan_id.ok_or(BillingError::PlanNotFound)?;
        let plan = self.plans.by_id(plan_id).await?;

        let record = ChargeRecord {
            gateway_subscription_id: entity.id.clone(),
            plan_slug: Some(plan.slug.clone()),
            gateway_payment_id: payment.id.clone(),
            amount_paise: if payment.amount > 0 {
                payment.amount
            } else {
                plan.price_paise
            },
            currency: payment.currency.clone(),
            payment_method: payment.method.clone(),
            extend_days: plan.duration_days,
            extend,
            invoice_number: invoice_number(now, &payment.id),
            now,
            subscription,
        };

        let outcome = self.payments.record_recurring_charge(record).await?;
        if let CaptureOutcome::Applied { subscription, .. } = &outcome {
            info!(
                expires_at = ?subscription.subscription_expires_at,
                "recurring charge applied"
            );
        }
        Ok(outcome.into())
    }
}
