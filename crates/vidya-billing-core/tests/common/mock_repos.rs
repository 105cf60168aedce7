//! In-memory repositories for testing
//!
//! One shared store implements every repository trait so that multi-table
//! writes (capture, recurring charge, referral reward) see the same rows.
//! Conditional updates mirror the SQL `WHERE` clauses; multi-table writes
//! take `tx` for their whole duration.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use vidya_db::{
    AuditLogRepository, CaptureOutcome, CaptureRecord, ChargeRecord, DbError, DbResult,
    EntitlementRepository, NewOutboxItem, OutboxItem, OutboxRepository, OutboxStatus,
    PaymentRepository, PlanRepository, ReferralRepository, Repositories, RewardCommit,
    RewardCommitOutcome, ScheduleRepository, SubscriptionRepository, UserRepository,
};
use vidya_types::{
    AuditEntry, CouponValidation, DailyRevenue, Entitlement, EntitlementDefaults, FeatureSlug,
    Invoice, InvoiceId, LimitType, OrderStatus, PaymentOrder, Plan, Referral, ReferralCounts,
    ReferralStatus, RewardType, Role, ScheduleTask, Subscription, SubscriptionId,
    SubscriptionStatus, Transaction, TransactionExport, TransactionStatus, UserId, UserProfile,
};

pub const MONTHLY: Uuid = Uuid::from_u128(0x6b1d3c5e_0001_4a00_9000_000000000001);
pub const QUARTERLY: Uuid = Uuid::from_u128(0x6b1d3c5e_0001_4a00_9000_000000000003);
pub const HALF_YEARLY: Uuid = Uuid::from_u128(0x6b1d3c5e_0001_4a00_9000_000000000006);
pub const ANNUAL: Uuid = Uuid::from_u128(0x6b1d3c5e_0001_4a00_9000_000000000012);

const LEASE: i64 = 5;

#[derive(Default)]
struct Inner {
    subscriptions: DashMap<UserId, Subscription>,
    plans: DashMap<Uuid, Plan>,
    entitlements: DashMap<(UserId, String), Entitlement>,
    orders: DashMap<String, PaymentOrder>,
    invoices: DashMap<String, Invoice>,
    transactions: DashMap<String, Transaction>,
    referrals: DashMap<UserId, Referral>,
    users: DashMap<UserId, UserProfile>,
    schedule: DashMap<Uuid, ScheduleTask>,
    outbox: DashMap<Uuid, (OutboxItem, Option<DateTime<Utc>>)>,
    audit: Mutex<Vec<AuditEntry>>,
    tx: Mutex<()>,
    fail_subscription_list: AtomicBool,
    renew_before_expiry: Mutex<Option<DateTime<Utc>>>,
}

/// Shared in-memory store
#[derive(Default, Clone)]
pub struct MockStore {
    inner: Arc<Inner>,
}

fn injected() -> DbError {
    DbError::InvalidRow("injected failure".to_string())
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the four standard plans
    pub fn with_catalog() -> Self {
        let store = Self::new();
        for (id, slug, price, days) in [
            (MONTHLY, "monthly", 59_900, 30),
            (QUARTERLY, "quarterly", 149_900, 90),
            (HALF_YEARLY, "half-yearly", 269_900, 180),
            (ANNUAL, "annual", 499_900, 365),
        ] {
            store.insert_plan(Plan {
                id,
                slug: slug.to_string(),
                name: slug.to_string(),
                price_paise: price,
                duration_days: days,
                features: serde_json::json!({}),
                is_active: true,
            });
        }
        store
    }

    pub fn repositories(&self) -> Repositories {
        Repositories {
            users: Arc::new(self.clone()),
            subscriptions: Arc::new(self.clone()),
            plans: Arc::new(self.clone()),
            entitlements: Arc::new(self.clone()),
            payments: Arc::new(self.clone()),
            referrals: Arc::new(self.clone()),
            audit: Arc::new(self.clone()),
            schedule: Arc::new(self.clone()),
            outbox: Arc::new(self.clone()),
        }
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    pub fn insert_plan(&self, plan: Plan) {
        self.inner.plans.insert(plan.id, plan);
    }

    pub fn insert_subscription(&self, sub: Subscription) {
        self.inner.subscriptions.insert(sub.user_id, sub);
    }

    pub fn insert_entitlement(&self, entitlement: Entitlement) {
        self.inner.entitlements.insert(
            (entitlement.user_id, entitlement.feature_slug.0.clone()),
            entitlement,
        );
    }

    pub fn insert_order(&self, order: PaymentOrder) {
        self.inner.orders.insert(order.gateway_order_id.clone(), order);
    }

    pub fn insert_referral(&self, referral: Referral) {
        self.inner.referrals.insert(referral.referred_id, referral);
    }

    pub fn insert_user(&self, profile: UserProfile) {
        self.inner.users.insert(profile.id, profile);
    }

    pub fn insert_task(&self, task: ScheduleTask) {
        self.inner.schedule.insert(task.id, task);
    }

    pub fn fail_subscription_list(&self, fail: bool) {
        self.inner.fail_subscription_list.store(fail, Ordering::SeqCst);
    }

    /// Next `expire_if_lapsed` first sees a renewal to `expires_at` land,
    /// as if a charge committed between the caller's read and its update
    pub fn renew_before_next_expiry(&self, expires_at: DateTime<Utc>) {
        *self.inner.renew_before_expiry.lock().unwrap() = Some(expires_at);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn subscription(&self, user_id: UserId) -> Option<Subscription> {
        self.inner.subscriptions.get(&user_id).map(|r| r.value().clone())
    }

    pub fn entitlement(&self, user_id: UserId, feature: &str) -> Option<Entitlement> {
        self.inner
            .entitlements
            .get(&(user_id, feature.to_string()))
            .map(|r| r.value().clone())
    }

    pub fn order(&self, gateway_order_id: &str) -> Option<PaymentOrder> {
        self.inner.orders.get(gateway_order_id).map(|r| r.value().clone())
    }

    pub fn referral(&self, referred_id: UserId) -> Option<Referral> {
        self.inner.referrals.get(&referred_id).map(|r| r.value().clone())
    }

    pub fn invoice_count(&self) -> usize {
        self.inner.invoices.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.inner.transactions.len()
    }

    pub fn audit_actions(&self) -> Vec<String> {
        self.inner
            .audit
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }

    pub fn outbox_items(&self) -> Vec<OutboxItem> {
        self.inner
            .outbox
            .iter()
            .map(|r| r.value().0.clone())
            .collect()
    }

    /// Snapshot of the writable tables, for "no writes happened" assertions
    pub fn fingerprint(&self) -> String {
        let mut subs: Vec<_> = self
            .inner
            .subscriptions
            .iter()
            .map(|r| format!("{:?}", r.value()))
            .collect();
        subs.sort();
        let mut refs: Vec<_> = self
            .inner
            .referrals
            .iter()
            .map(|r| format!("{:?}", r.value()))
            .collect();
        refs.sort();
        format!(
            "{subs:?}|{refs:?}|{}|{}",
            self.inner.audit.lock().unwrap().len(),
            self.inner.invoices.len()
        )
    }

    fn write_audit(&self, entry: AuditEntry) {
        self.inner.audit.lock().unwrap().push(entry);
    }

    fn enqueue_at(&self, item: &NewOutboxItem, now: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.outbox.insert(
            id,
            (
                OutboxItem {
                    id,
                    kind: item.kind.clone(),
                    payload: item.payload.clone(),
                    status: OutboxStatus::Pending,
                    attempts: 0,
                    last_error: None,
                    next_attempt_at: now,
                    created_at: now,
                },
                None,
            ),
        );
        id
    }

    /// Insert invoice and transaction unless the payment id is known
    #[allow(clippy::too_many_arguments)]
    fn insert_ledger_entry(
        &self,
        user_id: UserId,
        order_id: Option<Uuid>,
        plan_slug: Option<String>,
        gateway_payment_id: &str,
        invoice_number: &str,
        amount_paise: i64,
        discount_paise: i64,
        coupon_code: Option<String>,
        payment_method: Option<String>,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Option<Invoice> {
        if self.inner.invoices.contains_key(gateway_payment_id) {
            return None;
        }
        let invoice = Invoice {
            id: InvoiceId::new(),
            user_id,
            order_id,
            subscription_id: None,
            gateway_payment_id: gateway_payment_id.to_string(),
            invoice_number: invoice_number.to_string(),
            amount_paise,
            currency: currency.to_string(),
            created_at: now,
        };
        self.inner
            .invoices
            .insert(gateway_payment_id.to_string(), invoice.clone());
        self.inner.transactions.insert(
            gateway_payment_id.to_string(),
            Transaction {
                id: Uuid::new_v4(),
                user_id,
                order_id,
                plan_slug,
                amount_paise: amount_paise + discount_paise,
                discount_paise,
                final_amount_paise: amount_paise,
                coupon_code,
                payment_method,
                status: TransactionStatus::Captured,
                gateway_payment_id: gateway_payment_id.to_string(),
                created_at: now,
            },
        );
        Some(invoice)
    }

    fn link_invoice(&self, gateway_payment_id: &str, subscription_id: SubscriptionId) -> Invoice {
        let mut invoice = self
            .inner
            .invoices
            .get_mut(gateway_payment_id)
            .expect("invoice just inserted");
        invoice.subscription_id = Some(subscription_id.0);
        invoice.clone()
    }
}

/// Empty subscription row for `user_id`
pub fn blank_subscription(user_id: UserId, status: SubscriptionStatus, now: DateTime<Utc>) -> Subscription {
    Subscription {
        id: SubscriptionId::new(),
        user_id,
        plan_id: None,
        status,
        trial_started_at: None,
        trial_expires_at: None,
        subscription_started_at: None,
        subscription_expires_at: None,
        auto_renew: true,
        canceled_at: None,
        gateway_subscription_id: None,
        gateway_customer_id: None,
        created_at: now,
        updated_at: now,
    }
}

/// Active paid subscription on `plan_id` with `days_left` remaining
pub fn active_subscription(
    user_id: UserId,
    plan_id: Uuid,
    now: DateTime<Utc>,
    days_left: i64,
) -> Subscription {
    Subscription {
        plan_id: Some(plan_id),
        subscription_started_at: Some(now - Duration::days(1)),
        subscription_expires_at: Some(now + Duration::days(days_left)),
        ..blank_subscription(user_id, SubscriptionStatus::Active, now)
    }
}

pub fn order(user_id: UserId, plan_id: Uuid, gateway_order_id: &str, amount_paise: i64) -> PaymentOrder {
    PaymentOrder {
        id: Uuid::new_v4(),
        user_id,
        plan_id,
        gateway_order_id: gateway_order_id.to_string(),
        amount_paise,
        discount_paise: 0,
        coupon_code: None,
        currency: "INR".to_string(),
        status: OrderStatus::Created,
        gateway_payment_id: None,
        paid_at: None,
        error_description: None,
        created_at: Utc::now(),
    }
}

pub fn referral(referrer_id: UserId, referred_id: UserId, status: ReferralStatus) -> Referral {
    Referral {
        id: Uuid::new_v4(),
        referrer_id,
        referred_id,
        referral_code: "VIDYA123".to_string(),
        status,
        reward_type: None,
        reward_value: None,
        reward_applied_at: None,
        created_at: Utc::now(),
    }
}

pub fn profile(id: UserId, role: Role) -> UserProfile {
    UserProfile {
        id,
        email: format!("{}@example.com", id),
        full_name: None,
        role,
        created_at: Utc::now(),
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

#[async_trait]
impl SubscriptionRepository for MockStore {
    async fn find_by_user(&self, user_id: UserId) -> DbResult<Option<Subscription>> {
        Ok(self.subscription(user_id))
    }

    async fn find_by_gateway_ref(
        &self,
        subscription_id: Option<&str>,
        customer_id: Option<&str>,
    ) -> DbResult<Option<Subscription>> {
        let by_sub = subscription_id.and_then(|id| {
            self.inner
                .subscriptions
                .iter()
                .find(|r| r.gateway_subscription_id.as_deref() == Some(id))
                .map(|r| r.value().clone())
        });
        if by_sub.is_some() {
            return Ok(by_sub);
        }
        Ok(customer_id.and_then(|id| {
            self.inner
                .subscriptions
                .iter()
                .filter(|r| r.gateway_customer_id.as_deref() == Some(id))
                .max_by_key(|r| r.updated_at)
                .map(|r| r.value().clone())
        }))
    }

    async fn list_all(&self) -> DbResult<Vec<Subscription>> {
        if self.inner.fail_subscription_list.load(Ordering::SeqCst) {
            return Err(injected());
        }
        Ok(self
            .inner
            .subscriptions
            .iter()
            .map(|r| r.value().clone())
            .collect())
    }

    async fn start_trial(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        trial_days: i64,
    ) -> DbResult<Subscription> {
        let entry = self.inner.subscriptions.entry(user_id).or_insert_with(|| Subscription {
            trial_started_at: Some(now),
            trial_expires_at: Some(now + Duration::days(trial_days)),
            ..blank_subscription(user_id, SubscriptionStatus::Trial, now)
        });
        Ok(entry.value().clone())
    }

    async fn expire_if_lapsed(
        &self,
        user_id: UserId,
        from: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let Some(mut sub) = self.inner.subscriptions.get_mut(&user_id) else {
            return Ok(false);
        };
        if let Some(expires_at) = self.inner.renew_before_expiry.lock().unwrap().take() {
            sub.status = SubscriptionStatus::Active;
            sub.subscription_expires_at = Some(expires_at);
            sub.updated_at = now;
        }
        if sub.status != from || !sub.is_lapsed(now) {
            return Ok(false);
        }
        sub.status = SubscriptionStatus::Expired;
        sub.updated_at = now;
        Ok(true)
    }

    async fn cancel_active(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Subscription>> {
        let Some(mut sub) = self.inner.subscriptions.get_mut(&user_id) else {
            return Ok(None);
        };
        if sub.status != SubscriptionStatus::Active {
            return Ok(None);
        }
        sub.status = SubscriptionStatus::Canceled;
        sub.auto_renew = false;
        sub.canceled_at = Some(now);
        sub.updated_at = now;
        Ok(Some(sub.clone()))
    }

    async fn set_status_by_gateway_ref(
        &self,
        subscription_id: Option<&str>,
        customer_id: Option<&str>,
        status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Subscription>> {
        let Some(current) = self.find_by_gateway_ref(subscription_id, customer_id).await? else {
            return Ok(None);
        };
        let Some(mut sub) = self.inner.subscriptions.get_mut(&current.user_id) else {
            return Ok(None);
        };
        if status == SubscriptionStatus::Active && sub.subscription_expires_at.is_none() {
            return Ok(None);
        }
        if let Some(id) = subscription_id {
            sub.gateway_subscription_id = Some(id.to_string());
        }
        sub.status = status;
        sub.updated_at = now;
        if status == SubscriptionStatus::Canceled {
            sub.canceled_at = sub.canceled_at.or(Some(now));
        }
        if matches!(status, SubscriptionStatus::Canceled | SubscriptionStatus::Expired) {
            sub.auto_renew = false;
        }
        Ok(Some(sub.clone()))
    }
}

// ============================================================================
// Plans
// ============================================================================

#[async_trait]
impl PlanRepository for MockStore {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<Plan>> {
        Ok(self.inner.plans.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_slug(&self, slug: &str) -> DbResult<Option<Plan>> {
        Ok(self
            .inner
            .plans
            .iter()
            .find(|r| r.slug == slug)
            .map(|r| r.value().clone()))
    }

    async fn list(&self) -> DbResult<Vec<Plan>> {
        Ok(self.inner.plans.iter().map(|r| r.value().clone()).collect())
    }
}

// ============================================================================
// Entitlements
// ============================================================================

#[async_trait]
impl EntitlementRepository for MockStore {
    async fn get_or_create(
        &self,
        user_id: UserId,
        feature: &FeatureSlug,
        defaults: EntitlementDefaults,
        now: DateTime<Utc>,
    ) -> DbResult<Entitlement> {
        let entry = self
            .inner
            .entitlements
            .entry((user_id, feature.0.clone()))
            .or_insert_with(|| Entitlement {
                user_id,
                feature_slug: feature.clone(),
                limit_type: defaults.limit_type,
                limit_value: defaults.limit_value,
                usage_count: 0,
                last_reset_at: now,
            });
        Ok(entry.value().clone())
    }

    async fn reset_if_stale(
        &self,
        user_id: UserId,
        feature: &FeatureSlug,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Entitlement>> {
        let Some(mut row) = self.inner.entitlements.get_mut(&(user_id, feature.0.clone())) else {
            return Ok(None);
        };
        if row.limit_type != LimitType::Daily || row.last_reset_at > now - Duration::hours(24) {
            return Ok(None);
        }
        row.usage_count = 0;
        row.last_reset_at = now;
        Ok(Some(row.clone()))
    }

    async fn increment(
        &self,
        user_id: UserId,
        feature: &FeatureSlug,
    ) -> DbResult<Option<Entitlement>> {
        let Some(mut row) = self.inner.entitlements.get_mut(&(user_id, feature.0.clone())) else {
            return Ok(None);
        };
        if row.limit_type == LimitType::Daily && row.usage_count >= row.limit_value {
            return Ok(None);
        }
        row.usage_count += 1;
        Ok(Some(row.clone()))
    }

    async fn list_for_user(&self, user_id: UserId) -> DbResult<Vec<Entitlement>> {
        let mut rows: Vec<_> = self
            .inner
            .entitlements
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by(|a, b| a.feature_slug.0.cmp(&b.feature_slug.0));
        Ok(rows)
    }
}

// ============================================================================
// Payments
// ============================================================================

#[async_trait]
impl PaymentRepository for MockStore {
    async fn find_order_by_gateway_id(
        &self,
        gateway_order_id: &str,
    ) -> DbResult<Option<PaymentOrder>> {
        Ok(self.order(gateway_order_id))
    }

    async fn record_capture(&self, capture: CaptureRecord) -> DbResult<CaptureOutcome> {
        let _tx = self.inner.tx.lock().unwrap();
        let now = capture.now;

        if self
            .insert_ledger_entry(
                capture.user_id,
                Some(capture.order_id),
                Some(capture.plan_slug.clone()),
                &capture.gateway_payment_id,
                &capture.invoice_number,
                capture.amount_paise,
                capture.discount_paise,
                capture.coupon_code.clone(),
                capture.payment_method.clone(),
                &capture.currency,
                now,
            )
            .is_none()
        {
            return Ok(CaptureOutcome::Duplicate);
        }

        if let Some(mut order) = self
            .inner
            .orders
            .iter_mut()
            .find(|r| r.id == capture.order_id)
        {
            order.status = OrderStatus::Paid;
            order.gateway_payment_id = Some(capture.gateway_payment_id.clone());
            order.paid_at = Some(now);
            order.error_description = None;
        }

        let subscription = {
            let mut entry = self
                .inner
                .subscriptions
                .entry(capture.user_id)
                .or_insert_with(|| {
                    blank_subscription(capture.user_id, SubscriptionStatus::Active, now)
                });
            let sub = entry.value_mut();
            sub.plan_id = Some(capture.plan_id);
            sub.status = SubscriptionStatus::Active;
            sub.subscription_started_at = Some(capture.window.started_at);
            sub.subscription_expires_at = Some(capture.window.expires_at);
            sub.auto_renew = true;
            sub.canceled_at = None;
            if capture.gateway_customer_id.is_some() {
                sub.gateway_customer_id = capture.gateway_customer_id.clone();
            }
            sub.updated_at = now;
            sub.clone()
        };

        let invoice = self.link_invoice(&capture.gateway_payment_id, subscription.id);

        if let Some(mut referral) = self.inner.referrals.get_mut(&capture.user_id) {
            if referral.status < ReferralStatus::Subscribed {
                referral.status = ReferralStatus::Subscribed;
            }
        }

        for item in &capture.follow_ups {
            self.enqueue_at(item, now);
        }

        Ok(CaptureOutcome::Applied {
            subscription,
            invoice,
        })
    }

    async fn record_recurring_charge(&self, charge: ChargeRecord) -> DbResult<CaptureOutcome> {
        let _tx = self.inner.tx.lock().unwrap();
        let now = charge.now;
        let user_id = charge.subscription.user_id;

        if self
            .insert_ledger_entry(
                user_id,
                None,
                charge.plan_slug.clone(),
                &charge.gateway_payment_id,
                &charge.invoice_number,
                charge.amount_paise,
                0,
                None,
                charge.payment_method.clone(),
                &charge.currency,
                now,
            )
            .is_none()
        {
            return Ok(CaptureOutcome::Duplicate);
        }

        let subscription = {
            let mut sub = self
                .inner
                .subscriptions
                .get_mut(&user_id)
                .ok_or(DbError::NotFound)?;
            if charge.extend {
                let base = sub.subscription_expires_at.unwrap_or(now).max(now);
                sub.status = SubscriptionStatus::Active;
                sub.subscription_started_at = sub.subscription_started_at.or(Some(now));
                sub.subscription_expires_at =
                    Some(base + Duration::days(i64::from(charge.extend_days)));
            }
            sub.gateway_subscription_id = Some(charge.gateway_subscription_id.clone());
            sub.updated_at = now;
            sub.clone()
        };

        let invoice = self.link_invoice(&charge.gateway_payment_id, subscription.id);
        Ok(CaptureOutcome::Applied {
            subscription,
            invoice,
        })
    }

    async fn mark_order_failed(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: Option<&str>,
        error_description: Option<&str>,
    ) -> DbResult<bool> {
        let Some(mut order) = self.inner.orders.get_mut(gateway_order_id) else {
            return Ok(false);
        };
        if order.status == OrderStatus::Paid {
            return Ok(false);
        }
        order.status = OrderStatus::Failed;
        if let Some(id) = gateway_payment_id {
            order.gateway_payment_id = Some(id.to_string());
        }
        order.error_description = error_description.map(str::to_string);
        Ok(true)
    }

    async fn list_invoices_for_user(&self, user_id: UserId) -> DbResult<Vec<Invoice>> {
        let mut invoices: Vec<_> = self
            .inner
            .invoices
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.value().clone())
            .collect();
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invoices)
    }

    async fn list_transactions(&self, since: DateTime<Utc>) -> DbResult<Vec<Transaction>> {
        Ok(self
            .inner
            .transactions
            .iter()
            .filter(|r| r.created_at >= since)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn export_transactions(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<TransactionExport>> {
        let mut rows: Vec<_> = self
            .inner
            .transactions
            .iter()
            .filter(|r| from.is_none_or(|f| r.created_at >= f))
            .filter(|r| to.is_none_or(|t| r.created_at < t))
            .map(|r| TransactionExport {
                transaction: r.value().clone(),
                user_email: self.inner.users.get(&r.user_id).map(|u| u.email.clone()),
                plan_name: r
                    .plan_slug
                    .as_ref()
                    .and_then(|slug| self.inner.plans.iter().find(|p| &p.slug == slug))
                    .map(|p| p.name.clone()),
            })
            .collect();
        rows.sort_by(|a, b| b.transaction.created_at.cmp(&a.transaction.created_at));
        Ok(rows)
    }

    async fn daily_revenue(&self, days: i32) -> DbResult<Vec<DailyRevenue>> {
        let since = Utc::now() - Duration::days(i64::from(days));
        let mut by_day: std::collections::BTreeMap<NaiveDate, (i64, i64)> = Default::default();
        for tx in self.inner.transactions.iter() {
            if tx.status == TransactionStatus::Captured && tx.created_at >= since {
                let slot = by_day.entry(tx.created_at.date_naive()).or_default();
                slot.0 += tx.final_amount_paise;
                slot.1 += 1;
            }
        }
        Ok(by_day
            .into_iter()
            .map(|(day, (revenue_paise, transactions))| DailyRevenue {
                day,
                revenue_paise,
                transactions,
            })
            .collect())
    }

    async fn validate_coupon(
        &self,
        code: &str,
        _user_id: UserId,
        _plan_slug: &str,
        amount_paise: i64,
    ) -> DbResult<CouponValidation> {
        if code.eq_ignore_ascii_case("SAVE10") {
            let discount = amount_paise / 10;
            Ok(CouponValidation {
                valid: true,
                discount_paise: discount,
                final_amount_paise: amount_paise - discount,
                message: None,
            })
        } else {
            Ok(CouponValidation {
                valid: false,
                discount_paise: 0,
                final_amount_paise: amount_paise,
                message: Some("Invalid coupon code".to_string()),
            })
        }
    }
}

// ============================================================================
// Referrals
// ============================================================================

#[async_trait]
impl ReferralRepository for MockStore {
    async fn find_by_referred(&self, referred_id: UserId) -> DbResult<Option<Referral>> {
        Ok(self.referral(referred_id))
    }

    async fn count_rewarded_since(
        &self,
        referrer_id: UserId,
        since: DateTime<Utc>,
    ) -> DbResult<i64> {
        Ok(self
            .inner
            .referrals
            .iter()
            .filter(|r| r.referrer_id == referrer_id && r.status == ReferralStatus::Rewarded)
            .filter(|r| r.reward_applied_at.is_some_and(|at| at >= since))
            .count() as i64)
    }

    async fn advance_status(&self, referred_id: UserId, to: ReferralStatus) -> DbResult<bool> {
        let Some(mut referral) = self.inner.referrals.get_mut(&referred_id) else {
            return Ok(false);
        };
        if !referral.status.can_advance_to(to) {
            return Ok(false);
        }
        referral.status = to;
        Ok(true)
    }

    async fn counts(&self) -> DbResult<ReferralCounts> {
        let total = self.inner.referrals.len() as i64;
        let converted = self
            .inner
            .referrals
            .iter()
            .filter(|r| r.status.is_converted())
            .count() as i64;
        Ok(ReferralCounts { total, converted })
    }

    async fn commit_reward(&self, reward: RewardCommit) -> DbResult<RewardCommitOutcome> {
        let _tx = self.inner.tx.lock().unwrap();
        let now = reward.now;

        if self
            .inner
            .referrals
            .get(&reward.referred_id)
            .is_some_and(|r| r.status == ReferralStatus::Rewarded)
        {
            return Ok(RewardCommitOutcome::AlreadyRewarded);
        }

        let rewarded = self
            .inner
            .referrals
            .iter()
            .filter(|r| r.referrer_id == reward.referrer_id && r.status == ReferralStatus::Rewarded)
            .filter(|r| r.reward_applied_at.is_some_and(|at| at >= reward.month_start))
            .count() as i64;
        if rewarded >= reward.monthly_cap {
            return Ok(RewardCommitOutcome::LimitReached);
        }

        let days = Duration::days(i64::from(reward.days));
        let subscription = match reward.reward_type {
            RewardType::SubscriptionExtension => {
                let Some(mut sub) = self.inner.subscriptions.get_mut(&reward.referrer_id) else {
                    return Ok(RewardCommitOutcome::Stale);
                };
                if sub.status != SubscriptionStatus::Active {
                    return Ok(RewardCommitOutcome::Stale);
                }
                let base = sub.subscription_expires_at.unwrap_or(now).max(now);
                sub.subscription_expires_at = Some(base + days);
                sub.updated_at = now;
                sub.clone()
            }
            RewardType::FreeMonth => {
                let mut entry = self
                    .inner
                    .subscriptions
                    .entry(reward.referrer_id)
                    .or_insert_with(|| {
                        blank_subscription(reward.referrer_id, SubscriptionStatus::Active, now)
                    });
                let sub = entry.value_mut();
                sub.status = SubscriptionStatus::Active;
                sub.subscription_started_at = Some(now);
                sub.subscription_expires_at = Some(now + days);
                sub.auto_renew = false;
                sub.canceled_at = None;
                sub.updated_at = now;
                sub.clone()
            }
        };

        if let Some(mut referral) = self.inner.referrals.get_mut(&reward.referred_id) {
            referral.status = ReferralStatus::Rewarded;
            referral.reward_type = Some(reward.reward_type);
            referral.reward_value = Some(reward.days);
            referral.reward_applied_at = Some(now);
        }

        self.write_audit(
            AuditEntry::new("referral_reward_applied", "referral")
                .by(reward.referrer_id)
                .entity(reward.referral_id)
                .details(serde_json::json!({ "reward_type": reward.reward_type.as_str() })),
        );

        Ok(RewardCommitOutcome::Committed(subscription))
    }
}

// ============================================================================
// Users, audit, schedule
// ============================================================================

#[async_trait]
impl UserRepository for MockStore {
    async fn find_by_id(&self, id: UserId) -> DbResult<Option<UserProfile>> {
        Ok(self.inner.users.get(&id).map(|r| r.value().clone()))
    }

    async fn count(&self) -> DbResult<i64> {
        Ok(self.inner.users.len() as i64)
    }
}

#[async_trait]
impl AuditLogRepository for MockStore {
    async fn record(&self, entry: AuditEntry) -> DbResult<()> {
        self.write_audit(entry);
        Ok(())
    }
}

#[async_trait]
impl ScheduleRepository for MockStore {
    async fn list_for_user(&self, user_id: UserId) -> DbResult<Vec<ScheduleTask>> {
        let mut tasks: Vec<_> = self
            .inner
            .schedule
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.value().clone())
            .collect();
        tasks.sort_by_key(|t| (t.scheduled_date, t.start_time));
        Ok(tasks)
    }
}

// ============================================================================
// Outbox
// ============================================================================

#[async_trait]
impl OutboxRepository for MockStore {
    async fn enqueue(&self, item: NewOutboxItem) -> DbResult<Uuid> {
        Ok(self.enqueue_at(&item, Utc::now()))
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> DbResult<Vec<OutboxItem>> {
        let _tx = self.inner.tx.lock().unwrap();
        let mut due: Vec<Uuid> = self
            .inner
            .outbox
            .iter()
            .filter(|r| {
                let (item, locked_until) = r.value();
                item.status == OutboxStatus::Pending
                    && item.next_attempt_at <= now
                    && locked_until.is_none_or(|until| until <= now)
            })
            .map(|r| *r.key())
            .collect();
        due.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            if let Some(mut entry) = self.inner.outbox.get_mut(&id) {
                let (item, locked_until) = entry.value_mut();
                item.attempts += 1;
                *locked_until = Some(now + Duration::minutes(LEASE));
                claimed.push(item.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_done(&self, id: Uuid) -> DbResult<()> {
        if let Some(mut entry) = self.inner.outbox.get_mut(&id) {
            entry.0.status = OutboxStatus::Done;
            entry.1 = None;
        }
        Ok(())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> DbResult<()> {
        if let Some(mut entry) = self.inner.outbox.get_mut(&id) {
            entry.0.next_attempt_at = next_attempt_at;
            entry.0.last_error = Some(error.to_string());
            entry.1 = None;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> DbResult<()> {
        if let Some(mut entry) = self.inner.outbox.get_mut(&id) {
            entry.0.status = OutboxStatus::Failed;
            entry.0.last_error = Some(error.to_string());
            entry.1 = None;
        }
        Ok(())
    }
}
