//! Repository traits
//!
//! Define async repository interfaces for database operations. Every
//! method that touches more than one table runs in a single transaction
//! inside the implementation, so callers never observe partial writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use vidya_types::{
    AuditEntry, CouponValidation, DailyRevenue, Entitlement, EntitlementDefaults, FeatureSlug,
    Invoice, ParseEnumError, PaymentOrder, Plan, Referral, ReferralCounts, ReferralStatus,
    RewardType, ScheduleTask, Subscription, SubscriptionStatus, SubscriptionWindow, Transaction,
    TransactionExport, UserId, UserProfile,
};

use crate::error::DbResult;

/// Subscription repository trait
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// The user's subscription, if any
    async fn find_by_user(&self, user_id: UserId) -> DbResult<Option<Subscription>>;

    /// Find by gateway subscription id, falling back to gateway customer id
    async fn find_by_gateway_ref(
        &self,
        subscription_id: Option<&str>,
        customer_id: Option<&str>,
    ) -> DbResult<Option<Subscription>>;

    /// All subscriptions (revenue snapshot input)
    async fn list_all(&self) -> DbResult<Vec<Subscription>>;

    /// Create a trial for a user that has no subscription row yet.
    /// Returns the existing row unchanged when one is already present.
    async fn start_trial(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        trial_days: i64,
    ) -> DbResult<Subscription>;

    /// Flip `from` to `expired` if the row is still in `from` and its window
    /// ended at or before `now`. Returns whether a row changed.
    async fn expire_if_lapsed(
        &self,
        user_id: UserId,
        from: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> DbResult<bool>;

    /// Move an `active` subscription to `canceled`, turning off auto-renew.
    /// Returns `None` when there is no active subscription.
    async fn cancel_active(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Subscription>>;

    /// Set status on the row matching a gateway reference, recording the
    /// gateway subscription id when the match came through the customer id.
    /// Returns the updated row, or `None` when nothing matches or the change
    /// would leave an `active` row without a paid window.
    async fn set_status_by_gateway_ref(
        &self,
        subscription_id: Option<&str>,
        customer_id: Option<&str>,
        status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Subscription>>;
}

/// Plan catalog repository trait
#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<Plan>>;

    async fn find_by_slug(&self, slug: &str) -> DbResult<Option<Plan>>;

    /// All plans, active or not
    async fn list(&self) -> DbResult<Vec<Plan>>;
}

/// Entitlement ledger repository trait
#[async_trait]
pub trait EntitlementRepository: Send + Sync {
    /// Fetch the counter, creating it with `defaults` if it does not exist
    async fn get_or_create(
        &self,
        user_id: UserId,
        feature: &FeatureSlug,
        defaults: EntitlementDefaults,
        now: DateTime<Utc>,
    ) -> DbResult<Entitlement>;

    /// Zero the counter if `last_reset_at` is 24h or more before `now`.
    /// Returns the reset row, or `None` when another writer already reset it.
    async fn reset_if_stale(
        &self,
        user_id: UserId,
        feature: &FeatureSlug,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Entitlement>>;

    /// Atomically add one use unless the counter is at its limit.
    /// Returns `None` when the limit held.
    async fn increment(
        &self,
        user_id: UserId,
        feature: &FeatureSlug,
    ) -> DbResult<Option<Entitlement>>;

    async fn list_for_user(&self, user_id: UserId) -> DbResult<Vec<Entitlement>>;
}

/// Data needed to apply a captured payment
#[derive(Debug, Clone)]
pub struct CaptureRecord {
    pub order_id: Uuid,
    pub user_id: UserId,
    pub plan_id: Uuid,
    pub plan_slug: String,
    pub gateway_payment_id: String,
    pub gateway_customer_id: Option<String>,
    /// Amount charged after discount
    pub amount_paise: i64,
    pub discount_paise: i64,
    pub coupon_code: Option<String>,
    pub payment_method: Option<String>,
    pub currency: String,
    pub window: SubscriptionWindow,
    pub invoice_number: String,
    pub now: DateTime<Utc>,
    /// Follow-up work enqueued in the same transaction
    pub follow_ups: Vec<NewOutboxItem>,
}

/// Data needed to apply a recurring charge
#[derive(Debug, Clone)]
pub struct ChargeRecord {
    pub subscription: Subscription,
    /// Stored on the row so later events match without the customer id
    pub gateway_subscription_id: String,
    pub plan_slug: Option<String>,
    pub gateway_payment_id: String,
    pub amount_paise: i64,
    pub currency: String,
    pub payment_method: Option<String>,
    pub extend_days: i32,
    /// False for a canceled row: the charge is ledgered but access is not extended
    pub extend: bool,
    pub invoice_number: String,
    pub now: DateTime<Utc>,
}

/// Result of applying a payment
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// All writes committed
    Applied {
        subscription: Subscription,
        invoice: Invoice,
    },
    /// The gateway payment id was already recorded; nothing was written
    Duplicate,
}

/// Payment ledger repository trait
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn find_order_by_gateway_id(&self, gateway_order_id: &str)
        -> DbResult<Option<PaymentOrder>>;

    /// Invoice, transaction, order, subscription and referral writes for a
    /// captured payment, committed together.
    async fn record_capture(&self, capture: CaptureRecord) -> DbResult<CaptureOutcome>;

    /// Invoice and transaction for a recurring charge, committed together
    /// with the reactivation and expiry extension when `extend` is set.
    async fn record_recurring_charge(&self, charge: ChargeRecord) -> DbResult<CaptureOutcome>;

    /// Mark an order failed unless it is already paid. Returns whether a row changed.
    async fn mark_order_failed(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: Option<&str>,
        error_description: Option<&str>,
    ) -> DbResult<bool>;

    async fn list_invoices_for_user(&self, user_id: UserId) -> DbResult<Vec<Invoice>>;

    /// Transactions created at or after `since`
    async fn list_transactions(&self, since: DateTime<Utc>) -> DbResult<Vec<Transaction>>;

    /// Transactions in `[from, to)` joined with email and plan name, newest first
    async fn export_transactions(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<TransactionExport>>;

    /// Rows of the per-day revenue view for the last `days` days
    async fn daily_revenue(&self, days: i32) -> DbResult<Vec<DailyRevenue>>;

    async fn validate_coupon(
        &self,
        code: &str,
        user_id: UserId,
        plan_slug: &str,
        amount_paise: i64,
    ) -> DbResult<CouponValidation>;
}

/// Reward to commit for one referral
#[derive(Debug, Clone)]
pub struct RewardCommit {
    pub referral_id: Uuid,
    pub referrer_id: UserId,
    pub referred_id: UserId,
    pub reward_type: RewardType,
    pub days: i32,
    pub monthly_cap: i64,
    pub month_start: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

/// Result of committing a referral reward
#[derive(Debug, Clone)]
pub enum RewardCommitOutcome {
    /// Reward applied; holds the referrer's updated subscription
    Committed(Subscription),
    /// The referral was rewarded by a concurrent caller
    AlreadyRewarded,
    /// The referrer hit the monthly cap
    LimitReached,
    /// The referrer's subscription left `active` between read and write
    Stale,
}

/// Referral repository trait
#[async_trait]
pub trait ReferralRepository: Send + Sync {
    /// The referral whose referred user is `referred_id`
    async fn find_by_referred(&self, referred_id: UserId) -> DbResult<Option<Referral>>;

    /// Referrals of `referrer_id` rewarded at or after `since`
    async fn count_rewarded_since(
        &self,
        referrer_id: UserId,
        since: DateTime<Utc>,
    ) -> DbResult<i64>;

    /// Move a referral forward. Never moves backward; returns whether a row changed.
    async fn advance_status(&self, referred_id: UserId, to: ReferralStatus) -> DbResult<bool>;

    /// Totals for the K-factor
    async fn counts(&self) -> DbResult<ReferralCounts>;

    /// Serialize on the referrer, recheck the cap and status, then write the
    /// subscription change, the referral and an audit entry together.
    async fn commit_reward(&self, reward: RewardCommit) -> DbResult<RewardCommitOutcome>;
}

/// User profile repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> DbResult<Option<UserProfile>>;

    /// Number of user profiles
    async fn count(&self) -> DbResult<i64>;
}

/// Audit log repository trait
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> DbResult<()>;
}

/// Study schedule repository trait
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Tasks for a user ordered by date and start time
    async fn list_for_user(&self, user_id: UserId) -> DbResult<Vec<ScheduleTask>>;
}

/// Outbox item state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Done,
    Failed,
}

impl OutboxStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for OutboxStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(ParseEnumError::new("outbox status", other)),
        }
    }
}

/// Follow-up work to enqueue
#[derive(Debug, Clone)]
pub struct NewOutboxItem {
    pub kind: String,
    pub payload: serde_json::Value,
}

impl NewOutboxItem {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// Queued follow-up work
#[derive(Debug, Clone)]
pub struct OutboxItem {
    pub id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Outbox repository trait
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn enqueue(&self, item: NewOutboxItem) -> DbResult<Uuid>;

    /// Lease up to `limit` due items. Claimed items have `attempts` bumped and
    /// are hidden from other consumers until the lease lapses.
    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> DbResult<Vec<OutboxItem>>;

    async fn mark_done(&self, id: Uuid) -> DbResult<()>;

    /// Release the lease and retry at `next_attempt_at`
    async fn reschedule(
        &self,
        id: Uuid,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> DbResult<()>;

    /// Give up on an item
    async fn mark_failed(&self, id: Uuid, error: &str) -> DbResult<()>;
}
