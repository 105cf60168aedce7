//! Database row models
//!
//! These types map directly to database rows using SQLx's FromRow derive.
//! Each row converts into its domain type with `TryFrom`, which is where
//! text-encoded enums are validated.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use vidya_types::{
    CouponValidation, DailyRevenue, Entitlement, FeatureSlug, Invoice, InvoiceId, PaymentOrder,
    Plan, Referral, ScheduleTask, Subscription, SubscriptionId, Transaction, TransactionExport,
    UserId, UserProfile,
};

use crate::error::DbError;
use crate::repo::{OutboxItem, OutboxStatus};

/// Column lists shared by every query that returns a full row.
macro_rules! subscription_columns {
    () => {
        "id, user_id, plan_id, status, trial_started_at, trial_expires_at, \
         subscription_started_at, subscription_expires_at, auto_renew, canceled_at, \
         gateway_subscription_id, gateway_customer_id, created_at, updated_at"
    };
}

macro_rules! entitlement_columns {
    () => {
        "user_id, feature_slug, limit_type, limit_value, usage_count, last_reset_at"
    };
}

macro_rules! order_columns {
    () => {
        "id, user_id, plan_id, gateway_order_id, amount_paise, discount_paise, coupon_code, \
         currency, status, gateway_payment_id, paid_at, error_description, created_at"
    };
}

macro_rules! invoice_columns {
    () => {
        "id, user_id, order_id, subscription_id, gateway_payment_id, invoice_number, \
         amount_paise, currency, created_at"
    };
}

macro_rules! transaction_columns {
    () => {
        "id, user_id, order_id, plan_slug, amount_paise, discount_paise, final_amount_paise, \
         coupon_code, payment_method, status, gateway_payment_id, created_at"
    };
}

macro_rules! referral_columns {
    () => {
        "id, referrer_id, referred_id, referral_code, status, reward_type, reward_value, \
         reward_applied_at, created_at"
    };
}

macro_rules! outbox_columns {
    () => {
        "id, kind, payload, status, attempts, last_error, next_attempt_at, created_at"
    };
}

pub(crate) use {
    entitlement_columns, invoice_columns, order_columns, outbox_columns, referral_columns,
    subscription_columns, transaction_columns,
};

/// Subscription row from the database
#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub status: String,
    pub trial_started_at: Option<DateTime<Utc>>,
    pub trial_expires_at: Option<DateTime<Utc>>,
    pub subscription_started_at: Option<DateTime<Utc>>,
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub auto_renew: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub gateway_subscription_id: Option<String>,
    pub gateway_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DbError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: SubscriptionId(row.id),
            user_id: UserId(row.user_id),
            plan_id: row.plan_id,
            status: row.status.parse()?,
            trial_started_at: row.trial_started_at,
            trial_expires_at: row.trial_expires_at,
            subscription_started_at: row.subscription_started_at,
            subscription_expires_at: row.subscription_expires_at,
            auto_renew: row.auto_renew,
            canceled_at: row.canceled_at,
            gateway_subscription_id: row.gateway_subscription_id,
            gateway_customer_id: row.gateway_customer_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Plan row from the database
#[derive(Debug, Clone, FromRow)]
pub struct PlanRow {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub price_paise: i64,
    pub duration_days: i32,
    pub features: serde_json::Value,
    pub is_active: bool,
}

impl From<PlanRow> for Plan {
    fn from(row: PlanRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            name: row.name,
            price_paise: row.price_paise,
            duration_days: row.duration_days,
            features: row.features,
            is_active: row.is_active,
        }
    }
}

/// Entitlement row from the database
#[derive(Debug, Clone, FromRow)]
pub struct EntitlementRow {
    pub user_id: Uuid,
    pub feature_slug: String,
    pub limit_type: String,
    pub limit_value: i32,
    pub usage_count: i32,
    pub last_reset_at: DateTime<Utc>,
}

impl TryFrom<EntitlementRow> for Entitlement {
    type Error = DbError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        if row.usage_count < 0 {
            return Err(DbError::InvalidRow(format!(
                "negative usage_count {} for feature {}",
                row.usage_count, row.feature_slug
            )));
        }

        Ok(Self {
            user_id: UserId(row.user_id),
            feature_slug: FeatureSlug(row.feature_slug),
            limit_type: row.limit_type.parse()?,
            limit_value: row.limit_value,
            usage_count: row.usage_count,
            last_reset_at: row.last_reset_at,
        })
    }
}

/// Payment order row from the database
#[derive(Debug, Clone, FromRow)]
pub struct PaymentOrderRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub gateway_order_id: String,
    pub amount_paise: i64,
    pub discount_paise: i64,
    pub coupon_code: Option<String>,
    pub currency: String,
    pub status: String,
    pub gateway_payment_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub error_description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PaymentOrderRow> for PaymentOrder {
    type Error = DbError;

    fn try_from(row: PaymentOrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: UserId(row.user_id),
            plan_id: row.plan_id,
            gateway_order_id: row.gateway_order_id,
            amount_paise: row.amount_paise,
            discount_paise: row.discount_paise,
            coupon_code: row.coupon_code,
            currency: row.currency,
            status: row.status.parse()?,
            gateway_payment_id: row.gateway_payment_id,
            paid_at: row.paid_at,
            error_description: row.error_description,
            created_at: row.created_at,
        })
    }
}

/// Invoice row from the database
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub gateway_payment_id: String,
    pub invoice_number: String,
    pub amount_paise: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl From<InvoiceRow> for Invoice {
    fn from(row: InvoiceRow) -> Self {
        Self {
            id: InvoiceId(row.id),
            user_id: UserId(row.user_id),
            order_id: row.order_id,
            subscription_id: row.subscription_id,
            gateway_payment_id: row.gateway_payment_id,
            invoice_number: row.invoice_number,
            amount_paise: row.amount_paise,
            currency: row.currency,
            created_at: row.created_at,
        }
    }
}

/// Payment transaction row from the database
#[derive(Debug, Clone, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_id: Option<Uuid>,
    pub plan_slug: Option<String>,
    pub amount_paise: i64,
    pub discount_paise: i64,
    pub final_amount_paise: i64,
    pub coupon_code: Option<String>,
    pub payment_method: Option<String>,
    pub status: String,
    pub gateway_payment_id: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = DbError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: UserId(row.user_id),
            order_id: row.order_id,
            plan_slug: row.plan_slug,
            amount_paise: row.amount_paise,
            discount_paise: row.discount_paise,
            final_amount_paise: row.final_amount_paise,
            coupon_code: row.coupon_code,
            payment_method: row.payment_method,
            status: row.status.parse()?,
            gateway_payment_id: row.gateway_payment_id,
            created_at: row.created_at,
        })
    }
}

/// Transaction joined with user email and plan name
#[derive(Debug, Clone, FromRow)]
pub struct TransactionExportRow {
    #[sqlx(flatten)]
    pub transaction: TransactionRow,
    pub user_email: Option<String>,
    pub plan_name: Option<String>,
}

impl TryFrom<TransactionExportRow> for TransactionExport {
    type Error = DbError;

    fn try_from(row: TransactionExportRow) -> Result<Self, Self::Error> {
        Ok(Self {
            transaction: row.transaction.try_into()?,
            user_email: row.user_email,
            plan_name: row.plan_name,
        })
    }
}

/// Row of the `revenue_analytics` view
#[derive(Debug, Clone, FromRow)]
pub struct DailyRevenueRow {
    pub day: NaiveDate,
    pub revenue_paise: i64,
    pub transactions: i64,
}

impl From<DailyRevenueRow> for DailyRevenue {
    fn from(row: DailyRevenueRow) -> Self {
        Self {
            day: row.day,
            revenue_paise: row.revenue_paise,
            transactions: row.transactions,
        }
    }
}

/// Result row of the `validate_coupon` function
#[derive(Debug, Clone, FromRow)]
pub struct CouponValidationRow {
    pub valid: bool,
    pub discount_paise: i64,
    pub final_amount_paise: i64,
    pub message: Option<String>,
}

impl From<CouponValidationRow> for CouponValidation {
    fn from(row: CouponValidationRow) -> Self {
        Self {
            valid: row.valid,
            discount_paise: row.discount_paise,
            final_amount_paise: row.final_amount_paise,
            message: row.message,
        }
    }
}

/// Referral row from the database
#[derive(Debug, Clone, FromRow)]
pub struct ReferralRow {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referred_id: Uuid,
    pub referral_code: String,
    pub status: String,
    pub reward_type: Option<String>,
    pub reward_value: Option<i32>,
    pub reward_applied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ReferralRow> for Referral {
    type Error = DbError;

    fn try_from(row: ReferralRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            referrer_id: UserId(row.referrer_id),
            referred_id: UserId(row.referred_id),
            referral_code: row.referral_code,
            status: row.status.parse()?,
            reward_type: row.reward_type.as_deref().map(str::parse).transpose()?,
            reward_value: row.reward_value,
            reward_applied_at: row.reward_applied_at,
            created_at: row.created_at,
        })
    }
}

/// User profile row from the database
#[derive(Debug, Clone, FromRow)]
pub struct UserProfileRow {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserProfileRow> for UserProfile {
    type Error = DbError;

    fn try_from(row: UserProfileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: UserId(row.id),
            email: row.email,
            full_name: row.full_name,
            role: row.role.parse()?,
            created_at: row.created_at,
        })
    }
}

/// Study schedule task row
#[derive(Debug, Clone, FromRow)]
pub struct ScheduleTaskRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub scheduled_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub duration_minutes: i32,
    pub completed: bool,
}

impl From<ScheduleTaskRow> for ScheduleTask {
    fn from(row: ScheduleTaskRow) -> Self {
        Self {
            id: row.id,
            user_id: UserId(row.user_id),
            title: row.title,
            description: row.description,
            subject: row.subject,
            scheduled_date: row.scheduled_date,
            start_time: row.start_time,
            duration_minutes: row.duration_minutes,
            completed: row.completed,
        }
    }
}

/// Outbox row
#[derive(Debug, Clone, FromRow)]
pub struct OutboxRow {
    pub id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<OutboxRow> for OutboxItem {
    type Error = DbError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            kind: row.kind,
            payload: row.payload,
            status: row.status.parse::<OutboxStatus>()?,
            attempts: row.attempts,
            last_error: row.last_error,
            next_attempt_at: row.next_attempt_at,
            created_at: row.created_at,
        })
    }
}

/// Convert a batch of rows, failing on the first invalid one
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, DbError>
where
    T: TryFrom<R, Error = DbError>,
{
    rows.into_iter().map(T::try_from).collect()
}
