//! Billing and payment types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ParseEnumError, UserId};

/// Convert paise to rupees rounded to two decimals. Only used at output.
pub fn paise_to_rupees(paise: f64) -> f64 {
    round2(paise / 100.0)
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Payment order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Paid,
    Failed,
}

impl OrderStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            other => Err(ParseEnumError::new("order status", other)),
        }
    }
}

/// One checkout attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub id: Uuid,
    pub user_id: UserId,
    pub plan_id: Uuid,
    /// Order id issued by the payment gateway
    pub gateway_order_id: String,
    /// Amount charged, after discount, in paise
    pub amount_paise: i64,
    pub discount_paise: i64,
    pub coupon_code: Option<String>,
    pub currency: String,
    pub status: OrderStatus,
    pub gateway_payment_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub error_description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Invoice ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub Uuid);

impl InvoiceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InvoiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Invoice for one captured payment. Append-only; unique per gateway payment id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub user_id: UserId,
    pub order_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub gateway_payment_id: String,
    pub invoice_number: String,
    /// Amount in paise
    pub amount_paise: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Payment transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Captured,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Captured => "captured",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "captured" | "success" => Ok(Self::Captured),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(ParseEnumError::new("transaction status", other)),
        }
    }
}

/// Ledger row for a charge (initial capture or recurring)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: UserId,
    pub order_id: Option<Uuid>,
    pub plan_slug: Option<String>,
    pub amount_paise: i64,
    pub discount_paise: i64,
    pub final_amount_paise: i64,
    pub coupon_code: Option<String>,
    pub payment_method: Option<String>,
    pub status: TransactionStatus,
    pub gateway_payment_id: String,
    pub created_at: DateTime<Utc>,
}

/// Transaction joined with the data the CSV export needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionExport {
    pub transaction: Transaction,
    pub user_email: Option<String>,
    pub plan_name: Option<String>,
}

/// Revenue per day as read from the `revenue_analytics` view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyRevenue {
    pub day: chrono::NaiveDate,
    pub revenue_paise: i64,
    pub transactions: i64,
}

/// Coupon validation result returned by the store's `validate_coupon` RPC
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponValidation {
    pub valid: bool,
    pub discount_paise: i64,
    pub final_amount_paise: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub user_id: Option<UserId>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub details: serde_json::Value,
}

impl AuditEntry {
    pub fn new(action: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            user_id: None,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn by(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn entity(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}
