//! Billing errors

use thiserror::Error;
use vidya_types::SubscriptionStatus;

/// Billing errors
#[derive(Error, Debug)]
pub enum BillingError {
    /// Subscription not found
    #[error("subscription not found")]
    SubscriptionNotFound,

    /// Payment order not found
    #[error("order not found")]
    OrderNotFound,

    /// Plan not found
    #[error("plan not found")]
    PlanNotFound,

    /// Illegal state transition
    #[error("cannot move subscription from {from} to {to}")]
    InvalidTransition {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },

    /// Webhook or payment signature did not verify
    #[error("invalid signature")]
    InvalidSignature,

    /// Payload could not be parsed
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] vidya_db::DbError),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SubscriptionNotFound | Self::OrderNotFound | Self::PlanNotFound
        )
    }

    /// Caller error that a retry will not fix
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. } | Self::InvalidSignature | Self::MalformedEvent(_)
        ) || self.is_not_found()
    }
}
