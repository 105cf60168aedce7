//! Client payment verification and coupon handlers

use std::time::Instant;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use vidya_billing_core::PaymentResult;
use vidya_types::CouponValidation;

use crate::error::{ApiError, ApiResult};
use crate::extractors::AuthUser;
use crate::handlers::shared::{record_op_duration, validate_required};
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

/// Fields returned to the browser by the checkout widget
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub plan_slug: String,
    pub amount_paise: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/payments/verify
#[instrument(skip(state, user, req), fields(user_id = %user.id(), order_id = %req.razorpay_order_id))]
pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<VerifyPaymentRequest>,
) -> ApiResult<Json<PaymentResult>> {
    validate_required(&req.razorpay_order_id, "razorpay_order_id")?;
    validate_required(&req.razorpay_payment_id, "razorpay_payment_id")?;
    validate_required(&req.razorpay_signature, "razorpay_signature")?;

    let result = state
        .billing
        .verify_payment(
            user.id(),
            &req.razorpay_order_id,
            &req.razorpay_payment_id,
            &req.razorpay_signature,
            Utc::now(),
        )
        .await?;

    tracing::info!(
        payment_id = %req.razorpay_payment_id,
        applied = result.applied,
        "Payment verified"
    );
    Ok(Json(result))
}

/// POST /api/v1/coupons/validate
#[instrument(skip(state, user, req), fields(user_id = %user.id(), plan = %req.plan_slug))]
pub async fn validate_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ValidateCouponRequest>,
) -> ApiResult<Json<CouponValidation>> {
    let start = Instant::now();

    validate_required(&req.code, "code")?;
    validate_required(&req.plan_slug, "plan_slug")?;
    if req.amount_paise <= 0 {
        return Err(ApiError::BadRequest("Amount must be positive".into()));
    }

    let result = state
        .billing
        .validate_coupon(user.id(), &req.code, &req.plan_slug, req.amount_paise)
        .await;
    record_op_duration("validate_coupon", start, result.is_ok());

    Ok(Json(result?))
}
