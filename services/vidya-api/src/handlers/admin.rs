//! Admin handlers: revenue dashboard, transaction export, referral rewards

use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;

use vidya_billing_core::export::attachment;
use vidya_billing_core::RevenueMetrics;
use vidya_types::{DailyRevenue, RewardOutcome, UserId};

use crate::error::{ApiError, ApiResult};
use crate::extractors::AdminUser;
use crate::handlers::shared::record_op_duration;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

/// Half-open export window, RFC 3339 timestamps
#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ReferralRewardRequest {
    pub referred_id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/admin/revenue
///
/// Degrades to zeroed fields instead of failing.
#[instrument(skip(state, admin), fields(admin_id = %admin.id()))]
pub async fn revenue_metrics(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Json<RevenueMetrics> {
    Json(state.billing.revenue_metrics(Utc::now()).await)
}

/// GET /api/v1/admin/revenue/daily
#[instrument(skip(state, admin), fields(admin_id = %admin.id()))]
pub async fn daily_revenue(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Json<Vec<DailyRevenue>> {
    Json(state.billing.daily_revenue().await)
}

/// GET /api/v1/admin/transactions/export
#[instrument(skip(state, admin), fields(admin_id = %admin.id()))]
pub async fn export_transactions(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<ExportQuery>,
) -> ApiResult<impl IntoResponse> {
    let start = Instant::now();

    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from >= to {
            return Err(ApiError::BadRequest("`from` must be before `to`".into()));
        }
    }

    let result = state
        .billing
        .export_transactions_csv(query.from, query.to)
        .await;
    record_op_duration("export_transactions", start, result.is_ok());
    let csv = result?;

    let filename = format!("transactions-{}.csv", Utc::now().format("%Y-%m-%d"));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, attachment(&filename)),
        ],
        csv,
    ))
}

/// POST /api/v1/referrals/reward
///
/// Business outcomes (cap reached, already rewarded) come back as
/// `success: false` with a message, not as errors.
#[instrument(skip(state, admin, req), fields(admin_id = %admin.id()))]
pub async fn apply_referral_reward(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(req): Json<ReferralRewardRequest>,
) -> ApiResult<Json<RewardOutcome>> {
    let start = Instant::now();

    let referred_id = UserId::parse(&req.referred_id)
        .map_err(|_| ApiError::BadRequest("Invalid referred_id".into()))?;

    let result = state
        .billing
        .apply_referral_reward(referred_id, Utc::now())
        .await;
    record_op_duration("apply_referral_reward", start, result.is_ok());

    let outcome = result?;
    tracing::info!(
        referred_id = %referred_id,
        success = outcome.success,
        message = outcome.message.as_deref().unwrap_or(""),
        "Referral reward processed"
    );
    Ok(Json(outcome))
}
