//! Subscription handlers

use std::time::Instant;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use tracing::instrument;

use vidya_billing_core::SubscriptionOverview;
use vidya_types::Subscription;

use crate::error::ApiResult;
use crate::extractors::AuthUser;
use crate::handlers::shared::record_op_duration;
use crate::state::AppState;

/// GET /api/v1/subscription
#[instrument(skip(state, user), fields(user_id = %user.id()))]
pub async fn get_subscription(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<SubscriptionOverview>> {
    let start = Instant::now();
    let result = state.billing.subscription(user.id(), Utc::now()).await;
    record_op_duration("get_subscription", start, result.is_ok());
    Ok(Json(result?))
}

/// POST /api/v1/subscription/trial
///
/// Returns the existing subscription when the user already has one.
#[instrument(skip(state, user), fields(user_id = %user.id()))]
pub async fn start_trial(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Subscription>> {
    let start = Instant::now();
    let result = state.billing.start_trial(user.id(), Utc::now()).await;
    record_op_duration("start_trial", start, result.is_ok());
    Ok(Json(result?))
}

/// POST /api/v1/subscription/cancel
#[instrument(skip(state, user), fields(user_id = %user.id()))]
pub async fn cancel_subscription(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Subscription>> {
    let start = Instant::now();
    let result = state.billing.cancel_subscription(user.id(), Utc::now()).await;
    record_op_duration("cancel_subscription", start, result.is_ok());

    let sub = result?;
    tracing::info!(subscription_id = %sub.id.0, "Subscription canceled");
    Ok(Json(sub))
}
