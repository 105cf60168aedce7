//! Entitlement handlers

use std::time::Instant;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use tracing::instrument;

use vidya_types::{Entitlement, EntitlementCheck, UsageIncrement};

use crate::error::ApiResult;
use crate::extractors::AuthUser;
use crate::handlers::shared::{record_op_duration, validate_feature_slug};
use crate::state::AppState;

/// GET /api/v1/entitlements/{feature}
/// Hot path - called before every gated action
#[instrument(skip(state, user), fields(user_id = %user.id()))]
pub async fn check_entitlement(
    State(state): State<AppState>,
    user: AuthUser,
    Path(feature): Path<String>,
) -> ApiResult<Json<EntitlementCheck>> {
    let start = Instant::now();
    let feature = validate_feature_slug(&feature)?;

    let result = state
        .billing
        .check_entitlement(user.id(), &feature, Utc::now())
        .await;
    record_op_duration("check_entitlement", start, result.is_ok());

    Ok(Json(result?))
}

/// POST /api/v1/entitlements/{feature}/usage
#[instrument(skip(state, user), fields(user_id = %user.id()))]
pub async fn increment_usage(
    State(state): State<AppState>,
    user: AuthUser,
    Path(feature): Path<String>,
) -> ApiResult<Json<UsageIncrement>> {
    let start = Instant::now();
    let feature = validate_feature_slug(&feature)?;

    let result = state
        .billing
        .increment_usage(user.id(), &feature, Utc::now())
        .await;
    record_op_duration("increment_usage", start, result.is_ok());

    let usage = result?;
    if !usage.incremented {
        tracing::debug!(%feature, usage_count = usage.usage_count, "usage already at limit");
    }
    Ok(Json(usage))
}

/// GET /api/v1/entitlements
#[instrument(skip(state, user), fields(user_id = %user.id()))]
pub async fn usage_summary(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<Entitlement>>> {
    let start = Instant::now();
    let result = state.billing.usage_summary(user.id()).await;
    record_op_duration("usage_summary", start, result.is_ok());
    Ok(Json(result?))
}
