//! Invoice handlers

use std::time::Instant;

use axum::extract::State;
use axum::Json;
use tracing::instrument;

use vidya_types::Invoice;

use crate::error::ApiResult;
use crate::extractors::AuthUser;
use crate::handlers::shared::record_op_duration;
use crate::state::AppState;

/// GET /api/v1/invoices
///
/// Newest first; only the caller's own invoices.
#[instrument(skip(state, user), fields(user_id = %user.id()))]
pub async fn list_invoices(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<Invoice>>> {
    let start = Instant::now();
    let result = state.billing.invoices(user.id()).await;
    record_op_duration("list_invoices", start, result.is_ok());
    Ok(Json(result?))
}
