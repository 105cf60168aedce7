//! Study schedule calendar feed

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use chrono::Utc;
use tracing::instrument;

use vidya_billing_core::export::attachment;

use crate::error::ApiResult;
use crate::extractors::AuthUser;
use crate::state::AppState;

/// GET /api/v1/schedule/calendar.ics
#[instrument(skip(state, user), fields(user_id = %user.id()))]
pub async fn calendar(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let ics = state.billing.calendar(user.id(), Utc::now()).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, attachment("vidya-schedule.ics")),
        ],
        ics,
    ))
}
