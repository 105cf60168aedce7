//! Liveness and readiness probes

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub database_latency_ms: u64,
    /// False when the webhook secret is unset and signatures go unchecked
    pub webhook_signatures: bool,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /ready
///
/// 503 until the database answers a trivial query.
pub async fn ready(State(state): State<AppState>) -> Response {
    let start = Instant::now();
    let ping = sqlx::query("SELECT 1").execute(&state.pool).await;
    let latency = start.elapsed().as_millis() as u64;

    let webhook_signatures = state.billing.config().webhook_secret.is_some();
    let (status, body) = match ping {
        Ok(_) => (
            StatusCode::OK,
            ReadyResponse {
                status: "ready",
                database: "connected",
                database_latency_ms: latency,
                webhook_signatures,
            },
        ),
        Err(e) => {
            tracing::error!(error = ?e, latency_ms = latency, "Database readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                ReadyResponse {
                    status: "unavailable",
                    database: "unreachable",
                    database_latency_ms: latency,
                    webhook_signatures,
                },
            )
        }
    };
    (status, Json(body)).into_response()
}
