//! Vidya API
//!
//! REST surface for subscriptions, entitlements, payments, referrals and
//! the admin revenue dashboard.
//!
//! ## REST Endpoints
//!
//! - `GET /api/v1/subscription` - Subscription overview
//! - `POST /api/v1/subscription/trial` - Start trial
//! - `POST /api/v1/subscription/cancel` - Cancel subscription
//! - `GET /api/v1/entitlements` - Usage summary
//! - `GET /api/v1/entitlements/{feature}` - Entitlement check
//! - `POST /api/v1/entitlements/{feature}/usage` - Record one use
//! - `GET /api/v1/invoices` - List own invoices
//! - `POST /api/v1/payments/verify` - Client payment verification
//! - `POST /api/v1/coupons/validate` - Coupon validation
//! - `GET /api/v1/schedule/calendar.ics` - Study schedule feed
//! - `POST /api/v1/referrals/reward` - Apply referral reward (admin)
//! - `GET /api/v1/admin/revenue` - Revenue metrics (admin)
//! - `GET /api/v1/admin/revenue/daily` - Daily revenue series (admin)
//! - `GET /api/v1/admin/transactions/export` - Transaction CSV (admin)
//! - `POST /webhooks/razorpay` - Razorpay webhook handler
//!
//! ## Health Endpoints
//!
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe
//! - `GET /metrics` - Prometheus metrics

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub use crate::config::{Config, ConfigError};
pub use crate::error::{ApiError, ApiResult};
pub use crate::state::AppState;

/// Build the HTTP router with all routes and middleware
pub fn build_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let request_timeout = state.request_timeout();

    let api_v1 = Router::new()
        // Subscription routes
        .route("/subscription", get(handlers::get_subscription))
        .route("/subscription/trial", post(handlers::start_trial))
        .route("/subscription/cancel", post(handlers::cancel_subscription))
        // Entitlement routes
        .route("/entitlements", get(handlers::usage_summary))
        .route("/entitlements/{feature}", get(handlers::check_entitlement))
        .route(
            "/entitlements/{feature}/usage",
            post(handlers::increment_usage),
        )
        // Payment routes
        .route("/invoices", get(handlers::list_invoices))
        .route("/payments/verify", post(handlers::verify_payment))
        .route("/coupons/validate", post(handlers::validate_coupon))
        .route("/schedule/calendar.ics", get(handlers::calendar))
        // Admin routes
        .route("/referrals/reward", post(handlers::apply_referral_reward))
        .route("/admin/revenue", get(handlers::revenue_metrics))
        .route("/admin/revenue/daily", get(handlers::daily_revenue))
        .route(
            "/admin/transactions/export",
            get(handlers::export_transactions),
        );

    // Webhook route (separate - uses raw body, no JSON parsing)
    let webhook_routes =
        Router::new().route("/webhooks/razorpay", post(handlers::razorpay_webhook));

    // Health routes (no timeout - must always respond quickly)
    let health_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready));

    let metrics_route = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    // Outermost first
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(webhook_routes)
        .layer(middleware)
        .merge(health_routes)
        .merge(metrics_route)
        .with_state(state)
}
