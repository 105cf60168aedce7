//! Razorpay webhook handler

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;

use vidya_billing_core::{BillingError, WebhookAck, SIGNATURE_HEADER};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// POST /webhooks/razorpay
///
/// Verifies the HMAC signature over the raw body before any parsing.
/// Invalid signatures and malformed payloads get 400; failures while
/// applying a recognized event get 500 so the gateway redelivers.
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let signature = match headers.get(SIGNATURE_HEADER) {
        Some(value) => match value.to_str() {
            Ok(s) => Some(s),
            Err(_) => {
                tracing::warn!("Invalid webhook signature header encoding");
                return Err(ApiError::InvalidSignature);
            }
        },
        None => None,
    };

    match state
        .billing
        .handle_webhook(&body, signature, Utc::now())
        .await
    {
        Ok(ack) => {
            tracing::debug!(event = %ack.event, handled = ack.handled, "Webhook acknowledged");
            Ok(Json(ack))
        }
        Err(BillingError::InvalidSignature) => {
            tracing::warn!(body_len = body.len(), "Webhook signature rejected");
            Err(ApiError::InvalidSignature)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                client_error = e.is_client_error(),
                "Webhook processing failed"
            );
            Err(e.into())
        }
    }
}
