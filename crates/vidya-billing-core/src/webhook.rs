//! Payment gateway webhook handling
//!
//! The gateway signs the raw request body with HMAC-SHA256 and sends the hex
//! digest in `x-razorpay-signature`. The signature is checked before the body
//! is parsed. Payloads look like
//! `{"event": "payment.captured", "payload": {"payment": {"entity": {...}}}}`.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, instrument, warn};

use crate::error::BillingError;

/// Header carrying the webhook signature
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `message` under `secret`
pub fn sign(message: &[u8], secret: &str) -> Result<String, BillingError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::Internal("HMAC error".to_string()))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature over `message`
pub fn verify_signature(message: &[u8], signature: &str, secret: &str) -> Result<(), BillingError> {
    let expected = sign(message, secret)?;
    let provided = signature.trim().to_ascii_lowercase();

    if expected.as_bytes().ct_eq(provided.as_bytes()).into() {
        Ok(())
    } else {
        Err(BillingError::InvalidSignature)
    }
}

/// Verify a client-side payment confirmation: the signed message is `"{order_id}|{payment_id}"`.
pub fn verify_payment_signature(
    order_id: &str,
    payment_id: &str,
    signature: &str,
    key_secret: &str,
) -> Result<(), BillingError> {
    let message = format!("{order_id}|{payment_id}");
    verify_signature(message.as_bytes(), signature, key_secret)
}

/// Payment entity as sent by the gateway
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    /// Amount in paise
    #[serde(default)]
    pub amount: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

fn default_currency() -> String {
    "INR".to_string()
}

/// Subscription entity as sent by the gateway
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionEntity {
    pub id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Parsed webhook event
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    PaymentCaptured(PaymentEntity),
    PaymentFailed(PaymentEntity),
    SubscriptionActivated(SubscriptionEntity),
    SubscriptionCancelled(SubscriptionEntity),
    SubscriptionCharged {
        subscription: SubscriptionEntity,
        payment: PaymentEntity,
    },
    /// Event type this service does not handle
    Unknown(String),
}

impl WebhookEvent {
    /// Gateway event name
    pub fn name(&self) -> &str {
        match self {
            Self::PaymentCaptured(_) => "payment.captured",
            Self::PaymentFailed(_) => "payment.failed",
            Self::SubscriptionActivated(_) => "subscription.activated",
            Self::SubscriptionCancelled(_) => "subscription.cancelled",
            Self::SubscriptionCharged { .. } => "subscription.charged",
            Self::Unknown(name) => name,
        }
    }
}

/// Webhook verifier and parser
#[derive(Clone)]
pub struct WebhookHandler {
    webhook_secret: Option<String>,
}

impl WebhookHandler {
    /// Create a handler. Without a secret, signatures are not checked.
    pub fn new(webhook_secret: Option<String>) -> Self {
        if webhook_secret.is_none() {
            warn!("webhook secret not configured; signatures will not be verified");
        }
        Self { webhook_secret }
    }

    /// Verify and parse a webhook payload
    #[instrument(skip(self, payload, signature))]
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, BillingError> {
        match &self.webhook_secret {
            Some(secret) => {
                let signature = signature.ok_or(BillingError::InvalidSignature)?;
                verify_signature(payload, signature, secret).inspect_err(|_| {
                    warn!("webhook signature verification failed");
                })?;
            }
            None => warn!("skipping webhook signature verification"),
        }

        let event = parse_event(payload)?;
        debug!(event = event.name(), "parsed webhook event");
        Ok(event)
    }
}

/// Parse a raw webhook body into a typed event
pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, BillingError> {
    let raw: RawEvent =
        serde_json::from_slice(payload).map_err(|e| BillingError::MalformedEvent(e.to_string()))?;

    let event = match raw.event.as_str() {
        "payment.captured" => WebhookEvent::PaymentCaptured(raw.payload.payment()?),
        "payment.failed" => WebhookEvent::PaymentFailed(raw.payload.payment()?),
        "subscription.activated" => {
            WebhookEvent::SubscriptionActivated(raw.payload.subscription()?)
        }
        "subscription.cancelled" => {
            WebhookEvent::SubscriptionCancelled(raw.payload.subscription()?)
        }
        "subscription.charged" => WebhookEvent::SubscriptionCharged {
            subscription: raw.payload.subscription()?,
            payment: raw.payload.payment()?,
        },
        _ => WebhookEvent::Unknown(raw.event),
    };

    Ok(event)
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    event: String,
    #[serde(default)]
    payload: RawPayload,
}

#[derive(Debug, Default, Deserialize)]
struct RawPayload {
    payment: Option<Wrapped<PaymentEntity>>,
    subscription: Option<Wrapped<SubscriptionEntity>>,
}

#[derive(Debug, Deserialize)]
struct Wrapped<T> {
    entity: T,
}

impl RawPayload {
    fn payment(&self) -> Result<PaymentEntity, BillingError> {
        self.payment
            .as_ref()
            .map(|w| w.entity.clone())
            .ok_or_else(|| BillingError::MalformedEvent("missing payment entity".to_string()))
    }

    fn subscription(&self) -> Result<SubscriptionEntity, BillingError> {
        self.subscription
            .as_ref()
            .map(|w| w.entity.clone())
            .ok_or_else(|| BillingError::MalformedEvent("missing subscription entity".to_string()))
    }
}
