//! Stripe and Razorpay clients plus webhook signature checks.

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

use crate::config::{RazorpaySettings, StripeSettings};
use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API: &str = "https://api.stripe.com/v1";
const RAZORPAY_API: &str = "https://api.razorpay.com/v1";

/// Maximum age of a signed Stripe webhook, in seconds.
pub const STRIPE_SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway rejected the request ({status}): {message}")]
    Gateway { status: u16, message: String },
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotConfigured(gateway) => {
                ApiError::ServiceUnavailable(format!("{} payments are not configured", gateway))
            }
            other => {
                tracing::error!(error = %other, "Payment gateway error");
                ApiError::ServiceUnavailable("Payment gateway unavailable".to_string())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
}

/// Who is paying for which plan. Sent as gateway metadata / notes and read
/// back from webhooks.
#[derive(Debug, Clone)]
pub struct PaymentTag {
    pub company_id: i64,
    pub user_id: i64,
    pub plan: String,
}

impl PaymentTag {
    fn entries(&self) -> [(&'static str, String); 3] {
        [
            ("company_id", self.company_id.to_string()),
            ("plan", self.plan.clone()),
            ("user_id", self.user_id.to_string()),
        ]
    }
}

#[derive(Clone)]
pub struct PaymentGateways {
    client: Client,
    stripe: StripeSettings,
    razorpay: RazorpaySettings,
}

impl PaymentGateways {
    pub fn new(stripe: StripeSettings, razorpay: RazorpaySettings) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        tracing::info!(
            stripe = stripe.secret_key.is_some(),
            razorpay = razorpay.key_id.is_some() && razorpay.key_secret.is_some(),
            "Payment gateways initialized"
        );

        Ok(Self {
            client,
            stripe,
            razorpay,
        })
    }

    pub fn stripe_publishable_key(&self) -> Option<&str> {
        self.stripe.publishable_key.as_deref()
    }

    pub fn stripe_webhook_secret(&self) -> Option<&str> {
        self.stripe.webhook_secret.as_deref()
    }

    pub fn razorpay_key_id(&self) -> Option<&str> {
        self.razorpay.key_id.as_deref()
    }

    pub fn razorpay_webhook_secret(&self) -> Option<&str> {
        self.razorpay.webhook_secret.as_deref()
    }

    /// `amount` is in cents.
    pub async fn create_stripe_intent(
        &self,
        amount: i64,
        tag: &PaymentTag,
    ) -> Result<PaymentIntent, PaymentError> {
        let secret = self
            .stripe
            .secret_key
            .as_deref()
            .ok_or(PaymentError::NotConfigured("Stripe"))?;

        let mut form = vec![
            ("amount".to_string(), amount.to_string()),
            ("currency".to_string(), "usd".to_string()),
        ];
        for (key, value) in tag.entries() {
            form.push((format!("metadata[{}]", key), value));
        }

        let response = self
            .client
            .post(format!("{}/payment_intents", STRIPE_API))
            .bearer_auth(secret)
            .form(&form)
            .send()
            .await?;

        let intent: PaymentIntent = decode(response).await?;
        tracing::info!(
            intent_id = %intent.id,
            company_id = tag.company_id,
            "Stripe payment intent created"
        );
        Ok(intent)
    }

    /// `amount` is in paise.
    pub async fn create_razorpay_order(
        &self,
        amount: i64,
        receipt: &str,
        tag: &PaymentTag,
    ) -> Result<RazorpayOrder, PaymentError> {
        let (Some(key_id), Some(key_secret)) =
            (self.razorpay.key_id.as_deref(), self.razorpay.key_secret.as_deref())
        else {
            return Err(PaymentError::NotConfigured("Razorpay"));
        };

        let notes: serde_json::Map<String, serde_json::Value> = tag
            .entries()
            .into_iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v)))
            .collect();

        let response = self
            .client
            .post(format!("{}/orders", RAZORPAY_API))
            .basic_auth(key_id, Some(key_secret))
            .json(&serde_json::json!({
                "amount": amount,
                "currency": "INR",
                "receipt": receipt,
                "notes": notes,
            }))
            .send()
            .await?;

        let order: RazorpayOrder = decode(response).await?;
        tracing::info!(order_id = %order.id, company_id = tag.company_id, "Razorpay order created");
        Ok(order)
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, PaymentError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(PaymentError::Gateway {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.json::<T>().await?)
}

/// Checks a `Stripe-Signature` header (`t=...,v1=...`) against the raw body.
pub fn verify_stripe_signature(
    header: &str,
    body: &[u8],
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), &'static str> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or("Missing timestamp")?;
    if signatures.is_empty() {
        return Err("Missing signature");
    }
    let issued_at: i64 = timestamp.parse().map_err(|_| "Invalid timestamp")?;
    if now.abs_diff(issued_at) > tolerance_secs.unsigned_abs() {
        return Err("Timestamp outside tolerance");
    }

    let matches = signatures.iter().any(|sig| {
        let Ok(expected) = hex::decode(sig) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        mac.verify_slice(&expected).is_ok()
    });

    if matches {
        Ok(())
    } else {
        Err("Signature mismatch")
    }
}

/// Checks an `X-Razorpay-Signature` header: hex HMAC-SHA256 of the body.
pub fn verify_razorpay_signature(body: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// The parts of a Stripe webhook event the handlers read.
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: StripeIntentObject,
}

#[derive(Debug, Deserialize)]
pub struct StripeIntentObject {
    pub id: String,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayEvent {
    pub event: String,
    pub payload: RazorpayPayload,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayPayload {
    pub payment: Option<RazorpayPaymentWrapper>,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayPaymentWrapper {
    pub entity: RazorpayPayment,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayPayment {
    pub id: String,
    #[serde(default)]
    pub notes: serde_json::Value,
}

/// Reads `company_id`, `plan` and `user_id` back from gateway metadata.
/// Ids may arrive as strings or numbers.
pub fn tag_from_notes(notes: &serde_json::Value) -> Option<PaymentTag> {
    let field = |key: &str| -> Option<String> {
        match notes.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };
    Some(PaymentTag {
        company_id: field("company_id")?.parse().ok()?,
        user_id: field("user_id").and_then(|v| v.parse().ok()).unwrap_or(0),
        plan: field("plan")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, message: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn stripe_signature_accepts_valid_header() {
        let body = br#"{"type":"payment_intent.succeeded"}"#;
        let ts = 1_700_000_000i64;
        let signed = [ts.to_string().as_bytes(), b".", body.as_slice()].concat();
        let header = format!("t={},v1={}", ts, sign("whsec_test", &signed));

        assert_eq!(
            verify_stripe_signature(&header, body, "whsec_test", ts + 10, 300),
            Ok(())
        );
    }

    #[test]
    fn stripe_signature_rejects_tampering_and_stale_events() {
        let body = br#"{"type":"payment_intent.succeeded"}"#;
        let ts = 1_700_000_000i64;
        let signed = [ts.to_string().as_bytes(), b".", body.as_slice()].concat();
        let header = format!("t={},v1={}", ts, sign("whsec_test", &signed));

        assert!(verify_stripe_signature(&header, b"{}", "whsec_test", ts, 300).is_err());
        assert!(verify_stripe_signature(&header, body, "other", ts, 300).is_err());
        assert!(verify_stripe_signature(&header, body, "whsec_test", ts + 301, 300).is_err());
        assert!(verify_stripe_signature("v1=abc", body, "whsec_test", ts, 300).is_err());
        assert!(verify_stripe_signature("t=1", body, "whsec_test", 1, 300).is_err());

        let far_past = format!("t={},v1=00", i64::MIN);
        assert_eq!(
            verify_stripe_signature(&far_past, body, "whsec_test", ts, 300),
            Err("Timestamp outside tolerance")
        );
        let far_future = format!("t={},v1=00", i64::MAX);
        assert!(verify_stripe_signature(&far_future, body, "whsec_test", i64::MIN, 300).is_err());
    }

    #[test]
    fn razorpay_signature_round_trip() {
        let body = br#"{"event":"payment.captured"}"#;
        let signature = sign("rzp_secret", body);
        assert!(verify_razorpay_signature(body, &signature, "rzp_secret"));
        assert!(!verify_razorpay_signature(b"{}", &signature, "rzp_secret"));
        assert!(!verify_razorpay_signature(body, "not-hex", "rzp_secret"));
    }

    #[test]
    fn notes_accept_string_or_number_ids() {
        let tag = tag_from_notes(&serde_json::json!({
            "company_id": 4, "plan": "pro", "user_id": "9"
        }))
        .unwrap();
        assert_eq!((tag.company_id, tag.user_id, tag.plan.as_str()), (4, 9, "pro"));

        assert!(tag_from_notes(&serde_json::json!({ "plan": "pro" })).is_none());
    }

    #[test]
    fn razorpay_event_reads_payment_notes() {
        let event: RazorpayEvent = serde_json::from_value(serde_json::json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": {
                "id": "pay_1", "notes": { "company_id": "2", "plan": "enterprise" }
            } } }
        }))
        .unwrap();
        let payment = event.payload.payment.unwrap().entity;
        let tag = tag_from_notes(&payment.notes).unwrap();
        assert_eq!(tag.company_id, 2);
        assert_eq!(tag.plan, "enterprise");
    }
}
