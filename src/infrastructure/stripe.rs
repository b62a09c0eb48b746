use super::outbound::{build_client, error_body, send_with_retry, SendError};
use crate::domain::{Plan, METADATA_ACCOUNT_ID, METADATA_PLAN, METADATA_PRICE_ID};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{header, Client};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment provider request failed: {0}")]
    RequestFailed(String),
    #[error("Payment provider rate limited")]
    RateLimited,
    #[error("Payment provider rejected the request: {0}")]
    Rejected(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<SendError> for PaymentError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::RateLimited => PaymentError::RateLimited,
            SendError::Transport(msg) => PaymentError::RequestFailed(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub account_id: Uuid,
    pub email: String,
    /// Reused so repeat purchases stay on one customer record.
    pub customer_id: Option<String>,
    pub plan: Plan,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;
}

pub struct StripeClient {
    client: Client,
    base_url: String,
}

impl StripeClient {
    pub fn new(secret_key: &str, timeout: Duration) -> Result<Self, PaymentError> {
        let mut headers = header::HeaderMap::new();
        let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", secret_key))
            .map_err(|e| PaymentError::InvalidConfig(format!("Invalid secret key format: {}", e)))?;
        headers.insert(header::AUTHORIZATION, auth_value);

        let client = build_client(headers, timeout)
            .map_err(|e| PaymentError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: STRIPE_API_BASE.to_string(),
        })
    }
}

fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "subscription".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        ("line_items[0][price]".to_string(), request.price_id.clone()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("client_reference_id".to_string(), request.account_id.to_string()),
        (
            format!("metadata[{}]", METADATA_ACCOUNT_ID),
            request.account_id.to_string(),
        ),
        (format!("metadata[{}]", METADATA_PLAN), request.plan.to_string()),
        (
            format!("metadata[{}]", METADATA_PRICE_ID),
            request.price_id.clone(),
        ),
    ];

    match &request.customer_id {
        Some(customer) => form.push(("customer".to_string(), customer.clone())),
        None => form.push(("customer_email".to_string(), request.email.clone())),
    }

    form
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let form = checkout_form(request);
        // One key across retries so a resend cannot open a second session.
        let idempotency_key = Uuid::new_v4().to_string();
        let url = format!("{}/checkout/sessions", self.base_url);

        let resp = send_with_retry(|| {
            self.client
                .post(&url)
                .header("Idempotency-Key", idempotency_key.as_str())
                .form(&form)
        })
        .await?;

        if !resp.status().is_success() {
            return Err(PaymentError::Rejected(error_body(resp).await));
        }

        resp.json::<CheckoutSession>()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum SignatureError {
    #[error("Webhook signing secret is not configured")]
    NotConfigured,
    #[error("Missing signature header")]
    Missing,
    #[error("Malformed signature header")]
    Malformed,
    #[error("Signature timestamp outside tolerance")]
    Expired,
    #[error("No signature matches the payload")]
    Mismatch,
}

/// Checks the `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`)
/// against an HMAC-SHA256 of `"{t}.{body}"`.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_signature_header(header: &str) -> Result<SignatureHeader, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Ok(SignatureHeader {
            timestamp,
            signatures,
        }),
        _ => Err(SignatureError::Malformed),
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// An empty secret would let anyone sign events.
    pub fn is_configured(&self) -> bool {
        !self.secret.trim().is_empty()
    }

    fn mac_for(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| SignatureError::Mismatch)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }

    pub fn verify(
        &self,
        header: Option<&str>,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        if !self.is_configured() {
            return Err(SignatureError::NotConfigured);
        }
        let header = header.ok_or(SignatureError::Missing)?;
        let parsed = parse_signature_header(header)?;

        if (now.timestamp() - parsed.timestamp).abs() > self.tolerance_secs {
            return Err(SignatureError::Expired);
        }

        for candidate in &parsed.signatures {
            // verify_slice compares in constant time
            if self
                .mac_for(parsed.timestamp, payload)?
                .verify_slice(candidate)
                .is_ok()
            {
                return Ok(());
            }
        }

        Err(SignatureError::Mismatch)
    }

    /// Produces a header value for `payload`; used by tests and local tooling.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let signature = match self.mac_for(timestamp, payload) {
            Ok(mac) => hex::encode(mac.finalize().into_bytes()),
            Err(_) => String::new(),
        };
        format!("t={},v1={}", timestamp, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &str = "whsec_test_secret";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn accepts_valid_signature() {
        let verifier = WebhookVerifier::new(SECRET, 300);
        let body = br#"{"id":"evt_1"}"#;
        let header = verifier.sign(body, now().timestamp());
        assert_eq!(verifier.verify(Some(&header), body, now()), Ok(()));
    }

    #[test]
    fn accepts_when_any_v1_matches() {
        let verifier = WebhookVerifier::new(SECRET, 300);
        let body = br#"{"id":"evt_1"}"#;
        let good = verifier.sign(body, now().timestamp());
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={}", now().timestamp(), "00".repeat(32), good_sig);
        assert_eq!(verifier.verify(Some(&header), body, now()), Ok(()));
    }

    #[test]
    fn rejects_tampered_body() {
        let verifier = WebhookVerifier::new(SECRET, 300);
        let header = verifier.sign(br#"{"id":"evt_1"}"#, now().timestamp());
        assert_eq!(
            verifier.verify(Some(&header), br#"{"id":"evt_2"}"#, now()),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_wrong_secret() {
        let signer = WebhookVerifier::new("whsec_other", 300);
        let verifier = WebhookVerifier::new(SECRET, 300);
        let body = b"{}";
        let header = signer.sign(body, now().timestamp());
        assert_eq!(
            verifier.verify(Some(&header), body, now()),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let verifier = WebhookVerifier::new(SECRET, 300);
        let body = b"{}";
        let header = verifier.sign(body, now().timestamp() - 301);
        assert_eq!(
            verifier.verify(Some(&header), body, now()),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn rejects_missing_and_malformed_headers() {
        let verifier = WebhookVerifier::new(SECRET, 300);
        assert_eq!(verifier.verify(None, b"{}", now()), Err(SignatureError::Missing));
        assert_eq!(
            verifier.verify(Some("garbage"), b"{}", now()),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verifier.verify(Some("t=123"), b"{}", now()),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn empty_secret_rejects_self_signed_events() {
        let body = br#"{"id":"evt_1"}"#;
        for secret in ["", "   "] {
            let verifier = WebhookVerifier::new(secret, 300);
            assert!(!verifier.is_configured());
            let header = verifier.sign(body, now().timestamp());
            assert_eq!(
                verifier.verify(Some(&header), body, now()),
                Err(SignatureError::NotConfigured)
            );
        }
        assert!(WebhookVerifier::new(SECRET, 300).is_configured());
    }

    #[test]
    fn checkout_form_prefers_existing_customer() {
        let mut request = CheckoutRequest {
            account_id: Uuid::new_v4(),
            email: "a@example.com".to_string(),
            customer_id: None,
            plan: Plan::Team,
            price_id: "price_team".to_string(),
            success_url: "https://app/#/dashboard?success=true".to_string(),
            cancel_url: "https://app/#/pricing?canceled=true".to_string(),
        };
        let form = checkout_form(&request);
        assert!(form.contains(&("customer_email".to_string(), "a@example.com".to_string())));
        assert!(form.contains(&("metadata[plan]".to_string(), "team".to_string())));
        assert!(form.contains(&("metadata[price_id]".to_string(), "price_team".to_string())));

        request.customer_id = Some("cus_1".to_string());
        let form = checkout_form(&request);
        assert!(form.contains(&("customer".to_string(), "cus_1".to_string())));
        assert!(!form.iter().any(|(k, _)| k == "customer_email"));
    }
}
