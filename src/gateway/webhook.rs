use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::Resource;

// ============================================================================
// Gateway Webhooks - signature verification and event parsing
// ============================================================================
//
// Header format: `Paymongo-Signature: t=<unix>,te=<test sig>,li=<live sig>`
// Signature: hex(HMAC-SHA256(secret, "<t>.<raw body>"))
//
// ============================================================================

pub const SIGNATURE_HEADER: &str = "Paymongo-Signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum WebhookError {
    #[error("Webhook verification is not configured")]
    NotConfigured,

    #[error("Missing webhook signature")]
    MissingSignature,

    #[error("Malformed webhook signature header")]
    MalformedSignature,

    #[error("Webhook signature does not match")]
    SignatureMismatch,

    #[error("Webhook timestamp outside tolerance")]
    Stale,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),
}

#[derive(Debug, PartialEq)]
struct SignatureHeader {
    timestamp: i64,
    test: Option<String>,
    live: Option<String>,
}

fn parse_header(header: &str) -> Result<SignatureHeader, WebhookError> {
    let mut timestamp = None;
    let mut test = None;
    let mut live = None;

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            return Err(WebhookError::MalformedSignature);
        };
        let value = value.trim();
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            "te" if !value.is_empty() => test = Some(value.to_string()),
            "li" if !value.is_empty() => live = Some(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MalformedSignature)?;
    if test.is_none() && live.is_none() {
        return Err(WebhookError::MalformedSignature);
    }
    Ok(SignatureHeader { timestamp, test, live })
}

pub(crate) fn sign(secret: &str, timestamp: i64, body: &[u8]) -> Result<Vec<u8>, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::NotConfigured)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Check a delivery against the shared secret.
///
/// A missing secret rejects every delivery. The live signature is used when
/// present, the test signature otherwise.
pub fn verify_signature(
    secret: Option<&str>,
    header: Option<&str>,
    body: &[u8],
    now_unix: i64,
    tolerance: Duration,
) -> Result<(), WebhookError> {
    let secret = secret.ok_or(WebhookError::NotConfigured)?;
    let header = parse_header(header.ok_or(WebhookError::MissingSignature)?)?;

    let age = now_unix.saturating_sub(header.timestamp).unsigned_abs();
    if age > tolerance.as_secs() {
        return Err(WebhookError::Stale);
    }

    let provided = header
        .live
        .as_deref()
        .or(header.test.as_deref())
        .ok_or(WebhookError::MalformedSignature)?;
    let provided = hex::decode(provided).map_err(|_| WebhookError::MalformedSignature)?;
    let expected = sign(secret, header.timestamp, body)?;

    if expected.ct_eq(&provided).into() {
        Ok(())
    } else {
        Err(WebhookError::SignatureMismatch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    PaymentSucceeded,
    PaymentFailed,
    SourceChargeable,
    Ignored,
}

#[derive(Deserialize)]
struct Payload {
    data: EventData,
}

#[derive(Deserialize)]
struct EventData {
    id: String,
    attributes: EventAttributes,
}

#[derive(Deserialize)]
struct EventAttributes {
    #[serde(rename = "type")]
    event_type: String,
    data: Resource,
}

/// A parsed delivery: the event and the resource it concerns.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub resource: Resource,
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        let payload: Payload =
            serde_json::from_slice(body).map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        Ok(Self {
            id: payload.data.id,
            event_type: payload.data.attributes.event_type,
            resource: payload.data.attributes.data,
        })
    }

    pub fn kind(&self) -> WebhookKind {
        match self.event_type.as_str() {
            "payment.paid" | "payment_intent.succeeded" => WebhookKind::PaymentSucceeded,
            "payment.failed" | "payment_intent.payment_failed" => WebhookKind::PaymentFailed,
            "source.chargeable" => WebhookKind::SourceChargeable,
            _ => WebhookKind::Ignored,
        }
    }

    pub fn order_id(&self) -> Option<Uuid> {
        self.resource.order_id()
    }

    /// Gateway references that may have been recorded on the order: the
    /// resource itself, its intent or its source.
    pub fn references(&self) -> Vec<String> {
        let attrs = &self.resource.attributes;
        let mut refs = vec![self.resource.id.clone()];
        for pointer in ["/payment_intent_id", "/source/id"] {
            if let Some(id) = attrs.pointer(pointer).and_then(Value::as_str) {
                refs.push(id.to_string());
            }
        }
        refs
    }

    /// Id of the payment that settled the order.
    pub fn payment_id(&self) -> String {
        self.resource
            .attributes
            .pointer("/payments/0/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.resource.id.clone())
    }

    pub fn failure_reason(&self) -> String {
        let attrs = &self.resource.attributes;
        attrs
            .pointer("/last_payment_error/failed_message")
            .or_else(|| attrs.get("failed_message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Payment failed ({})", self.event_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "whsk_test_secret";

    fn header_for(body: &[u8], timestamp: i64) -> String {
        let sig = hex::encode(sign(SECRET, timestamp, body).unwrap());
        format!("t={timestamp},te={sig},li=")
    }

    #[test]
    fn test_valid_signature() {
        let body = br#"{"data":{}}"#;
        let header = header_for(body, 1_700_000_000);
        let result = verify_signature(Some(SECRET), Some(&header), body, 1_700_000_010, Duration::from_secs(300));
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let header = header_for(br#"{"amount":100}"#, 1_700_000_000);
        let result = verify_signature(
            Some(SECRET),
            Some(&header),
            br#"{"amount":999}"#,
            1_700_000_000,
            Duration::from_secs(300),
        );
        assert_eq!(result, Err(WebhookError::SignatureMismatch));
    }

    #[test]
    fn test_stale_and_missing() {
        let body = b"{}";
        let header = header_for(body, 1_700_000_000);
        assert_eq!(
            verify_signature(Some(SECRET), Some(&header), body, 1_700_001_000, Duration::from_secs(300)),
            Err(WebhookError::Stale)
        );
        assert_eq!(
            verify_signature(Some(SECRET), None, body, 0, Duration::from_secs(300)),
            Err(WebhookError::MissingSignature)
        );
        assert_eq!(
            verify_signature(None, Some(&header), body, 1_700_000_000, Duration::from_secs(300)),
            Err(WebhookError::NotConfigured)
        );
        assert_eq!(
            verify_signature(Some(SECRET), Some("garbage"), body, 0, Duration::from_secs(300)),
            Err(WebhookError::MalformedSignature)
        );
    }

    #[test]
    fn test_live_signature_preferred() {
        let body = b"{}";
        let good = hex::encode(sign(SECRET, 10, body).unwrap());
        let header = format!("t=10,te=00,li={good}");
        assert_eq!(verify_signature(Some(SECRET), Some(&header), body, 10, Duration::from_secs(5)), Ok(()));
    }

    #[test]
    fn test_parse_payment_paid_event() {
        let body = serde_json::to_vec(&json!({
            "data": {
                "id": "evt_1",
                "attributes": {
                    "type": "payment.paid",
                    "data": {
                        "id": "pay_9",
                        "attributes": {
                            "amount": 100,
                            "payment_intent_id": "pi_7",
                            "metadata": { "order_id": "0190b4a4-7d2e-7c1b-9f00-000000000001" }
                        }
                    }
                }
            }
        }))
        .unwrap();

        let event = WebhookEvent::parse(&body).unwrap();
        assert_eq!(event.kind(), WebhookKind::PaymentSucceeded);
        assert!(event.order_id().is_some());
        assert_eq!(event.references(), vec!["pay_9".to_string(), "pi_7".to_string()]);
        assert_eq!(event.payment_id(), "pay_9");
    }

    #[test]
    fn test_unknown_event_ignored() {
        let body = br#"{"data":{"id":"evt_2","attributes":{"type":"checkout_session.payment.paid","data":{"id":"cs_1"}}}}"#;
        let event = WebhookEvent::parse(body).unwrap();
        assert_eq!(event.kind(), WebhookKind::Ignored);
        assert!(event.order_id().is_none());
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(WebhookEvent::parse(b"not json"), Err(WebhookError::MalformedPayload(_))));
    }
}
