// ============================================================================
// Payment Gateway - PayMongo-style REST API
// ============================================================================
//
// - PaymentGateway: the seam the payment service talks to
// - PayMongoClient: reqwest implementation behind retry + circuit breaker
// - webhook: signature verification and event parsing
//
// All amounts cross this boundary as integer centavos.
//
// ============================================================================

mod paymongo;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::money::Money;
use crate::domain::order::PaymentMethod;
use crate::utils::IsTransient;

pub use paymongo::PayMongoClient;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Payment gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Payment gateway rejected the request ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Unexpected payment gateway response: {0}")]
    InvalidResponse(String),

    #[error("Payment method {0} is not paid through the payment gateway")]
    UnsupportedMethod(PaymentMethod),

    #[error("Payment gateway is temporarily unavailable")]
    CircuitOpen,
}

impl IsTransient for GatewayError {
    fn is_transient(&self) -> bool {
        match self {
            GatewayError::Transport(e) => e.is_timeout() || e.is_connect(),
            GatewayError::Rejected { status, .. } => *status >= 500 || *status == 429,
            GatewayError::InvalidResponse(_)
            | GatewayError::UnsupportedMethod(_)
            | GatewayError::CircuitOpen => false,
        }
    }
}

/// Raw `{ id, attributes }` object returned under `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub attributes: Value,
}

impl Resource {
    fn str_attr(&self, key: &str) -> Option<String> {
        self.attributes.get(key).and_then(Value::as_str).map(str::to_string)
    }

    fn amount(&self) -> Money {
        Money::from_cents(self.attributes.get("amount").and_then(Value::as_i64).unwrap_or(0))
    }

    /// `attributes.metadata.order_id`, when it parses as an order id.
    pub fn order_id(&self) -> Option<Uuid> {
        self.attributes
            .pointer("/metadata/order_id")
            .and_then(Value::as_str)
            .and_then(|id| Uuid::parse_str(id).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentStatus {
    AwaitingPaymentMethod,
    AwaitingNextAction,
    Processing,
    Succeeded,
    Other(String),
}

impl IntentStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "awaiting_payment_method" => IntentStatus::AwaitingPaymentMethod,
            // older API versions report requires_action
            "awaiting_next_action" | "requires_action" => IntentStatus::AwaitingNextAction,
            "processing" => IntentStatus::Processing,
            "succeeded" => IntentStatus::Succeeded,
            other => IntentStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            IntentStatus::AwaitingPaymentMethod => "awaiting_payment_method",
            IntentStatus::AwaitingNextAction => "awaiting_next_action",
            IntentStatus::Processing => "processing",
            IntentStatus::Succeeded => "succeeded",
            IntentStatus::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(serialize_with = "serialize_status")]
    pub status: IntentStatus,
    pub amount: Money,
    pub client_key: Option<String>,
    pub next_action: Option<Value>,
    /// First payment made against the intent; refunds target this id.
    pub payment_id: Option<String>,
    pub last_error: Option<String>,
}

fn serialize_status<S: serde::Serializer>(status: &IntentStatus, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(status.as_str())
}

impl PaymentIntent {
    pub fn from_resource(resource: Resource) -> Self {
        let status = IntentStatus::parse(&resource.str_attr("status").unwrap_or_default());
        let payment_id = resource
            .attributes
            .pointer("/payments/0/id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let last_error = resource
            .attributes
            .pointer("/last_payment_error/failed_message")
            .and_then(Value::as_str)
            .map(str::to_string);
        let next_action = resource
            .attributes
            .get("next_action")
            .filter(|v| !v.is_null())
            .cloned();

        Self {
            amount: resource.amount(),
            client_key: resource.str_attr("client_key"),
            id: resource.id,
            status,
            next_action,
            payment_id,
            last_error,
        }
    }
}

/// Redirect-based e-wallet source.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSource {
    pub id: String,
    pub status: String,
    pub amount: Money,
    pub checkout_url: Option<String>,
}

impl PaymentSource {
    pub fn from_resource(resource: Resource) -> Self {
        let checkout_url = resource
            .attributes
            .pointer("/redirect/checkout_url")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            status: resource.str_attr("status").unwrap_or_default(),
            amount: resource.amount(),
            checkout_url,
            id: resource.id,
        }
    }
}

/// A created payment or refund.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayCharge {
    pub id: String,
    pub status: String,
    pub amount: Money,
}

impl GatewayCharge {
    pub fn from_resource(resource: Resource) -> Self {
        Self {
            status: resource.str_attr("status").unwrap_or_default(),
            amount: resource.amount(),
            id: resource.id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Gcash,
    Maya,
}

impl SourceType {
    pub fn for_method(method: PaymentMethod) -> Option<Self> {
        match method {
            PaymentMethod::Gcash => Some(SourceType::Gcash),
            PaymentMethod::Maya => Some(SourceType::Maya),
            PaymentMethod::CreditCard
            | PaymentMethod::Paypal
            | PaymentMethod::Stripe
            | PaymentMethod::BankTransfer
            | PaymentMethod::CashDeposit
            | PaymentMethod::OverCounter => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Gcash => "gcash",
            SourceType::Maya => "paymaya",
        }
    }
}

/// What every gateway charge is tagged with.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub amount: Money,
    pub description: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        request: &ChargeRequest,
        method: PaymentMethod,
    ) -> Result<PaymentIntent, GatewayError>;

    async fn create_source(&self, request: &ChargeRequest, source_type: SourceType)
        -> Result<PaymentSource, GatewayError>;

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError>;

    /// Charge a source the customer has authorized.
    async fn create_payment(&self, source_id: &str, request: &ChargeRequest) -> Result<GatewayCharge, GatewayError>;

    async fn create_refund(&self, payment_id: &str, amount: Money) -> Result<GatewayCharge, GatewayError>;

    /// A refund already issued against the payment, if any.
    async fn find_refund(&self, payment_id: &str) -> Result<Option<GatewayCharge>, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_intent_from_resource() {
        let resource: Resource = serde_json::from_value(json!({
            "id": "pi_123",
            "attributes": {
                "amount": 59_800,
                "status": "succeeded",
                "client_key": "pi_123_client_abc",
                "next_action": null,
                "payments": [{ "id": "pay_456" }]
            }
        }))
        .unwrap();

        let intent = PaymentIntent::from_resource(resource);
        assert_eq!(intent.status, IntentStatus::Succeeded);
        assert_eq!(intent.amount, Money::from_cents(59_800));
        assert_eq!(intent.payment_id.as_deref(), Some("pay_456"));
        assert!(intent.next_action.is_none());
    }

    #[test]
    fn test_legacy_requires_action_is_awaiting_next_action() {
        assert_eq!(IntentStatus::parse("requires_action"), IntentStatus::AwaitingNextAction);
        assert_eq!(IntentStatus::parse("expired"), IntentStatus::Other("expired".into()));
    }

    #[test]
    fn test_source_checkout_url_and_metadata() {
        let resource: Resource = serde_json::from_value(json!({
            "id": "src_1",
            "attributes": {
                "amount": 10_000,
                "status": "pending",
                "redirect": { "checkout_url": "https://pay.example/checkout" },
                "metadata": { "order_id": "0190b4a4-7d2e-7c1b-9f00-000000000001" }
            }
        }))
        .unwrap();

        assert!(resource.order_id().is_some());
        let source = PaymentSource::from_resource(resource);
        assert_eq!(source.checkout_url.as_deref(), Some("https://pay.example/checkout"));
    }

    #[test]
    fn test_transient_classification() {
        let server = GatewayError::Rejected { status: 503, detail: "down".into() };
        let throttled = GatewayError::Rejected { status: 429, detail: "slow down".into() };
        let bad = GatewayError::Rejected { status: 400, detail: "amount invalid".into() };
        assert!(server.is_transient());
        assert!(throttled.is_transient());
        assert!(!bad.is_transient());
        assert!(!GatewayError::CircuitOpen.is_transient());
    }

    #[test]
    fn test_source_types() {
        assert_eq!(SourceType::for_method(PaymentMethod::Maya).map(|s| s.as_str()), Some("paymaya"));
        assert_eq!(SourceType::for_method(PaymentMethod::CreditCard), None);
    }
}
