use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::GatewayConfig;
use crate::domain::money::Money;
use crate::domain::order::PaymentMethod;
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, RetryConfig};

use super::{
    ChargeRequest, GatewayCharge, GatewayError, PaymentGateway, PaymentIntent, PaymentSource, Resource,
    SourceType,
};

const CURRENCY: &str = "PHP";
const STATEMENT_DESCRIPTOR: &str = "BOOKSTORE ORDER";

/// Every response wraps its payload in `data`: one resource, or a list.
#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    detail: Option<String>,
    code: Option<String>,
}

/// PayMongo REST client.
///
/// Reads are retried aggressively; creates get a single retry since the API
/// has no idempotency keys. Every call goes through one circuit breaker.
pub struct PayMongoClient {
    http: reqwest::Client,
    base_url: String,
    authorization: String,
    frontend_url: String,
    breaker: CircuitBreaker,
    metrics: Arc<Metrics>,
}

impl PayMongoClient {
    pub fn new(config: &GatewayConfig, frontend_url: &str, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        let breaker = CircuitBreaker::new(CircuitBreakerConfig::default()).with_metrics(metrics.clone());

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            authorization: basic_auth(&config.secret_key),
            frontend_url: frontend_url.to_string(),
            breaker,
            metrics,
        })
    }

    async fn send<T: DeserializeOwned + Send>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: Option<Value>,
        retry: RetryConfig,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let started = Instant::now();

        let result = self
            .breaker
            .call(async {
                retry_on_transient(&retry, operation, Some(self.metrics.as_ref()), |_attempt| {
                    let mut request = self
                        .http
                        .request(method.clone(), &url)
                        .header(reqwest::header::AUTHORIZATION, &self.authorization);
                    if let Some(body) = &body {
                        request = request.json(body);
                    }
                    async move { execute::<T>(request).await }
                })
                .await
                .into_result()
            })
            .await;

        let elapsed = started.elapsed().as_secs_f64();
        self.metrics.record_gateway_call(operation, elapsed, result.is_ok());

        match result {
            Ok(data) => {
                tracing::debug!(operation, elapsed, "Gateway call succeeded");
                Ok(data)
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::warn!(operation, "Gateway circuit open, failing fast");
                Err(GatewayError::CircuitOpen)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::warn!(operation, error = %e, "Gateway call failed");
                Err(e)
            }
        }
    }

    fn intent_body(&self, request: &ChargeRequest, method: PaymentMethod) -> Value {
        json!({
            "data": {
                "attributes": {
                    "amount": request.amount.cents(),
                    "payment_method_allowed": method.gateway_methods(),
                    "payment_method_options": {
                        "card": { "request_three_d_secure": "automatic" }
                    },
                    "currency": CURRENCY,
                    "description": request.description,
                    "statement_descriptor": STATEMENT_DESCRIPTOR,
                    "metadata": metadata(request),
                }
            }
        })
    }

    fn source_body(&self, request: &ChargeRequest, source_type: SourceType) -> Value {
        json!({
            "data": {
                "attributes": {
                    "amount": request.amount.cents(),
                    "redirect": {
                        "success": format!("{}/payment/success", self.frontend_url),
                        "failed": format!("{}/payment/failed", self.frontend_url),
                    },
                    "type": source_type.as_str(),
                    "currency": CURRENCY,
                    "description": request.description,
                    "metadata": metadata(request),
                }
            }
        })
    }
}

#[async_trait]
impl PaymentGateway for PayMongoClient {
    async fn create_payment_intent(
        &self,
        request: &ChargeRequest,
        method: PaymentMethod,
    ) -> Result<PaymentIntent, GatewayError> {
        if method.is_manual() || SourceType::for_method(method).is_some() {
            return Err(GatewayError::UnsupportedMethod(method));
        }
        let body = self.intent_body(request, method);
        let resource: Resource = self
            .send("create_payment_intent", Method::POST, "/payment_intents", Some(body), RetryConfig::conservative())
            .await?;
        Ok(PaymentIntent::from_resource(resource))
    }

    async fn create_source(
        &self,
        request: &ChargeRequest,
        source_type: SourceType,
    ) -> Result<PaymentSource, GatewayError> {
        let body = self.source_body(request, source_type);
        let resource: Resource = self
            .send("create_source", Method::POST, "/sources", Some(body), RetryConfig::conservative())
            .await?;
        Ok(PaymentSource::from_resource(resource))
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        if !is_safe_id(intent_id) {
            return Err(GatewayError::InvalidResponse(format!("malformed intent id {intent_id:?}")));
        }
        let path = format!("/payment_intents/{intent_id}");
        let resource: Resource = self
            .send("retrieve_payment_intent", Method::GET, &path, None, RetryConfig::aggressive())
            .await?;
        Ok(PaymentIntent::from_resource(resource))
    }

    async fn create_payment(&self, source_id: &str, request: &ChargeRequest) -> Result<GatewayCharge, GatewayError> {
        let body = json!({
            "data": {
                "attributes": {
                    "amount": request.amount.cents(),
                    "source": { "id": source_id, "type": "source" },
                    "currency": CURRENCY,
                    "description": request.description,
                    "metadata": metadata(request),
                }
            }
        });
        let resource: Resource = self
            .send("create_payment", Method::POST, "/payments", Some(body), RetryConfig::conservative())
            .await?;
        Ok(GatewayCharge::from_resource(resource))
    }

    async fn create_refund(&self, payment_id: &str, amount: Money) -> Result<GatewayCharge, GatewayError> {
        let body = json!({
            "data": {
                "attributes": {
                    "amount": amount.cents(),
                    "payment_id": payment_id,
                    "reason": "requested_by_customer",
                }
            }
        });
        let resource: Resource = self
            .send("create_refund", Method::POST, "/refunds", Some(body), RetryConfig::conservative())
            .await?;
        Ok(GatewayCharge::from_resource(resource))
    }

    async fn find_refund(&self, payment_id: &str) -> Result<Option<GatewayCharge>, GatewayError> {
        if !is_safe_id(payment_id) {
            return Err(GatewayError::InvalidResponse(format!("malformed payment id {payment_id:?}")));
        }
        let path = format!("/refunds?payment_id={payment_id}");
        let resources: Vec<Resource> = self
            .send("list_refunds", Method::GET, &path, None, RetryConfig::aggressive())
            .await?;
        Ok(live_refund(resources))
    }
}

/// First refund on a payment that has not failed.
fn live_refund(resources: Vec<Resource>) -> Option<GatewayCharge> {
    resources
        .into_iter()
        .map(GatewayCharge::from_resource)
        .find(|refund| refund.status != "failed")
}

async fn execute<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, GatewayError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.bytes().await?;
    parse_response(status, &body)
}

fn parse_response<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, GatewayError> {
    if !status.is_success() {
        let detail = serde_json::from_slice::<ErrorEnvelope>(body)
            .ok()
            .and_then(|e| e.errors.into_iter().next())
            .and_then(|e| e.detail.or(e.code))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
        return Err(GatewayError::Rejected {
            status: status.as_u16(),
            detail,
        });
    }

    serde_json::from_slice::<DataEnvelope<T>>(body)
        .map(|envelope| envelope.data)
        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

fn basic_auth(secret_key: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{secret_key}:")))
}

fn metadata(request: &ChargeRequest) -> Value {
    json!({
        "order_id": request.order_id.to_string(),
        "customer_id": request.customer_id.to_string(),
    })
}

/// Gateway ids are alphanumeric with underscores; anything else never reaches a URL.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn client() -> PayMongoClient {
        let config = GatewayConfig {
            base_url: "http://127.0.0.1:9".into(),
            secret_key: "sk_test_abc".into(),
            public_key: None,
            webhook_secret: None,
            webhook_tolerance: Duration::from_secs(300),
        };
        PayMongoClient::new(&config, "http://shop.local", Arc::new(Metrics::new().unwrap())).unwrap()
    }

    fn charge() -> ChargeRequest {
        ChargeRequest {
            order_id: Uuid::nil(),
            customer_id: Uuid::nil(),
            amount: Money::from_cents(45_000),
            description: "Order TXN-00000001".into(),
        }
    }

    #[test]
    fn test_basic_auth_header() {
        // base64("sk_test_abc:")
        assert_eq!(basic_auth("sk_test_abc"), "Basic c2tfdGVzdF9hYmM6");
    }

    #[test]
    fn test_intent_body_shape() {
        let body = client().intent_body(&charge(), PaymentMethod::CreditCard);
        let attrs = &body["data"]["attributes"];
        assert_eq!(attrs["amount"], 45_000);
        assert_eq!(attrs["payment_method_allowed"], json!(["card"]));
        assert_eq!(attrs["currency"], "PHP");
        assert_eq!(attrs["statement_descriptor"], "BOOKSTORE ORDER");
        assert_eq!(attrs["metadata"]["order_id"], Uuid::nil().to_string());
    }

    #[test]
    fn test_source_body_redirects() {
        let body = client().source_body(&charge(), SourceType::Gcash);
        let attrs = &body["data"]["attributes"];
        assert_eq!(attrs["type"], "gcash");
        assert_eq!(attrs["redirect"]["success"], "http://shop.local/payment/success");
        assert_eq!(attrs["redirect"]["failed"], "http://shop.local/payment/failed");
    }

    #[test]
    fn test_parse_error_detail() {
        let body = br#"{"errors":[{"code":"parameter_invalid","detail":"amount is below minimum"}]}"#;
        let err = parse_response::<Resource>(StatusCode::BAD_REQUEST, body).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Rejected { status: 400, ref detail } if detail == "amount is below minimum"
        ));
    }

    #[test]
    fn test_parse_success_envelope() {
        let body = br#"{"data":{"id":"pi_1","attributes":{"status":"awaiting_payment_method"}}}"#;
        let resource: Resource = parse_response(StatusCode::OK, body).unwrap();
        assert_eq!(resource.id, "pi_1");
    }

    #[test]
    fn test_live_refund_skips_failed_attempts() {
        let body = br#"{"data":[
            {"id":"ref_1","attributes":{"status":"failed","amount":45000}},
            {"id":"ref_2","attributes":{"status":"pending","amount":45000}}
        ]}"#;
        let resources: Vec<Resource> = parse_response(StatusCode::OK, body).unwrap();
        let refund = live_refund(resources).unwrap();
        assert_eq!(refund.id, "ref_2");
        assert_eq!(refund.amount, Money::from_cents(45_000));

        assert!(live_refund(Vec::new()).is_none());
    }

    #[tokio::test]
    async fn test_intent_rejects_wallet_and_manual_methods() {
        let client = client();
        let err = client
            .create_payment_intent(&charge(), PaymentMethod::BankTransfer)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedMethod(PaymentMethod::BankTransfer)));

        let err = client.create_payment_intent(&charge(), PaymentMethod::Gcash).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedMethod(PaymentMethod::Gcash)));
    }

    #[tokio::test]
    async fn test_malformed_intent_id_never_sent() {
        let err = client().retrieve_payment_intent("../refunds").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse(_)));
    }
}
