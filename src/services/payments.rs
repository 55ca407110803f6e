use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::db;
use crate::db::sessions::SessionPrincipal;
use crate::domain::money::Money;
use crate::domain::order::{
    CommandContext, HandledCommand, OrderAggregate, OrderCommand, OrderCommandHandler, OrderError,
    OrderStatus,
};
use crate::error::{AppError, AppResult};
use crate::event_sourcing::Aggregate;
use crate::gateway::webhook::{self, WebhookEvent, WebhookKind};
use crate::gateway::{
    ChargeRequest, GatewayCharge, GatewayError, IntentStatus, PaymentGateway, PaymentIntent,
    PaymentSource, SourceType,
};
use crate::metrics::Metrics;
use crate::storage::{UploadKind, UploadStore};

use super::orders::{ensure_can_view, require_customer};

// ============================================================================
// Payment Service - gateway payments, manual proofs and refunds
// ============================================================================
//
// Gateway calls happen outside any database transaction. The order is
// checked against the aggregate's rules first, then the resulting command
// runs under the order's row lock.
//
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct OrderPaymentRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub order_id: Uuid,
    pub payment_intent_id: String,
}

/// Admin verdict on a payment proof. `approved` must be sent explicitly.
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub approved: bool,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub order_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IntentCreated {
    pub order_id: Uuid,
    pub intent: PaymentIntent,
    pub public_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SourceCreated {
    pub order_id: Uuid,
    pub source: PaymentSource,
}

#[derive(Debug, Serialize)]
pub struct ConfirmOutcome {
    pub order: OrderAggregate,
    pub intent_status: String,
    /// Set while the customer still has to act (3-D Secure, redirects).
    pub next_action: Option<Value>,
}

/// How a webhook delivery was handled. Every variant is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied,
    Duplicate,
    Ignored,
    Rejected,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied => "applied",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::Rejected => "rejected",
        }
    }
}

pub struct PaymentService {
    pool: PgPool,
    handler: Arc<OrderCommandHandler>,
    gateway: Arc<dyn PaymentGateway>,
    uploads: Arc<UploadStore>,
    metrics: Arc<Metrics>,
    public_key: Option<String>,
    webhook_secret: Option<String>,
    webhook_tolerance: Duration,
}

impl PaymentService {
    pub fn new(
        pool: PgPool,
        handler: Arc<OrderCommandHandler>,
        gateway: Arc<dyn PaymentGateway>,
        uploads: Arc<UploadStore>,
        metrics: Arc<Metrics>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            pool,
            handler,
            gateway,
            uploads,
            metrics,
            public_key: config.public_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            webhook_tolerance: config.webhook_tolerance,
        }
    }

    // ------------------------------------------------------------------------
    // Gateway payments
    // ------------------------------------------------------------------------

    pub async fn create_intent(&self, actor: &SessionPrincipal, order_id: Uuid) -> AppResult<IntentCreated> {
        let order = self.payable_order(actor, order_id).await?;
        let intent = self
            .gateway
            .create_payment_intent(&charge_request(&order), order.payment_method)
            .await?;

        self.attach_reference(&order, &intent.id, actor).await?;
        tracing::info!(order_id = %order.id, intent_id = %intent.id, "💳 Payment intent created");

        Ok(IntentCreated {
            order_id: order.id,
            intent,
            public_key: self.public_key.clone(),
        })
    }

    /// Redirect-based e-wallet payment. The order must have been placed with
    /// the matching wallet.
    pub async fn create_source(
        &self,
        actor: &SessionPrincipal,
        order_id: Uuid,
        source_type: SourceType,
    ) -> AppResult<SourceCreated> {
        let order = self.payable_order(actor, order_id).await?;
        if SourceType::for_method(order.payment_method) != Some(source_type) {
            return Err(GatewayError::UnsupportedMethod(order.payment_method).into());
        }

        let source = self.gateway.create_source(&charge_request(&order), source_type).await?;
        self.attach_reference(&order, &source.id, actor).await?;
        tracing::info!(
            order_id = %order.id,
            source_id = %source.id,
            wallet = source_type.as_str(),
            "📱 Wallet source created"
        );

        Ok(SourceCreated {
            order_id: order.id,
            source,
        })
    }

    /// Poll the intent and settle the order from its status.
    pub async fn confirm(
        &self,
        actor: &SessionPrincipal,
        request: ConfirmRequest,
    ) -> AppResult<ConfirmOutcome> {
        let order = self.load(request.order_id).await?;
        ensure_owner(actor, &order)?;
        if order.gateway_reference.as_deref() != Some(request.payment_intent_id.as_str()) {
            return Err(AppError::bad_request("Payment intent does not belong to this order"));
        }

        let intent = self.gateway.retrieve_payment_intent(&request.payment_intent_id).await?;
        let Some(command) = settlement_for(&intent) else {
            return Ok(ConfirmOutcome {
                order,
                intent_status: intent.status.as_str().to_string(),
                next_action: intent.next_action,
            });
        };

        let ctx = CommandContext::new(Some(actor.user_id), "confirm");
        let handled = self.handler.handle(order.id, command, &ctx).await?;
        Ok(ConfirmOutcome {
            order: handled.order,
            intent_status: intent.status.as_str().to_string(),
            next_action: None,
        })
    }

    pub async fn intent_status(&self, actor: &SessionPrincipal, intent_id: &str) -> AppResult<PaymentIntent> {
        let order = db::orders::find_by_gateway_reference(&self.pool, &[intent_id.to_string()])
            .await?
            .ok_or_else(|| AppError::not_found("Payment intent not found"))?;
        ensure_can_view(actor, &order)?;
        Ok(self.gateway.retrieve_payment_intent(intent_id).await?)
    }

    // ------------------------------------------------------------------------
    // Manual verification
    // ------------------------------------------------------------------------

    /// Store a proof of payment and move the order to processing.
    pub async fn submit_proof(
        &self,
        actor: &SessionPrincipal,
        order_id: Uuid,
        content_type: Option<&str>,
        bytes: &[u8],
        notes: Option<String>,
    ) -> AppResult<OrderAggregate> {
        let order = self.load(order_id).await?;
        ensure_owner(actor, &order)?;
        if !order.payment_method.is_manual() {
            return Err(OrderError::NotManualPayment(order.payment_method).into());
        }

        let stored = self.uploads.save(UploadKind::PaymentProof, content_type, bytes).await?;
        let command = OrderCommand::SubmitPaymentProof {
            file_path: stored.relative_path.clone(),
            notes: notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            submitted_by: actor.user_id,
        };
        let ctx = CommandContext::new(Some(actor.user_id), "verify");

        match self.handler.handle(order_id, command, &ctx).await {
            Ok(handled) => {
                tracing::info!(
                    order_id = %order_id,
                    proof = %stored.relative_path,
                    "🧾 Payment proof submitted"
                );
                Ok(handled.order)
            }
            Err(e) => {
                self.uploads.remove(&stored.relative_path).await;
                Err(e)
            }
        }
    }

    pub async fn pending_verifications(&self) -> AppResult<Vec<OrderAggregate>> {
        Ok(db::orders::awaiting_review(&self.pool).await?)
    }

    /// Stored proof file for an admin to inspect.
    pub async fn proof_file(&self, order_id: Uuid) -> AppResult<std::path::PathBuf> {
        let order = self.load(order_id).await?;
        let proof = order
            .payment_proof
            .ok_or_else(|| AppError::not_found("Order has no payment proof"))?;
        Ok(self.uploads.resolve(&proof.file_path)?)
    }

    pub async fn review(
        &self,
        admin: &SessionPrincipal,
        order_id: Uuid,
        review: ReviewRequest,
    ) -> AppResult<OrderAggregate> {
        let command = OrderCommand::ReviewPaymentProof {
            approved: review.approved,
            reviewed_by: admin.user_id,
            admin_notes: review.admin_notes,
        };
        let ctx = CommandContext::new(Some(admin.user_id), "admin");
        let handled = self.handler.handle(order_id, command, &ctx).await?;

        tracing::info!(
            order_id = %order_id,
            approved = review.approved,
            admin_id = %admin.user_id,
            status = %handled.order.status,
            "Payment proof reviewed"
        );
        Ok(handled.order)
    }

    // ------------------------------------------------------------------------
    // Refunds
    // ------------------------------------------------------------------------

    pub async fn request_refund(
        &self,
        actor: &SessionPrincipal,
        request: RefundRequest,
    ) -> AppResult<OrderAggregate> {
        let order = self.load(request.order_id).await?;
        ensure_owner(actor, &order)?;

        let command = OrderCommand::RequestRefund {
            requested_by: actor.user_id,
            reason: request.reason,
        };
        let ctx = CommandContext::new(Some(actor.user_id), "api");
        Ok(self.handler.handle(order.id, command, &ctx).await?.order)
    }

    pub async fn pending_refunds(&self) -> AppResult<Vec<OrderAggregate>> {
        Ok(db::orders::awaiting_refund(&self.pool).await?)
    }

    /// Orders paid through the gateway are refunded there first; manual
    /// payments are refunded outside the system and only recorded.
    ///
    /// A retry after the order update failed reuses the refund the gateway
    /// already holds instead of issuing a second one.
    pub async fn process_refund(
        &self,
        admin: &SessionPrincipal,
        order_id: Uuid,
    ) -> AppResult<OrderAggregate> {
        let order = self.load(order_id).await?;

        // Fail on the order's rules before moving any money.
        order.handle_command(&OrderCommand::ProcessRefund {
            processed_by: admin.user_id,
            gateway_refund_id: None,
        })?;

        let gateway_refund_id = match refundable_payment(&order) {
            Some(payment_id) => {
                let refund = refund_once(self.gateway.as_ref(), payment_id, order.total).await?;
                tracing::info!(
                    order_id = %order.id,
                    refund_id = %refund.id,
                    amount = %refund.amount,
                    "↩️ Gateway refund issued"
                );
                Some(refund.id)
            }
            None => None,
        };

        let command = OrderCommand::ProcessRefund {
            processed_by: admin.user_id,
            gateway_refund_id,
        };
        let ctx = CommandContext::new(Some(admin.user_id), "admin");
        Ok(self.handler.handle(order.id, command, &ctx).await?.order)
    }

    // ------------------------------------------------------------------------
    // Webhooks
    // ------------------------------------------------------------------------

    /// Verify and apply a gateway webhook delivery.
    ///
    /// Order rule violations are acknowledged as rejected so the gateway
    /// stops redelivering; storage failures surface so it retries.
    pub async fn handle_webhook(&self, signature: Option<&str>, body: &[u8]) -> AppResult<WebhookOutcome> {
        if let Err(e) = webhook::verify_signature(
            self.webhook_secret.as_deref(),
            signature,
            body,
            Utc::now().timestamp(),
            self.webhook_tolerance,
        ) {
            self.metrics.record_webhook("unverified", "unauthorized");
            tracing::warn!(error = %e, "🚫 Webhook rejected");
            return Err(e.into());
        }

        let event = WebhookEvent::parse(body)?;
        let outcome = self.dispatch(&event).await;

        let label = match &outcome {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "error",
        };
        self.metrics.record_webhook(&event.event_type, label);
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            outcome = label,
            "🔔 Webhook handled"
        );
        outcome
    }

    async fn dispatch(&self, event: &WebhookEvent) -> AppResult<WebhookOutcome> {
        let kind = event.kind();
        if kind == WebhookKind::Ignored {
            return Ok(WebhookOutcome::Ignored);
        }

        let Some(order) = self.order_for_event(event).await? else {
            tracing::warn!(
                event_id = %event.id,
                references = ?event.references(),
                "Webhook for unknown order"
            );
            return Ok(WebhookOutcome::Ignored);
        };

        let command = match kind {
            WebhookKind::PaymentSucceeded => OrderCommand::ConfirmGatewayPayment {
                payment_id: event.payment_id(),
            },
            WebhookKind::PaymentFailed => OrderCommand::FailGatewayPayment {
                reason: event.failure_reason(),
            },
            WebhookKind::SourceChargeable => return self.charge_source(&order, event).await,
            WebhookKind::Ignored => return Ok(WebhookOutcome::Ignored),
        };

        let ctx = CommandContext::new(None, "webhook");
        let result = self.handler.handle(order.id, command, &ctx).await;
        if let Err(AppError::Order(e)) = &result {
            tracing::warn!(order_id = %order.id, error = %e, "Webhook conflicts with order state");
        }
        webhook_outcome(result)
    }

    /// The customer authorized a wallet payment; charge it. Completion
    /// arrives later as `payment.paid`.
    async fn charge_source(&self, order: &OrderAggregate, event: &WebhookEvent) -> AppResult<WebhookOutcome> {
        if !awaits_charge(order.status) {
            return Ok(WebhookOutcome::Duplicate);
        }

        let charge = self
            .gateway
            .create_payment(&event.resource.id, &charge_request(order))
            .await?;
        tracing::info!(
            order_id = %order.id,
            payment_id = %charge.id,
            status = %charge.status,
            "Chargeable source charged"
        );
        Ok(WebhookOutcome::Applied)
    }

    async fn order_for_event(&self, event: &WebhookEvent) -> AppResult<Option<OrderAggregate>> {
        if let Some(order_id) = event.order_id() {
            if let Some(order) = db::orders::find(&self.pool, order_id).await? {
                return Ok(Some(order));
            }
        }
        Ok(db::orders::find_by_gateway_reference(&self.pool, &event.references()).await?)
    }

    // ------------------------------------------------------------------------

    /// The actor's own order, still waiting for payment.
    async fn payable_order(&self, actor: &SessionPrincipal, order_id: Uuid) -> AppResult<OrderAggregate> {
        let order = self.load(order_id).await?;
        ensure_owner(actor, &order)?;
        match order.status {
            OrderStatus::Pending => Ok(order),
            OrderStatus::Processing
            | OrderStatus::Completed
            | OrderStatus::Failed
            | OrderStatus::Refunded => Err(OrderError::InvalidTransition {
                action: "start a payment for",
                status: order.status,
            }
            .into()),
        }
    }

    async fn attach_reference(
        &self,
        order: &OrderAggregate,
        reference: &str,
        actor: &SessionPrincipal,
    ) -> AppResult<()> {
        let command = OrderCommand::AttachGatewayReference {
            reference: reference.to_string(),
        };
        let ctx = CommandContext::new(Some(actor.user_id), "payment");
        self.handler.handle(order.id, command, &ctx).await?;
        Ok(())
    }

    async fn load(&self, order_id: Uuid) -> AppResult<OrderAggregate> {
        db::orders::find(&self.pool, order_id)
            .await?
            .ok_or_else(|| AppError::not_found("Order not found"))
    }
}

fn ensure_owner(actor: &SessionPrincipal, order: &OrderAggregate) -> AppResult<()> {
    let customer_id = require_customer(actor)?;
    if customer_id != order.customer_id {
        return Err(AppError::forbidden("Not your order"));
    }
    Ok(())
}

/// Command an intent's status settles the order with; `None` while the
/// customer still has to act or the gateway is still working.
fn settlement_for(intent: &PaymentIntent) -> Option<OrderCommand> {
    match &intent.status {
        IntentStatus::Succeeded => Some(OrderCommand::ConfirmGatewayPayment {
            payment_id: intent.payment_id.clone().unwrap_or_else(|| intent.id.clone()),
        }),
        IntentStatus::AwaitingNextAction | IntentStatus::Processing => None,
        IntentStatus::AwaitingPaymentMethod | IntentStatus::Other(_) => {
            Some(OrderCommand::FailGatewayPayment {
                reason: intent
                    .last_error
                    .clone()
                    .unwrap_or_else(|| format!("Payment {}", intent.status.as_str())),
            })
        }
    }
}

/// Order rule violations are acknowledged; anything else is returned so the
/// gateway redelivers.
fn webhook_outcome(result: AppResult<HandledCommand>) -> AppResult<WebhookOutcome> {
    match result {
        Ok(handled) if handled.events.is_empty() => Ok(WebhookOutcome::Duplicate),
        Ok(_) => Ok(WebhookOutcome::Applied),
        Err(AppError::Order(_)) => Ok(WebhookOutcome::Rejected),
        Err(e) => Err(e),
    }
}

/// Only a pending order still needs its authorized source charged.
fn awaits_charge(status: OrderStatus) -> bool {
    match status {
        OrderStatus::Pending => true,
        OrderStatus::Processing
        | OrderStatus::Completed
        | OrderStatus::Failed
        | OrderStatus::Refunded => false,
    }
}

/// Gateway payment a refund has to go through, if the order was paid there.
fn refundable_payment(order: &OrderAggregate) -> Option<&str> {
    if order.payment_method.is_manual() {
        return None;
    }
    order.gateway_payment_id.as_deref()
}

async fn refund_once(
    gateway: &dyn PaymentGateway,
    payment_id: &str,
    amount: Money,
) -> Result<GatewayCharge, GatewayError> {
    if let Some(existing) = gateway.find_refund(payment_id).await? {
        tracing::info!(payment_id, refund_id = %existing.id, "Reusing existing gateway refund");
        return Ok(existing);
    }
    gateway.create_refund(payment_id, amount).await
}

fn charge_request(order: &OrderAggregate) -> ChargeRequest {
    ChargeRequest {
        order_id: order.id,
        customer_id: order.customer_id,
        amount: order.total,
        description: format!("Order {}", order.transaction_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::domain::order::{OrderLine, PaymentMethod, TransactionId};

    fn order(customer_id: Uuid, method: PaymentMethod) -> OrderAggregate {
        let (order, _) = OrderAggregate::place(
            Uuid::new_v4(),
            TransactionId::from_sequence(42),
            customer_id,
            vec![OrderLine {
                book_id: Uuid::new_v4(),
                title: "Banaag at Sikat".into(),
                quantity: 2,
                unit_price: Money::from_cents(24_950),
            }],
            method,
        )
        .unwrap();
        order
    }

    fn customer(customer_id: Option<Uuid>) -> SessionPrincipal {
        SessionPrincipal {
            user_id: Uuid::new_v4(),
            email: "reader@example.com".into(),
            roles: vec!["customer".into()],
            is_active: true,
            customer_id,
            publisher_id: None,
            admin_id: None,
            admin_permissions: None,
        }
    }

    #[test]
    fn test_charge_request_carries_order_total() {
        let order = order(Uuid::new_v4(), PaymentMethod::Gcash);
        let request = charge_request(&order);

        assert_eq!(request.amount, Money::from_cents(49_900));
        assert_eq!(request.order_id, order.id);
        assert_eq!(request.description, "Order TXN-00000042");
    }

    #[test]
    fn test_only_the_buyer_pays() {
        let buyer = Uuid::new_v4();
        let order = order(buyer, PaymentMethod::CreditCard);

        assert!(ensure_owner(&customer(Some(buyer)), &order).is_ok());
        assert!(matches!(
            ensure_owner(&customer(Some(Uuid::new_v4())), &order),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(ensure_owner(&customer(None), &order), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn test_review_needs_explicit_verdict() {
        assert!(serde_json::from_str::<ReviewRequest>("{}").is_err());
        assert!(serde_json::from_str::<ReviewRequest>(r#"{"admin_notes":"looks fine"}"#).is_err());

        let review: ReviewRequest =
            serde_json::from_str(r#"{"approved":false,"admin_notes":"Blurry receipt"}"#).unwrap();
        assert!(!review.approved);
        let review: ReviewRequest = serde_json::from_str(r#"{"approved":true}"#).unwrap();
        assert!(review.approved);
        assert!(review.admin_notes.is_none());
    }

    fn intent(status: IntentStatus, payment_id: Option<&str>, last_error: Option<&str>) -> PaymentIntent {
        PaymentIntent {
            id: "pi_1".into(),
            status,
            amount: Money::from_cents(49_900),
            client_key: None,
            next_action: None,
            payment_id: payment_id.map(str::to_string),
            last_error: last_error.map(str::to_string),
        }
    }

    #[test]
    fn test_succeeded_intent_confirms_with_payment_id() {
        let command = settlement_for(&intent(IntentStatus::Succeeded, Some("pay_9"), None));
        assert!(matches!(
            command,
            Some(OrderCommand::ConfirmGatewayPayment { ref payment_id }) if payment_id == "pay_9"
        ));

        // no payment listed yet; the intent id stands in
        let command = settlement_for(&intent(IntentStatus::Succeeded, None, None));
        assert!(matches!(
            command,
            Some(OrderCommand::ConfirmGatewayPayment { ref payment_id }) if payment_id == "pi_1"
        ));
    }

    #[test]
    fn test_in_flight_intent_changes_nothing() {
        assert!(settlement_for(&intent(IntentStatus::AwaitingNextAction, None, None)).is_none());
        assert!(settlement_for(&intent(IntentStatus::Processing, None, None)).is_none());
    }

    #[test]
    fn test_other_intent_statuses_fail_the_order() {
        let declined = intent(IntentStatus::AwaitingPaymentMethod, None, Some("Card declined"));
        assert!(matches!(
            settlement_for(&declined),
            Some(OrderCommand::FailGatewayPayment { ref reason }) if reason == "Card declined"
        ));

        let expired = intent(IntentStatus::Other("expired".into()), None, None);
        assert!(matches!(
            settlement_for(&expired),
            Some(OrderCommand::FailGatewayPayment { ref reason }) if reason == "Payment expired"
        ));
    }

    #[test]
    fn test_webhook_outcome_classification() {
        let paid = order(Uuid::new_v4(), PaymentMethod::Gcash);
        let event = paid
            .handle_command(&OrderCommand::ConfirmGatewayPayment { payment_id: "pay_1".into() })
            .unwrap();

        let applied = webhook_outcome(Ok(HandledCommand { order: paid.clone(), events: event }));
        assert_eq!(applied.unwrap(), WebhookOutcome::Applied);

        let repeated = webhook_outcome(Ok(HandledCommand { order: paid, events: Vec::new() }));
        assert_eq!(repeated.unwrap(), WebhookOutcome::Duplicate);

        let conflict = webhook_outcome(Err(OrderError::PaidByOtherPayment("pay_1".into()).into()));
        assert_eq!(conflict.unwrap(), WebhookOutcome::Rejected);

        let storage = webhook_outcome(Err(sqlx::Error::PoolTimedOut.into()));
        assert!(matches!(storage, Err(AppError::Database(_))));
    }

    #[test]
    fn test_only_pending_orders_charge_sources() {
        assert!(awaits_charge(OrderStatus::Pending));
        let settled = [
            OrderStatus::Processing,
            OrderStatus::Completed,
            OrderStatus::Failed,
            OrderStatus::Refunded,
        ];
        for status in settled {
            assert!(!awaits_charge(status));
        }
    }

    #[test]
    fn test_refund_goes_through_gateway_only_when_paid_there() {
        let unpaid = order(Uuid::new_v4(), PaymentMethod::CreditCard);
        assert_eq!(refundable_payment(&unpaid), None);

        let mut paid = order(Uuid::new_v4(), PaymentMethod::CreditCard);
        paid.gateway_payment_id = Some("pay_7".into());
        assert_eq!(refundable_payment(&paid), Some("pay_7"));

        let mut manual = order(Uuid::new_v4(), PaymentMethod::BankTransfer);
        manual.gateway_payment_id = Some("pay_8".into());
        assert_eq!(refundable_payment(&manual), None);
    }

    /// Records refunds; optionally already holds one for every payment.
    struct RefundLedger {
        existing: Option<GatewayCharge>,
        created: Mutex<Vec<String>>,
    }

    impl RefundLedger {
        fn new(existing: Option<&str>) -> Self {
            Self {
                existing: existing.map(|id| GatewayCharge {
                    id: id.into(),
                    status: "pending".into(),
                    amount: Money::from_cents(49_900),
                }),
                created: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for RefundLedger {
        async fn create_payment_intent(
            &self,
            _request: &ChargeRequest,
            method: PaymentMethod,
        ) -> Result<PaymentIntent, GatewayError> {
            Err(GatewayError::UnsupportedMethod(method))
        }

        async fn create_source(
            &self,
            _request: &ChargeRequest,
            _source_type: SourceType,
        ) -> Result<PaymentSource, GatewayError> {
            Err(GatewayError::CircuitOpen)
        }

        async fn retrieve_payment_intent(&self, _intent_id: &str) -> Result<PaymentIntent, GatewayError> {
            Err(GatewayError::CircuitOpen)
        }

        async fn create_payment(
            &self,
            _source_id: &str,
            _request: &ChargeRequest,
        ) -> Result<GatewayCharge, GatewayError> {
            Err(GatewayError::CircuitOpen)
        }

        async fn create_refund(
            &self,
            payment_id: &str,
            amount: Money,
        ) -> Result<GatewayCharge, GatewayError> {
            self.created.lock().unwrap().push(payment_id.to_string());
            Ok(GatewayCharge {
                id: format!("ref_for_{payment_id}"),
                status: "pending".into(),
                amount,
            })
        }

        async fn find_refund(&self, _payment_id: &str) -> Result<Option<GatewayCharge>, GatewayError> {
            Ok(self.existing.clone())
        }
    }

    #[tokio::test]
    async fn test_refund_issued_when_none_exists() {
        let gateway = RefundLedger::new(None);
        let refund = refund_once(&gateway, "pay_1", Money::from_cents(49_900)).await.unwrap();

        assert_eq!(refund.id, "ref_for_pay_1");
        assert_eq!(*gateway.created.lock().unwrap(), vec!["pay_1".to_string()]);
    }

    #[tokio::test]
    async fn test_retried_refund_reuses_gateway_refund() {
        let gateway = RefundLedger::new(Some("ref_earlier"));
        let refund = refund_once(&gateway, "pay_1", Money::from_cents(49_900)).await.unwrap();

        assert_eq!(refund.id, "ref_earlier");
        assert!(gateway.created.lock().unwrap().is_empty());
    }

    #[test]
    fn test_webhook_outcome_labels() {
        assert_eq!(serde_json::to_value(WebhookOutcome::Duplicate).unwrap(), "duplicate");
        assert_eq!(WebhookOutcome::Rejected.as_str(), "rejected");
    }
}
