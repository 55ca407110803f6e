use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::money::Money;
use crate::event_sourcing::Aggregate;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::*;
use super::value_objects::{
    OrderLine, OrderStatus, PaymentMethod, PaymentProof, ProofStatus, TransactionId,
};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderAggregate {
    // Identity
    pub id: Uuid,
    pub version: i64,
    pub transaction_id: TransactionId,

    // Checkout snapshot
    pub customer_id: Uuid,
    pub items: Vec<OrderLine>,
    pub total: Money,
    pub payment_method: PaymentMethod,

    // Current State (derived from events)
    pub status: OrderStatus,
    pub payment_proof: Option<PaymentProof>,
    pub gateway_reference: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub refund_requested: bool,
    pub refund_processed: bool,
    pub access_granted: bool,
    pub notes: String,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderAggregate {
    /// Snapshot a cart into a new pending order.
    ///
    /// The total is always recomputed from the lines.
    pub fn place(
        order_id: Uuid,
        transaction_id: TransactionId,
        customer_id: Uuid,
        items: Vec<OrderLine>,
        payment_method: PaymentMethod,
    ) -> Result<(Self, OrderEvent), OrderError> {
        Self::validate_items(&items)?;

        let subtotals = items
            .iter()
            .map(|line| line.subtotal().ok_or(OrderError::TotalOverflow))
            .collect::<Result<Vec<_>, _>>()?;
        let total = Money::checked_sum(subtotals).ok_or(OrderError::TotalOverflow)?;

        let event = OrderEvent::Placed(OrderPlaced {
            order_id,
            transaction_id,
            customer_id,
            items,
            total,
            payment_method,
            placed_at: Utc::now(),
        });

        let mut aggregate = Self::apply_first_event(&event)?;
        aggregate.version = 1;

        Ok((aggregate, event))
    }

    pub fn contains_book(&self, book_id: Uuid) -> bool {
        self.items.iter().any(|line| line.book_id == book_id)
    }

    /// Download links and file streams go through this check.
    pub fn ensure_downloadable(&self, book_id: Uuid) -> Result<(), OrderError> {
        if !self.access_granted {
            return Err(OrderError::AccessNotGranted);
        }
        if !self.contains_book(book_id) {
            return Err(OrderError::BookNotInOrder);
        }
        Ok(())
    }

    fn validate_items(items: &[OrderLine]) -> Result<(), OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        for item in items {
            if item.quantity <= 0 {
                return Err(OrderError::InvalidQuantity(item.quantity));
            }
        }

        Ok(())
    }

    fn transition_error(&self, action: &'static str) -> OrderError {
        OrderError::InvalidTransition {
            action,
            status: self.status,
        }
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for OrderAggregate {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn apply_first_event(event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            OrderEvent::Placed(e) => Ok(Self {
                id: e.order_id,
                version: 0,
                transaction_id: e.transaction_id.clone(),
                customer_id: e.customer_id,
                items: e.items.clone(),
                total: e.total,
                payment_method: e.payment_method,
                status: OrderStatus::Pending,
                payment_proof: None,
                gateway_reference: None,
                gateway_payment_id: None,
                refund_requested: false,
                refund_processed: false,
                access_granted: false,
                notes: String::new(),
                created_at: e.placed_at,
                updated_at: e.placed_at,
            }),
            _ => Err(OrderError::NotInitialized),
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        self.updated_at = Utc::now();

        match event {
            OrderEvent::Placed(_) => {
                // First event already applied
            }
            OrderEvent::GatewayReferenceAttached(e) => {
                self.gateway_reference = Some(e.reference.clone());
            }
            OrderEvent::PaymentProofSubmitted(e) => {
                self.payment_proof = Some(e.proof.clone());
                self.status = OrderStatus::Processing;
            }
            OrderEvent::PaymentApproved(e) => {
                self.record_review(ProofStatus::Approved, e);
                self.status = OrderStatus::Completed;
            }
            OrderEvent::PaymentRejected(e) => {
                self.record_review(ProofStatus::Rejected, e);
                self.status = OrderStatus::Failed;
                self.notes = e
                    .admin_notes
                    .clone()
                    .unwrap_or_else(|| "Payment proof rejected".to_string());
            }
            OrderEvent::PaymentCompleted(e) => {
                self.status = OrderStatus::Completed;
                self.gateway_payment_id = Some(e.gateway_payment_id.clone());
            }
            OrderEvent::PaymentFailed(e) => {
                self.status = OrderStatus::Failed;
                self.notes = e.reason.clone();
            }
            OrderEvent::AccessGranted(_) => {
                self.access_granted = true;
            }
            OrderEvent::Cancelled(e) => {
                self.status = OrderStatus::Failed;
                self.notes = e.reason.clone();
            }
            OrderEvent::RefundRequested(_) => {
                self.refund_requested = true;
            }
            OrderEvent::RefundProcessed(_) => {
                self.status = OrderStatus::Refunded;
                self.refund_processed = true;
            }
        }

        Ok(())
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::AttachGatewayReference { reference } => {
                match self.status {
                    OrderStatus::Pending => {}
                    OrderStatus::Processing
                    | OrderStatus::Completed
                    | OrderStatus::Failed
                    | OrderStatus::Refunded => return Err(self.transition_error("start a payment for")),
                }

                Ok(vec![OrderEvent::GatewayReferenceAttached(GatewayReferenceAttached {
                    reference: reference.clone(),
                })])
            }

            OrderCommand::SubmitPaymentProof { file_path, notes, submitted_by } => {
                if !self.payment_method.is_manual() {
                    return Err(OrderError::NotManualPayment(self.payment_method));
                }
                match self.status {
                    OrderStatus::Pending => {}
                    OrderStatus::Processing
                    | OrderStatus::Completed
                    | OrderStatus::Failed
                    | OrderStatus::Refunded => {
                        return Err(self.transition_error("submit payment proof for"))
                    }
                }

                Ok(vec![OrderEvent::PaymentProofSubmitted(PaymentProofSubmitted {
                    proof: PaymentProof {
                        file_path: file_path.clone(),
                        notes: notes.clone(),
                        status: ProofStatus::Submitted,
                        submitted_at: Utc::now(),
                        submitted_by: *submitted_by,
                        reviewed_at: None,
                        reviewed_by: None,
                        admin_notes: None,
                    },
                })])
            }

            OrderCommand::ReviewPaymentProof { approved, reviewed_by, admin_notes } => {
                match self.status {
                    OrderStatus::Processing => {}
                    OrderStatus::Pending
                    | OrderStatus::Completed
                    | OrderStatus::Failed
                    | OrderStatus::Refunded => return Err(self.transition_error("review payment for")),
                }
                match &self.payment_proof {
                    Some(proof) if proof.status == ProofStatus::Submitted => {}
                    _ => return Err(OrderError::MissingPaymentProof),
                }

                let review = PaymentReviewed {
                    reviewed_by: *reviewed_by,
                    admin_notes: admin_notes.clone(),
                    reviewed_at: Utc::now(),
                };

                if *approved {
                    Ok(vec![
                        OrderEvent::PaymentApproved(review),
                        OrderEvent::AccessGranted(AccessGranted {
                            granted_by: Some(*reviewed_by),
                            granted_at: Utc::now(),
                        }),
                    ])
                } else {
                    Ok(vec![OrderEvent::PaymentRejected(review)])
                }
            }

            OrderCommand::ConfirmGatewayPayment { payment_id } => match self.status {
                OrderStatus::Pending | OrderStatus::Processing => Ok(vec![
                    OrderEvent::PaymentCompleted(PaymentCompleted {
                        gateway_payment_id: payment_id.clone(),
                        completed_at: Utc::now(),
                    }),
                    OrderEvent::AccessGranted(AccessGranted {
                        granted_by: None,
                        granted_at: Utc::now(),
                    }),
                ]),
                // Gateways redeliver; the same payment confirming twice is a no-op.
                OrderStatus::Completed | OrderStatus::Refunded => match &self.gateway_payment_id {
                    Some(existing) if existing == payment_id => Ok(vec![]),
                    Some(existing) => Err(OrderError::PaidByOtherPayment(existing.clone())),
                    None => Err(self.transition_error("confirm a gateway payment for")),
                },
                OrderStatus::Failed => Err(self.transition_error("confirm a gateway payment for")),
            },

            OrderCommand::FailGatewayPayment { reason } => match self.status {
                OrderStatus::Pending | OrderStatus::Processing => {
                    Ok(vec![OrderEvent::PaymentFailed(PaymentFailed {
                        reason: reason.clone(),
                    })])
                }
                OrderStatus::Failed => Ok(vec![]),
                OrderStatus::Completed | OrderStatus::Refunded => {
                    Err(self.transition_error("fail the payment of"))
                }
            },

            OrderCommand::GrantAccess { granted_by } => match self.status {
                OrderStatus::Completed if self.access_granted => Ok(vec![]),
                OrderStatus::Completed => Ok(vec![OrderEvent::AccessGranted(AccessGranted {
                    granted_by: *granted_by,
                    granted_at: Utc::now(),
                })]),
                OrderStatus::Pending
                | OrderStatus::Processing
                | OrderStatus::Failed
                | OrderStatus::Refunded => Err(OrderError::AccessRequiresCompleted(self.status)),
            },

            OrderCommand::Cancel { reason, cancelled_by } => match self.status {
                OrderStatus::Pending | OrderStatus::Processing => {
                    Ok(vec![OrderEvent::Cancelled(OrderCancelled {
                        reason: reason.clone(),
                        cancelled_by: *cancelled_by,
                    })])
                }
                OrderStatus::Completed | OrderStatus::Failed | OrderStatus::Refunded => {
                    Err(self.transition_error("cancel"))
                }
            },

            OrderCommand::RequestRefund { requested_by, reason } => match self.status {
                OrderStatus::Completed if self.refund_requested => {
                    Err(OrderError::RefundAlreadyRequested)
                }
                OrderStatus::Completed => Ok(vec![OrderEvent::RefundRequested(RefundRequested {
                    requested_by: *requested_by,
                    reason: reason.clone(),
                })]),
                OrderStatus::Pending
                | OrderStatus::Processing
                | OrderStatus::Failed
                | OrderStatus::Refunded => Err(OrderError::RefundRequiresCompleted(self.status)),
            },

            OrderCommand::ProcessRefund { processed_by, gateway_refund_id } => match self.status {
                OrderStatus::Completed if !self.refund_requested => {
                    Err(OrderError::RefundNotRequested)
                }
                OrderStatus::Completed => Ok(vec![OrderEvent::RefundProcessed(RefundProcessed {
                    processed_by: *processed_by,
                    gateway_refund_id: gateway_refund_id.clone(),
                })]),
                OrderStatus::Pending
                | OrderStatus::Processing
                | OrderStatus::Failed
                | OrderStatus::Refunded => Err(OrderError::RefundRequiresCompleted(self.status)),
            },
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

impl OrderAggregate {
    fn record_review(&mut self, status: ProofStatus, review: &PaymentReviewed) {
        if let Some(proof) = self.payment_proof.as_mut() {
            proof.status = status;
            proof.reviewed_at = Some(review.reviewed_at);
            proof.reviewed_by = Some(review.reviewed_by);
            proof.admin_notes = review.admin_notes.clone();
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::EventEnvelope;

    fn line(price_cents: i64, quantity: i32) -> OrderLine {
        OrderLine {
            book_id: Uuid::new_v4(),
            title: "Florante at Laura".into(),
            quantity,
            unit_price: Money::from_cents(price_cents),
        }
    }

    fn placed(method: PaymentMethod) -> OrderAggregate {
        let (order, _) = OrderAggregate::place(
            Uuid::new_v4(),
            TransactionId::from_sequence(1),
            Uuid::new_v4(),
            vec![line(29_900, 2), line(15_000, 1)],
            method,
        )
        .unwrap();
        order
    }

    fn run(order: &mut OrderAggregate, command: OrderCommand) -> Result<Vec<OrderEvent>, OrderError> {
        let events = order.handle_command(&command)?;
        for event in &events {
            order.apply_event(event)?;
        }
        Ok(events)
    }

    fn completed_by_gateway() -> OrderAggregate {
        let mut order = placed(PaymentMethod::Gcash);
        run(&mut order, OrderCommand::ConfirmGatewayPayment { payment_id: "pay_1".into() }).unwrap();
        order
    }

    fn submit_proof(order: &mut OrderAggregate) -> Result<Vec<OrderEvent>, OrderError> {
        let submitted_by = order.customer_id;
        run(order, OrderCommand::SubmitPaymentProof {
            file_path: "payment-proofs/1.png".into(),
            notes: Some("BDO ref 1234".into()),
            submitted_by,
        })
    }

    #[test]
    fn test_place_rejects_empty_cart() {
        let result = OrderAggregate::place(
            Uuid::new_v4(),
            TransactionId::from_sequence(7),
            Uuid::new_v4(),
            vec![],
            PaymentMethod::CreditCard,
        );
        assert!(matches!(result, Err(OrderError::EmptyCart)));
    }

    #[test]
    fn test_place_rejects_zero_quantity() {
        let result = OrderAggregate::place(
            Uuid::new_v4(),
            TransactionId::from_sequence(7),
            Uuid::new_v4(),
            vec![line(100, 0)],
            PaymentMethod::CreditCard,
        );
        assert!(matches!(result, Err(OrderError::InvalidQuantity(0))));
    }

    #[test]
    fn test_place_total_is_sum_of_line_subtotals() {
        let order = placed(PaymentMethod::CreditCard);
        assert_eq!(order.total, Money::from_cents(29_900 * 2 + 15_000));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.version, 1);
        assert!(!order.access_granted);
    }

    #[test]
    fn test_place_detects_total_overflow() {
        let result = OrderAggregate::place(
            Uuid::new_v4(),
            TransactionId::from_sequence(1),
            Uuid::new_v4(),
            vec![line(i64::MAX, 1), line(1, 1)],
            PaymentMethod::CreditCard,
        );
        assert!(matches!(result, Err(OrderError::TotalOverflow)));
    }

    #[test]
    fn test_proof_moves_pending_to_processing() {
        let mut order = placed(PaymentMethod::BankTransfer);
        submit_proof(&mut order).unwrap();

        assert_eq!(order.status, OrderStatus::Processing);
        let proof = order.payment_proof.as_ref().unwrap();
        assert_eq!(proof.status, ProofStatus::Submitted);
        assert_eq!(proof.notes.as_deref(), Some("BDO ref 1234"));
    }

    #[test]
    fn test_proof_only_from_pending() {
        let mut order = placed(PaymentMethod::BankTransfer);
        submit_proof(&mut order).unwrap();

        let err = submit_proof(&mut order).unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition { status: OrderStatus::Processing, .. }
        ));
    }

    #[test]
    fn test_proof_rejected_for_gateway_methods() {
        let mut order = placed(PaymentMethod::Gcash);
        let err = submit_proof(&mut order).unwrap_err();
        assert!(matches!(err, OrderError::NotManualPayment(PaymentMethod::Gcash)));
    }

    #[test]
    fn test_approval_completes_and_grants_access() {
        let mut order = placed(PaymentMethod::CashDeposit);
        let admin = Uuid::new_v4();
        submit_proof(&mut order).unwrap();

        let events = run(&mut order, OrderCommand::ReviewPaymentProof {
            approved: true,
            reviewed_by: admin,
            admin_notes: Some("matched deposit slip".into()),
        })
        .unwrap();

        assert_eq!(events.len(), 2);
        assert!(events[0].settles_payment());
        assert_eq!(order.status, OrderStatus::Completed);
        assert!(order.access_granted);
        let proof = order.payment_proof.as_ref().unwrap();
        assert_eq!(proof.status, ProofStatus::Approved);
        assert_eq!(proof.reviewed_by, Some(admin));
    }

    #[test]
    fn test_rejection_fails_with_note() {
        let mut order = placed(PaymentMethod::OverCounter);
        submit_proof(&mut order).unwrap();
        run(&mut order, OrderCommand::ReviewPaymentProof {
            approved: false,
            reviewed_by: Uuid::new_v4(),
            admin_notes: None,
        })
        .unwrap();

        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.notes, "Payment proof rejected");
        assert!(!order.access_granted);
    }

    #[test]
    fn test_review_requires_processing() {
        let mut order = placed(PaymentMethod::BankTransfer);
        let err = run(&mut order, OrderCommand::ReviewPaymentProof {
            approved: true,
            reviewed_by: Uuid::new_v4(),
            admin_notes: None,
        })
        .unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { status: OrderStatus::Pending, .. }));
    }

    #[test]
    fn test_grant_access_requires_completed() {
        for mut order in [placed(PaymentMethod::CreditCard), {
            let mut o = placed(PaymentMethod::CreditCard);
            run(&mut o, OrderCommand::Cancel { reason: "x".into(), cancelled_by: None }).unwrap();
            o
        }] {
            let err = run(&mut order, OrderCommand::GrantAccess { granted_by: None }).unwrap_err();
            assert!(matches!(err, OrderError::AccessRequiresCompleted(_)));
            assert!(!order.access_granted);
        }
    }

    #[test]
    fn test_gateway_confirmation_is_idempotent() {
        let mut order = completed_by_gateway();
        assert_eq!(order.status, OrderStatus::Completed);
        assert!(order.access_granted);
        assert_eq!(order.gateway_payment_id.as_deref(), Some("pay_1"));

        let events = run(&mut order, OrderCommand::ConfirmGatewayPayment {
            payment_id: "pay_1".into(),
        })
        .unwrap();
        assert!(events.is_empty());

        let err = run(&mut order, OrderCommand::ConfirmGatewayPayment {
            payment_id: "pay_2".into(),
        })
        .unwrap_err();
        assert!(matches!(err, OrderError::PaidByOtherPayment(id) if id == "pay_1"));
    }

    #[test]
    fn test_gateway_failure() {
        let mut order = placed(PaymentMethod::Maya);
        run(&mut order, OrderCommand::FailGatewayPayment { reason: "declined".into() }).unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.notes, "declined");

        // redelivered failure
        let events = run(&mut order, OrderCommand::FailGatewayPayment { reason: "declined".into() }).unwrap();
        assert!(events.is_empty());

        let mut paid = completed_by_gateway();
        assert!(run(&mut paid, OrderCommand::FailGatewayPayment { reason: "late".into() }).is_err());
        assert_eq!(paid.status, OrderStatus::Completed);
    }

    #[test]
    fn test_cancel_from_pending_and_processing_only() {
        let mut pending = placed(PaymentMethod::BankTransfer);
        let customer = pending.customer_id;
        run(&mut pending, OrderCommand::Cancel {
            reason: "changed my mind".into(),
            cancelled_by: Some(customer),
        })
        .unwrap();
        assert_eq!(pending.status, OrderStatus::Failed);
        assert_eq!(pending.notes, "changed my mind");

        let mut processing = placed(PaymentMethod::BankTransfer);
        submit_proof(&mut processing).unwrap();
        run(&mut processing, OrderCommand::Cancel { reason: "dup".into(), cancelled_by: None }).unwrap();
        assert_eq!(processing.status, OrderStatus::Failed);

        let mut completed = completed_by_gateway();
        let err = run(&mut completed, OrderCommand::Cancel { reason: "x".into(), cancelled_by: None })
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { status: OrderStatus::Completed, .. }));
    }

    #[test]
    fn test_refund_flow() {
        let mut order = completed_by_gateway();
        let customer = order.customer_id;
        let admin = Uuid::new_v4();

        let err = run(&mut order, OrderCommand::ProcessRefund {
            processed_by: admin,
            gateway_refund_id: None,
        })
        .unwrap_err();
        assert!(matches!(err, OrderError::RefundNotRequested));

        run(&mut order, OrderCommand::RequestRefund { requested_by: customer, reason: None }).unwrap();
        assert!(order.refund_requested);
        assert!(matches!(
            run(&mut order, OrderCommand::RequestRefund { requested_by: customer, reason: None }),
            Err(OrderError::RefundAlreadyRequested)
        ));

        let events = run(&mut order, OrderCommand::ProcessRefund {
            processed_by: admin,
            gateway_refund_id: Some("ref_1".into()),
        })
        .unwrap();
        assert!(events.iter().any(OrderEvent::reverses_sale));
        assert!(!events.iter().any(OrderEvent::settles_payment));
        assert_eq!(order.status, OrderStatus::Refunded);
        assert!(order.refund_processed);

        // nothing moves a refunded order
        assert!(run(&mut order, OrderCommand::ProcessRefund {
            processed_by: admin,
            gateway_refund_id: None,
        })
        .is_err());
    }

    #[test]
    fn test_refund_requires_completed() {
        let mut order = placed(PaymentMethod::CreditCard);
        let customer = order.customer_id;
        let err = run(&mut order, OrderCommand::RequestRefund {
            requested_by: customer,
            reason: None,
        })
        .unwrap_err();
        assert!(matches!(err, OrderError::RefundRequiresCompleted(OrderStatus::Pending)));
    }

    #[test]
    fn test_gateway_reference_only_while_pending() {
        let mut order = placed(PaymentMethod::Gcash);
        run(&mut order, OrderCommand::AttachGatewayReference { reference: "src_1".into() }).unwrap();
        assert_eq!(order.gateway_reference.as_deref(), Some("src_1"));

        let mut paid = completed_by_gateway();
        assert!(run(&mut paid, OrderCommand::AttachGatewayReference { reference: "pi_2".into() }).is_err());
    }

    #[test]
    fn test_download_checks() {
        let order = placed(PaymentMethod::CreditCard);
        let book = order.items[0].book_id;
        assert!(matches!(order.ensure_downloadable(book), Err(OrderError::AccessNotGranted)));

        let paid = completed_by_gateway();
        assert!(paid.ensure_downloadable(paid.items[0].book_id).is_ok());
        assert!(matches!(
            paid.ensure_downloadable(Uuid::new_v4()),
            Err(OrderError::BookNotInOrder)
        ));
    }

    #[test]
    fn test_replay_from_envelopes_matches_live_state() {
        let (mut live, placed_event) = OrderAggregate::place(
            Uuid::new_v4(),
            TransactionId::from_sequence(42),
            Uuid::new_v4(),
            vec![line(10_000, 1)],
            PaymentMethod::Paypal,
        )
        .unwrap();

        let correlation_id = Uuid::new_v4();
        let mut envelopes = vec![EventEnvelope::new(
            live.id,
            1,
            placed_event.name().to_string(),
            placed_event,
            correlation_id,
        )];

        let events = live
            .handle_command(&OrderCommand::ConfirmGatewayPayment { payment_id: "pay_9".into() })
            .unwrap();
        for event in events {
            live.apply_event(&event).unwrap();
            let seq = envelopes.len() as i64 + 1;
            envelopes.push(EventEnvelope::new(live.id, seq, event.name().to_string(), event, correlation_id));
        }

        let replayed = OrderAggregate::load_from_events(envelopes).unwrap();
        assert_eq!(replayed.id, live.id);
        assert_eq!(replayed.version, 3);
        assert_eq!(replayed.status, OrderStatus::Completed);
        assert!(replayed.access_granted);
        assert_eq!(replayed.gateway_payment_id.as_deref(), Some("pay_9"));
    }

    #[test]
    fn test_replay_requires_placed_first() {
        let envelope = EventEnvelope::new(
            Uuid::new_v4(),
            1,
            "AccessGranted".to_string(),
            OrderEvent::AccessGranted(AccessGranted { granted_by: None, granted_at: Utc::now() }),
            Uuid::new_v4(),
        );
        assert!(OrderAggregate::load_from_events(vec![envelope]).is_err());
    }
}
