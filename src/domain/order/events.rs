use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::money::Money;
use crate::event_sourcing::DomainEvent;
use super::value_objects::{OrderLine, PaymentMethod, PaymentProof, TransactionId};

// ============================================================================
// Order Events - Domain Events for Order Aggregate
// ============================================================================

/// Order Event - Union type for all order events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Placed(OrderPlaced),
    GatewayReferenceAttached(GatewayReferenceAttached),
    PaymentProofSubmitted(PaymentProofSubmitted),
    PaymentApproved(PaymentReviewed),
    PaymentRejected(PaymentReviewed),
    PaymentCompleted(PaymentCompleted),
    PaymentFailed(PaymentFailed),
    AccessGranted(AccessGranted),
    Cancelled(OrderCancelled),
    RefundRequested(RefundRequested),
    RefundProcessed(RefundProcessed),
}

impl OrderEvent {
    /// Name stored in the event log's `event_type` column.
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "OrderPlaced",
            OrderEvent::GatewayReferenceAttached(_) => "GatewayReferenceAttached",
            OrderEvent::PaymentProofSubmitted(_) => "PaymentProofSubmitted",
            OrderEvent::PaymentApproved(_) => "PaymentApproved",
            OrderEvent::PaymentRejected(_) => "PaymentRejected",
            OrderEvent::PaymentCompleted(_) => "PaymentCompleted",
            OrderEvent::PaymentFailed(_) => "PaymentFailed",
            OrderEvent::AccessGranted(_) => "AccessGranted",
            OrderEvent::Cancelled(_) => "OrderCancelled",
            OrderEvent::RefundRequested(_) => "RefundRequested",
            OrderEvent::RefundProcessed(_) => "RefundProcessed",
        }
    }

    /// Events after which the order counts as paid.
    pub fn settles_payment(&self) -> bool {
        matches!(self, OrderEvent::PaymentApproved(_) | OrderEvent::PaymentCompleted(_))
    }

    /// Events that take back a sale already credited to publishers.
    pub fn reverses_sale(&self) -> bool {
        matches!(self, OrderEvent::RefundProcessed(_))
    }
}

impl DomainEvent for OrderEvent {
    fn event_type() -> &'static str { "OrderEvent" }
}

// ============================================================================
// Individual Event Types
// ============================================================================

/// Order Placed - cart snapshot taken at checkout
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderPlaced {
    pub order_id: Uuid,
    pub transaction_id: TransactionId,
    pub customer_id: Uuid,
    pub items: Vec<OrderLine>,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub placed_at: DateTime<Utc>,
}

/// Gateway intent or source created for this order
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GatewayReferenceAttached {
    pub reference: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PaymentProofSubmitted {
    pub proof: PaymentProof,
}

/// Admin verdict on a submitted proof (approved or rejected)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PaymentReviewed {
    pub reviewed_by: Uuid,
    pub admin_notes: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PaymentCompleted {
    pub gateway_payment_id: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PaymentFailed {
    pub reason: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AccessGranted {
    pub granted_by: Option<Uuid>,
    pub granted_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderCancelled {
    pub reason: String,
    pub cancelled_by: Option<Uuid>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RefundRequested {
    pub requested_by: Uuid,
    pub reason: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RefundProcessed {
    pub processed_by: Uuid,
    pub gateway_refund_id: Option<String>,
}
