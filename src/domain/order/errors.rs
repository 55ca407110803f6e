use super::value_objects::{OrderStatus, PaymentMethod};

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Cannot create an order from an empty cart")]
    EmptyCart,

    #[error("Invalid item quantity: {0}")]
    InvalidQuantity(i32),

    #[error("Order total overflows")]
    TotalOverflow,

    #[error("Cannot {action} an order in status: {status}")]
    InvalidTransition {
        action: &'static str,
        status: OrderStatus,
    },

    #[error("Payment method {0} does not accept proof of payment")]
    NotManualPayment(PaymentMethod),

    #[error("Order has no payment proof to review")]
    MissingPaymentProof,

    #[error("Book access can only be granted once the order is completed (status: {0})")]
    AccessRequiresCompleted(OrderStatus),

    #[error("Book access has not been granted for this order")]
    AccessNotGranted,

    #[error("Refund can only be requested for completed orders (status: {0})")]
    RefundRequiresCompleted(OrderStatus),

    #[error("Refund has already been requested")]
    RefundAlreadyRequested,

    #[error("Refund has not been requested")]
    RefundNotRequested,

    #[error("Order was already paid with gateway payment {0}")]
    PaidByOtherPayment(String),

    #[error("Book is not part of this order")]
    BookNotInOrder,

    #[error("Aggregate not initialized")]
    NotInitialized,
}
