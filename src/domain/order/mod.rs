// ============================================================================
// Order Domain - Business Logic for Order Aggregate
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (OrderLine, OrderStatus, PaymentMethod, PaymentProof)
// - Events (OrderPlaced, PaymentCompleted, RefundProcessed, etc.)
// - Commands (SubmitPaymentProof, Cancel, ProcessRefund, etc.)
// - Errors (OrderError enum)
// - Aggregate (OrderAggregate with the status state machine)
// - Command Handler (OrderCommandHandler, one transaction per command)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
