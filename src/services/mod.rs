// ============================================================================
// Application Services - use cases behind the HTTP handlers
// ============================================================================
//
// Each service owns a pool handle plus whatever shared infrastructure it
// needs (upload store, order command handler, payment gateway). Handlers
// stay thin: authorize, parse, call one service method.
//
// ============================================================================

pub mod auth;
pub mod accounts;
pub mod publishers;
pub mod catalog;
pub mod cart;
pub mod orders;
pub mod payments;

pub use accounts::AccountService;
pub use cart::CartService;
pub use catalog::CatalogService;
pub use orders::OrderService;
pub use payments::PaymentService;
pub use publishers::PublisherService;
