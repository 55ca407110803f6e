// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Pure business rules, free of HTTP and SQL:
// - money: integer centavo amounts
// - account: registration, roles, payouts
// - catalog: books, shelves, search filters
// - cart: per-customer cart lines
// - order: event-sourced order/payment lifecycle
//
// ============================================================================

pub mod money;
pub mod account;
pub mod catalog;
pub mod cart;
pub mod order;
