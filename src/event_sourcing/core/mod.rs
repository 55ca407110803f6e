// ============================================================================
// Event Sourcing Core - Generic Infrastructure Abstractions
// ============================================================================
//
// GENERIC event sourcing building blocks shared by every aggregate.
// No domain-specific code lives here.
//
// ============================================================================

pub mod aggregate;
pub mod event;

// Re-export core types for convenience
pub use aggregate::Aggregate;
pub use event::{DomainEvent, EventEnvelope};
