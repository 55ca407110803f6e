use uuid::Uuid;
use anyhow::Result;
use super::event::EventEnvelope;

// ============================================================================
// Aggregate Root Pattern - Event Sourcing Core
// ============================================================================
//
// Key Principles:
// 1. Commands are validated before emitting events
// 2. Events represent facts that have already happened
// 3. Aggregates enforce business invariants
// 4. All state changes flow through events
//
// The current state is also persisted as a row, so replay is used for
// history views and audits rather than for every command.
//
// ============================================================================

/// Generic Aggregate trait - all event-sourced aggregates implement this
///
/// Type Parameters:
/// - `Event`: The domain event type for this aggregate
/// - `Command`: The command type for this aggregate
/// - `Error`: The error type for business rule violations
pub trait Aggregate: Sized + Send + Sync {
    type Event;
    type Command;
    type Error;

    /// Create new aggregate from first event
    fn apply_first_event(event: &Self::Event) -> Result<Self, Self::Error>;

    /// Apply subsequent events to update state
    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error>;

    /// Handle command and emit events (business logic)
    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Get aggregate ID
    fn aggregate_id(&self) -> Uuid;

    /// Get current version (sequence number)
    fn version(&self) -> i64;

    fn set_version(&mut self, version: i64);

    /// Load aggregate from event history (reconstruct from events)
    fn load_from_events(events: Vec<EventEnvelope<Self::Event>>) -> Result<Self>
    where
        Self::Error: std::fmt::Display,
    {
        let Some(first) = events.first() else {
            anyhow::bail!("No events to load");
        };

        // Apply first event to create aggregate
        let mut aggregate = Self::apply_first_event(&first.event_data)
            .map_err(|e| anyhow::anyhow!("Failed to apply first event: {}", e))?;
        aggregate.set_version(first.sequence_number);

        // Apply remaining events
        for envelope in events.iter().skip(1) {
            aggregate.apply_event(&envelope.event_data)
                .map_err(|e| anyhow::anyhow!("Failed to apply event: {}", e))?;
            aggregate.set_version(envelope.sequence_number);
        }

        Ok(aggregate)
    }
}
