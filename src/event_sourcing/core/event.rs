use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

// ============================================================================
// Event Envelope - Event Metadata
// ============================================================================
//
// Wraps domain events with metadata for the event log.
// This is GENERIC and works with ANY event type.
//
// ============================================================================

/// Generic Event Envelope - wraps any domain event with metadata
///
/// Type Parameter:
/// - `E`: The domain event type (must implement DomainEvent trait)
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EventEnvelope<E> {
    // Event Identity
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub sequence_number: i64,

    // Event Type Information
    pub event_type: String,
    pub event_version: i32,

    // Event Payload
    pub event_data: E,

    // Causation & Correlation
    pub causation_id: Option<Uuid>,      // What request/event caused this
    pub correlation_id: Uuid,            // Groups events written by one request

    // Actor Information
    pub user_id: Option<Uuid>,           // Who triggered this event

    // Timing
    pub timestamp: DateTime<Utc>,

    // Additional Metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        aggregate_id: Uuid,
        sequence_number: i64,
        event_type: String,
        event_data: E,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            aggregate_id,
            sequence_number,
            event_type,
            event_version: 1, // Start at version 1
            event_data,
            causation_id: None,
            correlation_id,
            user_id: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_causation(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    pub fn with_metadata(mut self, key: String, value: String) -> Self {
        self.metadata.insert(key, value);
        self
    }
}

// ============================================================================
// Domain Event Trait
// ============================================================================

/// Generic Domain Event trait
///
/// All domain events must implement this trait to be used with the event store.
pub trait DomainEvent: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync {
    fn event_type() -> &'static str where Self: Sized;
    fn event_version() -> i32 where Self: Sized { 1 }
}

// ============================================================================
// Tests
// ============================================================================
