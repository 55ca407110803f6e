use std::collections::HashMap;
use std::marker::PhantomData;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::event_sourcing::core::{DomainEvent, EventEnvelope};

// ============================================================================
// Generic Event Store - Append-only Postgres event log
// ============================================================================
//
// Type Parameter:
// - `E`: The domain event type (must implement DomainEvent trait)
//
// Responsibilities:
// 1. Append events inside the caller's transaction
// 2. Load event history for aggregates
// 3. Reject appends whose expected version is stale
//
// ============================================================================

pub struct EventStore<E: DomainEvent> {
    aggregate_type_name: String,  // e.g., "Order"
    table: &'static str,          // e.g., "order_events"
    _phantom: PhantomData<E>,
}

type EventRow = (
    Uuid,
    i64,
    Uuid,
    String,
    i32,
    Json<serde_json::Value>,
    Option<Uuid>,
    Uuid,
    Option<Uuid>,
    Json<HashMap<String, String>>,
    DateTime<Utc>,
);

impl<E: DomainEvent> EventStore<E> {
    pub fn new(aggregate_type_name: &str, table: &'static str) -> Self {
        Self {
            aggregate_type_name: aggregate_type_name.to_string(),
            table,
            _phantom: PhantomData,
        }
    }

    /// Append events to the event log.
    ///
    /// Runs on the caller's connection so the append commits or rolls back
    /// together with the aggregate's row. Returns the new version.
    pub async fn append_events(
        &self,
        conn: &mut PgConnection,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[EventEnvelope<E>],
    ) -> Result<i64> {
        if events.is_empty() {
            bail!("Cannot append empty event list");
        }

        // Check optimistic concurrency
        let current_version = self.current_version(&mut *conn, aggregate_id).await?;
        if current_version != expected_version {
            bail!(
                "Concurrency conflict: expected version {}, but current is {}",
                expected_version,
                current_version
            );
        }

        let insert = format!(
            "INSERT INTO {} (
                event_id, aggregate_id, sequence_number, event_type, event_version,
                event_data, causation_id, correlation_id, user_id, metadata, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            self.table
        );

        let mut new_version = expected_version;

        for envelope in events {
            new_version += 1;
            if envelope.sequence_number != new_version {
                bail!(
                    "Event sequence gap: expected {}, got {}",
                    new_version,
                    envelope.sequence_number
                );
            }

            sqlx::query(&insert)
                .bind(envelope.event_id)
                .bind(aggregate_id)
                .bind(new_version)
                .bind(&envelope.event_type)
                .bind(envelope.event_version)
                .bind(Json(&envelope.event_data))
                .bind(envelope.causation_id)
                .bind(envelope.correlation_id)
                .bind(envelope.user_id)
                .bind(Json(&envelope.metadata))
                .bind(envelope.timestamp)
                .execute(&mut *conn)
                .await?;
        }

        tracing::debug!(
            aggregate_id = %aggregate_id,
            aggregate_type = %self.aggregate_type_name,
            new_version = new_version,
            event_count = events.len(),
            "Appended events to event store"
        );

        Ok(new_version)
    }

    /// Load all events for an aggregate, oldest first
    pub async fn load_events(&self, pool: &PgPool, aggregate_id: Uuid) -> Result<Vec<EventEnvelope<E>>> {
        let select = format!(
            "SELECT aggregate_id, sequence_number, event_id, event_type, event_version,
                    event_data, causation_id, correlation_id, user_id, metadata, created_at
             FROM {}
             WHERE aggregate_id = $1
             ORDER BY sequence_number ASC",
            self.table
        );

        let rows: Vec<EventRow> = sqlx::query_as(&select)
            .bind(aggregate_id)
            .fetch_all(pool)
            .await?;

        let mut events = Vec::with_capacity(rows.len());

        for row in rows {
            let (
                agg_id,
                sequence_number,
                event_id,
                event_type,
                event_version,
                Json(event_data_json),
                causation_id,
                correlation_id,
                user_id,
                Json(metadata),
                timestamp,
            ) = row;

            let event_data: E = serde_json::from_value(event_data_json)?;

            events.push(EventEnvelope {
                event_id,
                aggregate_id: agg_id,
                sequence_number,
                event_type,
                event_version,
                event_data,
                causation_id,
                correlation_id,
                user_id,
                timestamp,
                metadata,
            });
        }

        tracing::debug!("Loaded {} events for aggregate {}", events.len(), aggregate_id);
        Ok(events)
    }

    /// Current version of an aggregate (0 when it has no events)
    pub async fn current_version(&self, conn: &mut PgConnection, aggregate_id: Uuid) -> Result<i64> {
        let select = format!(
            "SELECT COALESCE(MAX(sequence_number), 0) FROM {} WHERE aggregate_id = $1",
            self.table
        );

        let (version,): (i64,) = sqlx::query_as(&select)
            .bind(aggregate_id)
            .fetch_one(conn)
            .await?;

        Ok(version)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use crate::domain::order::{
        AccessGranted, OrderEvent, OrderLine, OrderPlaced, PaymentMethod, TransactionId,
    };

    fn placed_event(order_id: Uuid) -> OrderEvent {
        OrderEvent::Placed(OrderPlaced {
            order_id,
            transaction_id: TransactionId::from_sequence(3),
            customer_id: Uuid::new_v4(),
            items: vec![OrderLine {
                book_id: Uuid::new_v4(),
                title: "Ibong Adarna".into(),
                quantity: 1,
                unit_price: Money::from_cents(19_900),
            }],
            total: Money::from_cents(19_900),
            payment_method: PaymentMethod::Gcash,
            placed_at: Utc::now(),
        })
    }

    #[test]
    fn test_event_payload_is_adjacently_tagged() {
        let json = serde_json::to_value(placed_event(Uuid::new_v4())).unwrap();
        assert_eq!(json["type"], "Placed");
        assert_eq!(json["data"]["transaction_id"], "TXN-00000003");
        assert_eq!(json["data"]["total"], 19_900);

        let back: OrderEvent = serde_json::from_value(json).unwrap();
        assert!(matches!(back, OrderEvent::Placed(_)));
    }

    #[test]
    fn test_stored_row_decodes_into_envelope_payload() {
        // what load_events receives from the event_data column
        let stored = serde_json::json!({
            "type": "AccessGranted",
            "data": { "granted_by": null, "granted_at": "2026-01-05T10:00:00Z" }
        });
        let event: OrderEvent = serde_json::from_value(stored).unwrap();
        assert!(matches!(event, OrderEvent::AccessGranted(AccessGranted { granted_by: None, .. })));
    }

    #[test]
    fn test_store_holds_table_name() {
        let store: EventStore<OrderEvent> = EventStore::new("Order", "order_events");
        assert_eq!(store.table, "order_events");
        assert_eq!(store.aggregate_type_name, "Order");
    }
}
