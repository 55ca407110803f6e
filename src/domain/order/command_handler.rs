use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::domain::catalog::CatalogError;
use crate::error::{AppError, AppResult};
use crate::event_sourcing::{Aggregate, EventEnvelope, EventStore};
use crate::metrics::Metrics;

use super::aggregate::OrderAggregate;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::OrderEvent;
use super::value_objects::PaymentMethod;

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: Command → Aggregate → Events → Event Store + orders row
//
// Each command runs in one transaction holding the order's row lock, so the
// event log, the current-state row and publisher earnings never disagree.
//
// ============================================================================

/// Who issued a command and on whose behalf, copied onto every envelope.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub correlation_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub source: &'static str,
}

impl CommandContext {
    pub fn new(actor_id: Option<Uuid>, source: &'static str) -> Self {
        Self {
            correlation_id: Uuid::now_v7(),
            actor_id,
            source,
        }
    }
}

/// The order after a command, plus the events it produced (empty for no-ops).
#[derive(Debug)]
pub struct HandledCommand {
    pub order: OrderAggregate,
    pub events: Vec<OrderEvent>,
}

pub struct OrderCommandHandler {
    pool: PgPool,
    event_store: Arc<EventStore<OrderEvent>>,
    metrics: Arc<Metrics>,
}

impl OrderCommandHandler {
    pub fn new(pool: PgPool, event_store: Arc<EventStore<OrderEvent>>, metrics: Arc<Metrics>) -> Self {
        Self {
            pool,
            event_store,
            metrics,
        }
    }

    /// Turn the customer's cart into a pending order and empty the cart.
    pub async fn place(
        &self,
        customer_id: Uuid,
        payment_method: PaymentMethod,
        ctx: &CommandContext,
    ) -> AppResult<OrderAggregate> {
        let mut tx = self.pool.begin().await?;

        let cart = db::carts::lock_for_customer(&mut tx, customer_id).await?;
        let lines = db::carts::checkout_lines(&mut tx, cart.id).await?;
        if lines.is_empty() {
            return Err(OrderError::EmptyCart.into());
        }

        let mut items = Vec::with_capacity(lines.len());
        for checkout in lines {
            if !checkout.published {
                return Err(CatalogError::NotPublished(checkout.line.book_id).into());
            }
            items.push(checkout.line);
        }

        let transaction_id = db::orders::next_transaction_id(&mut tx).await?;
        let (order, event) =
            OrderAggregate::place(Uuid::now_v7(), transaction_id, customer_id, items, payment_method)?;

        db::orders::insert(&mut tx, &order).await?;
        let envelope = self.envelope(order.id, order.version, event, ctx);
        self.event_store
            .append_events(&mut tx, order.id, 0, &[envelope])
            .await?;
        db::carts::clear(&mut tx, cart.id).await?;

        tx.commit().await?;

        self.metrics.record_order_placed(payment_method.as_str());
        tracing::info!(
            order_id = %order.id,
            transaction_id = %order.transaction_id,
            customer_id = %customer_id,
            total = %order.total,
            payment_method = %payment_method,
            "🛒 Order placed"
        );

        Ok(order)
    }

    /// Run a command against an existing order.
    pub async fn handle(
        &self,
        order_id: Uuid,
        command: OrderCommand,
        ctx: &CommandContext,
    ) -> AppResult<HandledCommand> {
        let mut tx = self.pool.begin().await?;

        let mut order = db::orders::lock(&mut tx, order_id)
            .await?
            .ok_or_else(|| AppError::not_found("Order not found"))?;

        let events = match order.handle_command(&command) {
            Ok(events) => events,
            Err(e) => {
                self.metrics.record_order_command(command.name(), "rejected");
                tracing::debug!(
                    order_id = %order_id,
                    command = command.name(),
                    status = %order.status,
                    error = %e,
                    "Order command rejected"
                );
                return Err(e.into());
            }
        };

        if events.is_empty() {
            self.metrics.record_order_command(command.name(), "noop");
            return Ok(HandledCommand { order, events });
        }

        let expected_version = order.version();
        let mut envelopes: Vec<EventEnvelope<OrderEvent>> = Vec::with_capacity(events.len());
        for (offset, event) in events.iter().enumerate() {
            order.apply_event(event)?;

            let sequence = expected_version + offset as i64 + 1;
            let mut envelope = self.envelope(order.id, sequence, event.clone(), ctx);
            if let Some(previous) = envelopes.last() {
                envelope = envelope.with_causation(previous.event_id);
            }
            envelopes.push(envelope);
        }

        let new_version = self
            .event_store
            .append_events(&mut tx, order.id, expected_version, &envelopes)
            .await?;
        order.set_version(new_version);

        db::orders::update(&mut tx, &order).await?;

        if events.iter().any(OrderEvent::settles_payment) {
            db::publishers::credit_sale(&mut tx, &order.items).await?;
        }
        if events.iter().any(OrderEvent::reverses_sale) {
            db::publishers::debit_refund(&mut tx, &order.items).await?;
        }

        tx.commit().await?;

        self.metrics.record_order_command(command.name(), "applied");
        for event in &events {
            self.metrics.record_order_event(event.name());
        }
        tracing::info!(
            order_id = %order.id,
            command = command.name(),
            status = %order.status,
            version = new_version,
            source = ctx.source,
            "Order command applied"
        );

        Ok(HandledCommand { order, events })
    }

    /// Full event history of an order and the state it replays to.
    pub async fn history(&self, order_id: Uuid) -> AppResult<(Vec<EventEnvelope<OrderEvent>>, OrderAggregate)> {
        let events = self.event_store.load_events(&self.pool, order_id).await?;
        if events.is_empty() {
            return Err(AppError::not_found("Order not found"));
        }
        let replayed = OrderAggregate::load_from_events(events.clone())?;
        Ok((events, replayed))
    }

    fn envelope(
        &self,
        order_id: Uuid,
        sequence: i64,
        event: OrderEvent,
        ctx: &CommandContext,
    ) -> EventEnvelope<OrderEvent> {
        let event_type = event.name().to_string();
        EventEnvelope::new(order_id, sequence, event_type, event, ctx.correlation_id)
            .with_user(ctx.actor_id)
            .with_metadata("source".to_string(), ctx.source.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_context_has_fresh_correlation() {
        let a = CommandContext::new(None, "gateway");
        let b = CommandContext::new(None, "gateway");
        assert_ne!(a.correlation_id, b.correlation_id);
        assert_eq!(a.source, "gateway");
    }
}
