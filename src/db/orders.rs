use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::domain::money::Money;
use crate::domain::order::{
    OrderAggregate, OrderLine, OrderStatus, PaymentMethod, PaymentProof, TransactionId,
};
use super::decode_err;

// ============================================================================
// Orders - current-state rows (the event log lives in order_events)
// ============================================================================

const COLUMNS: &str = "id, version, transaction_id, customer_id, items, total_cents, payment_method,
     status, payment_proof, gateway_reference, gateway_payment_id, refund_requested,
     refund_processed, access_granted, notes, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    version: i64,
    transaction_id: String,
    customer_id: Uuid,
    items: Json<Vec<OrderLine>>,
    total_cents: i64,
    payment_method: String,
    status: String,
    payment_proof: Option<Json<PaymentProof>>,
    gateway_reference: Option<String>,
    gateway_payment_id: Option<String>,
    refund_requested: bool,
    refund_processed: bool,
    access_granted: bool,
    notes: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for OrderAggregate {
    type Error = sqlx::Error;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(OrderAggregate {
            id: row.id,
            version: row.version,
            transaction_id: TransactionId::from_stored(row.transaction_id),
            customer_id: row.customer_id,
            items: row.items.0,
            total: Money::from_cents(row.total_cents),
            payment_method: row.payment_method.parse::<PaymentMethod>().map_err(decode_err)?,
            status: row.status.parse::<OrderStatus>().map_err(decode_err)?,
            payment_proof: row.payment_proof.map(|Json(proof)| proof),
            gateway_reference: row.gateway_reference,
            gateway_payment_id: row.gateway_payment_id,
            refund_requested: row.refund_requested,
            refund_processed: row.refund_processed,
            access_granted: row.access_granted,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_orders(rows: Vec<OrderRow>) -> sqlx::Result<Vec<OrderAggregate>> {
    rows.into_iter().map(OrderAggregate::try_from).collect()
}

/// Allocate the next human-facing transaction number.
pub async fn next_transaction_id(conn: &mut PgConnection) -> sqlx::Result<TransactionId> {
    let (value,): (i64,) = sqlx::query_as("SELECT nextval('order_transaction_seq')")
        .fetch_one(conn)
        .await?;
    Ok(TransactionId::from_sequence(value))
}

pub async fn insert(conn: &mut PgConnection, order: &OrderAggregate) -> sqlx::Result<()> {
    sqlx::query(&format!(
        "INSERT INTO orders ({COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
    ))
    .bind(order.id)
    .bind(order.version)
    .bind(order.transaction_id.as_str())
    .bind(order.customer_id)
    .bind(Json(&order.items))
    .bind(order.total.cents())
    .bind(order.payment_method.as_str())
    .bind(order.status.as_str())
    .bind(order.payment_proof.as_ref().map(Json))
    .bind(&order.gateway_reference)
    .bind(&order.gateway_payment_id)
    .bind(order.refund_requested)
    .bind(order.refund_processed)
    .bind(order.access_granted)
    .bind(&order.notes)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Write back every mutable column after a command.
pub async fn update(conn: &mut PgConnection, order: &OrderAggregate) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE orders SET
            version = $2, status = $3, payment_proof = $4, gateway_reference = $5,
            gateway_payment_id = $6, refund_requested = $7, refund_processed = $8,
            access_granted = $9, notes = $10, updated_at = $11
         WHERE id = $1",
    )
    .bind(order.id)
    .bind(order.version)
    .bind(order.status.as_str())
    .bind(order.payment_proof.as_ref().map(Json))
    .bind(&order.gateway_reference)
    .bind(&order.gateway_payment_id)
    .bind(order.refund_requested)
    .bind(order.refund_processed)
    .bind(order.access_granted)
    .bind(&order.notes)
    .bind(order.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn lock(conn: &mut PgConnection, id: Uuid) -> sqlx::Result<Option<OrderAggregate>> {
    let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.map(OrderAggregate::try_from).transpose()
}

pub async fn find<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> sqlx::Result<Option<OrderAggregate>> {
    let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {COLUMNS} FROM orders WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await?;
    row.map(OrderAggregate::try_from).transpose()
}

/// Order a gateway intent, source or payment was created for.
pub async fn find_by_gateway_reference(pool: &PgPool, references: &[String]) -> sqlx::Result<Option<OrderAggregate>> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM orders
         WHERE gateway_reference = ANY ($1) OR gateway_payment_id = ANY ($1)
         LIMIT 1"
    ))
    .bind(references)
    .fetch_optional(pool)
    .await?;
    row.map(OrderAggregate::try_from).transpose()
}

pub async fn by_customer(pool: &PgPool, customer_id: Uuid) -> sqlx::Result<Vec<OrderAggregate>> {
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM orders WHERE customer_id = $1 ORDER BY created_at DESC"
    ))
    .bind(customer_id)
    .fetch_all(pool)
    .await?;
    into_orders(rows)
}

/// Admin listing, optionally narrowed to one status.
pub async fn list(
    pool: &PgPool,
    status: Option<OrderStatus>,
    limit: i64,
    offset: i64,
) -> sqlx::Result<Vec<OrderAggregate>> {
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM orders
         WHERE ($1::TEXT IS NULL OR status = $1)
         ORDER BY created_at DESC LIMIT $2 OFFSET $3"
    ))
    .bind(status.map(|s| s.as_str()))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    into_orders(rows)
}

/// Manual-payment orders whose proof awaits review.
pub async fn awaiting_review(pool: &PgPool) -> sqlx::Result<Vec<OrderAggregate>> {
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM orders
         WHERE status = 'processing' AND payment_proof->>'status' = 'submitted'
         ORDER BY updated_at ASC"
    ))
    .fetch_all(pool)
    .await?;
    into_orders(rows)
}

/// Orders with a pending refund request.
pub async fn awaiting_refund(pool: &PgPool) -> sqlx::Result<Vec<OrderAggregate>> {
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM orders
         WHERE status = 'completed' AND refund_requested AND NOT refund_processed
         ORDER BY updated_at ASC"
    ))
    .fetch_all(pool)
    .await?;
    into_orders(rows)
}

/// A purchased book as it appears in the customer's library.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LibraryEntry {
    pub order_id: Uuid,
    pub transaction_id: String,
    pub book_id: Uuid,
    pub title: String,
    pub author_name: String,
    pub cover_image_url: Option<String>,
    pub purchased_at: DateTime<Utc>,
}

pub async fn library(pool: &PgPool, customer_id: Uuid) -> sqlx::Result<Vec<LibraryEntry>> {
    sqlx::query_as(
        "SELECT DISTINCT ON (b.id)
                o.id AS order_id, o.transaction_id, b.id AS book_id, b.title,
                b.author_name, b.cover_image_url, o.updated_at AS purchased_at
         FROM orders o
         CROSS JOIN LATERAL jsonb_array_elements(o.items) AS line
         JOIN books b ON b.id = (line->>'book_id')::UUID
         WHERE o.customer_id = $1 AND o.access_granted AND o.status = 'completed'
         ORDER BY b.id, o.updated_at DESC",
    )
    .bind(customer_id)
    .fetch_all(pool)
    .await
}

/// Per-book sales totals for one publisher, from completed orders.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BookSales {
    pub book_id: Uuid,
    pub title: String,
    pub copies_sold: i64,
    #[sqlx(rename = "revenue_cents", try_from = "i64")]
    pub revenue: Money,
}

pub async fn sales_for_publisher(pool: &PgPool, publisher_id: Uuid) -> sqlx::Result<Vec<BookSales>> {
    sqlx::query_as(
        "SELECT b.id AS book_id, b.title,
                COALESCE(s.copies, 0)::BIGINT AS copies_sold,
                COALESCE(s.revenue, 0)::BIGINT AS revenue_cents
         FROM books b
         LEFT JOIN (
            SELECT (line->>'book_id')::UUID AS book_id,
                   SUM((line->>'quantity')::BIGINT) AS copies,
                   SUM((line->>'quantity')::BIGINT * (line->>'unit_price')::BIGINT) AS revenue
            FROM orders o, jsonb_array_elements(o.items) AS line
            WHERE o.status = 'completed'
            GROUP BY 1
         ) s ON s.book_id = b.id
         WHERE b.publisher_id = $1
         ORDER BY copies_sold DESC",
    )
    .bind(publisher_id)
    .fetch_all(pool)
    .await
}
