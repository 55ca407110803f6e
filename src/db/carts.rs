use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::cart::{Cart, CartItem};
use crate::domain::money::Money;
use crate::domain::order::OrderLine;

// ============================================================================
// Carts - one per customer, rewritten wholesale on every change
// ============================================================================

/// Cart line joined with catalog data for display.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartLineView {
    pub book_id: Uuid,
    pub title: String,
    pub author_name: String,
    pub cover_image_url: Option<String>,
    pub quantity: i32,
    #[sqlx(rename = "unit_price_cents", try_from = "i64")]
    pub unit_price: Money,
    #[sqlx(rename = "current_price_cents", try_from = "i64")]
    pub current_price: Money,
    pub added_at: DateTime<Utc>,
}

/// A line about to become part of an order.
#[derive(Debug, Clone)]
pub struct CheckoutLine {
    pub line: OrderLine,
    pub published: bool,
}

/// Load the customer's cart, creating it on first use, and lock it for the
/// rest of the transaction.
pub async fn lock_for_customer(conn: &mut PgConnection, customer_id: Uuid) -> sqlx::Result<Cart> {
    sqlx::query(
        "INSERT INTO carts (id, customer_id) VALUES ($1, $2)
         ON CONFLICT (customer_id) DO NOTHING",
    )
    .bind(Uuid::now_v7())
    .bind(customer_id)
    .execute(&mut *conn)
    .await?;

    let (cart_id,): (Uuid,) = sqlx::query_as("SELECT id FROM carts WHERE customer_id = $1 FOR UPDATE")
        .bind(customer_id)
        .fetch_one(&mut *conn)
        .await?;

    let rows: Vec<(Uuid, i32, i64)> = sqlx::query_as(
        "SELECT book_id, quantity, unit_price_cents FROM cart_items
         WHERE cart_id = $1 ORDER BY added_at ASC",
    )
    .bind(cart_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut cart = Cart::empty(cart_id, customer_id);
    cart.items = rows
        .into_iter()
        .map(|(book_id, quantity, price)| CartItem {
            book_id,
            quantity,
            unit_price: Money::from_cents(price),
        })
        .collect();
    Ok(cart)
}

/// Replace the stored lines with the cart's current lines.
///
/// Lines that survive keep their original `added_at`.
pub async fn save(conn: &mut PgConnection, cart: &Cart) -> sqlx::Result<()> {
    let book_ids: Vec<Uuid> = cart.items.iter().map(|i| i.book_id).collect();
    let quantities: Vec<i32> = cart.items.iter().map(|i| i.quantity).collect();
    let prices: Vec<i64> = cart.items.iter().map(|i| i.unit_price.cents()).collect();

    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND NOT (book_id = ANY ($2))")
        .bind(cart.id)
        .bind(&book_ids)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT INTO cart_items (cart_id, book_id, quantity, unit_price_cents)
         SELECT $1, * FROM UNNEST($2::UUID[], $3::INT[], $4::BIGINT[])
         ON CONFLICT (cart_id, book_id) DO UPDATE SET quantity = EXCLUDED.quantity",
    )
    .bind(cart.id)
    .bind(&book_ids)
    .bind(&quantities)
    .bind(&prices)
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
        .bind(cart.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn view(pool: &PgPool, customer_id: Uuid) -> sqlx::Result<Vec<CartLineView>> {
    sqlx::query_as(
        "SELECT i.book_id, b.title, b.author_name, b.cover_image_url, i.quantity,
                i.unit_price_cents, b.price_cents AS current_price_cents, i.added_at
         FROM carts c
         JOIN cart_items i ON i.cart_id = c.id
         JOIN books b ON b.id = i.book_id
         WHERE c.customer_id = $1
         ORDER BY i.added_at ASC",
    )
    .bind(customer_id)
    .fetch_all(pool)
    .await
}

/// Snapshot the locked cart as order lines, priced at price-at-add.
pub async fn checkout_lines(conn: &mut PgConnection, cart_id: Uuid) -> sqlx::Result<Vec<CheckoutLine>> {
    let rows: Vec<(Uuid, String, i32, i64, bool)> = sqlx::query_as(
        "SELECT i.book_id, b.title, i.quantity, i.unit_price_cents, b.file_path IS NOT NULL
         FROM cart_items i
         JOIN books b ON b.id = i.book_id
         WHERE i.cart_id = $1
         ORDER BY i.added_at ASC",
    )
    .bind(cart_id)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(book_id, title, quantity, price, published)| CheckoutLine {
            line: OrderLine {
                book_id,
                title,
                quantity,
                unit_price: Money::from_cents(price),
            },
            published,
        })
        .collect())
}

pub async fn clear(conn: &mut PgConnection, cart_id: Uuid) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
        .bind(cart_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
