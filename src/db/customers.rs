use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::catalog::Book;
use super::books::book_columns;

// ============================================================================
// Customers - plan lookup, wishlists and the admin roster
// ============================================================================

/// A customer profile joined with its account.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CustomerSummary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub is_active: bool,
    pub subscription_plan: String,
    pub loyalty_points: i64,
    pub order_count: i64,
    pub created_at: DateTime<Utc>,
}

const SUMMARY_SELECT: &str = "SELECT c.id, c.user_id, u.username, u.email, u.full_name, u.is_active,
        c.subscription_plan, c.loyalty_points,
        (SELECT COUNT(*) FROM orders o WHERE o.customer_id = c.id) AS order_count,
        c.created_at
     FROM customers c JOIN users u ON u.id = c.user_id";

/// Active customers, newest first.
pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> sqlx::Result<(Vec<CustomerSummary>, i64)> {
    let customers = sqlx::query_as(&format!(
        "{SUMMARY_SELECT} WHERE u.is_active ORDER BY c.created_at DESC LIMIT $1 OFFSET $2"
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM customers c JOIN users u ON u.id = c.user_id WHERE u.is_active",
    )
    .fetch_one(pool)
    .await?;

    Ok((customers, total))
}

pub async fn find(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<CustomerSummary>> {
    sqlx::query_as(&format!("{SUMMARY_SELECT} WHERE c.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn subscription_plan(pool: &PgPool, customer_id: Uuid) -> sqlx::Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT subscription_plan FROM customers WHERE id = $1")
        .bind(customer_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(plan,)| plan))
}

/// Returns false when the book was already wishlisted.
pub async fn add_to_wishlist(pool: &PgPool, customer_id: Uuid, book_id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "INSERT INTO wishlist_items (customer_id, book_id) VALUES ($1, $2)
         ON CONFLICT (customer_id, book_id) DO NOTHING",
    )
    .bind(customer_id)
    .bind(book_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn remove_from_wishlist(pool: &PgPool, customer_id: Uuid, book_id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM wishlist_items WHERE customer_id = $1 AND book_id = $2")
        .bind(customer_id)
        .bind(book_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn wishlist(pool: &PgPool, customer_id: Uuid) -> sqlx::Result<Vec<Book>> {
    let columns = book_columns("b");
    sqlx::query_as(&format!(
        "SELECT {columns} FROM wishlist_items w
         JOIN books b ON b.id = w.book_id
         WHERE w.customer_id = $1
         ORDER BY w.added_at DESC"
    ))
    .bind(customer_id)
    .fetch_all(pool)
    .await
}
