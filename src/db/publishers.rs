use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::domain::money::Money;
use crate::domain::order::OrderLine;

// ============================================================================
// Publishers - profiles and earnings ledger
// ============================================================================

const COLUMNS: &str = "id, user_id, pen_name, biography, website, genres, commission_rate,
     total_earnings_cents, current_month_earnings_cents, pending_earnings_cents,
     last_payment_date, is_verified, verification_date, documents_submitted, created_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Publisher {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pen_name: String,
    pub biography: String,
    pub website: Option<String>,
    pub genres: Vec<String>,
    pub commission_rate: f64,
    #[sqlx(rename = "total_earnings_cents", try_from = "i64")]
    pub total_earnings: Money,
    #[sqlx(rename = "current_month_earnings_cents", try_from = "i64")]
    pub current_month_earnings: Money,
    #[sqlx(rename = "pending_earnings_cents", try_from = "i64")]
    pub pending_earnings: Money,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub is_verified: bool,
    pub verification_date: Option<DateTime<Utc>>,
    pub documents_submitted: bool,
    pub created_at: DateTime<Utc>,
}

pub async fn find<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> sqlx::Result<Option<Publisher>> {
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM publishers WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn lock(conn: &mut PgConnection, id: Uuid) -> sqlx::Result<Option<Publisher>> {
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM publishers WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn list(pool: &PgPool) -> sqlx::Result<Vec<Publisher>> {
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM publishers ORDER BY created_at DESC"))
        .fetch_all(pool)
        .await
}

pub async fn update_profile(
    pool: &PgPool,
    id: Uuid,
    biography: Option<&str>,
    website: Option<&str>,
    genres: Option<&[String]>,
) -> sqlx::Result<Publisher> {
    sqlx::query_as(&format!(
        "UPDATE publishers SET
            biography = COALESCE($2, biography),
            website = COALESCE($3, website),
            genres = COALESCE($4, genres)
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(biography)
    .bind(website)
    .bind(genres)
    .fetch_one(pool)
    .await
}

/// Mark a publisher verified; returns None when no such publisher exists.
pub async fn verify(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<Publisher>> {
    sqlx::query_as(&format!(
        "UPDATE publishers SET is_verified = TRUE, verification_date = COALESCE(verification_date, NOW())
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Deduct a payout from pending earnings. The caller holds the row lock and
/// has already checked the amount against the balance.
pub async fn record_payout(conn: &mut PgConnection, id: Uuid, amount: Money) -> sqlx::Result<Publisher> {
    sqlx::query_as(&format!(
        "UPDATE publishers SET
            pending_earnings_cents = pending_earnings_cents - $2,
            last_payment_date = NOW()
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(amount.cents())
    .fetch_one(conn)
    .await
}

fn line_subtotal(line: &OrderLine) -> sqlx::Result<i64> {
    line.subtotal().map(|m| m.cents()).ok_or_else(|| {
        sqlx::Error::Protocol(format!("order line subtotal overflows for book {}", line.book_id))
    })
}

/// Credit each line's publisher with its commission share and count the sales.
pub async fn credit_sale(conn: &mut PgConnection, items: &[OrderLine]) -> sqlx::Result<()> {
    for line in items {
        sqlx::query(
            "UPDATE publishers p SET
                total_earnings_cents = total_earnings_cents + share.cents,
                current_month_earnings_cents = current_month_earnings_cents + share.cents,
                pending_earnings_cents = pending_earnings_cents + share.cents
             FROM (
                SELECT b.publisher_id, ROUND($2::BIGINT * pub.commission_rate)::BIGINT AS cents
                FROM books b JOIN publishers pub ON pub.id = b.publisher_id
                WHERE b.id = $1
             ) share
             WHERE p.id = share.publisher_id",
        )
        .bind(line.book_id)
        .bind(line_subtotal(line)?)
        .execute(&mut *conn)
        .await?;

        sqlx::query("UPDATE books SET sales_count = sales_count + $2 WHERE id = $1")
            .bind(line.book_id)
            .bind(i64::from(line.quantity))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Take a refunded sale back out of its publishers' earnings.
///
/// Balances floor at zero: a share that was already paid out or rolled into
/// a closed month cannot be recovered here.
pub async fn debit_refund(conn: &mut PgConnection, items: &[OrderLine]) -> sqlx::Result<()> {
    for line in items {
        sqlx::query(
            "UPDATE publishers p SET
                total_earnings_cents = GREATEST(total_earnings_cents - share.cents, 0),
                current_month_earnings_cents = GREATEST(current_month_earnings_cents - share.cents, 0),
                pending_earnings_cents = GREATEST(pending_earnings_cents - share.cents, 0)
             FROM (
                SELECT b.publisher_id, ROUND($2::BIGINT * pub.commission_rate)::BIGINT AS cents
                FROM books b JOIN publishers pub ON pub.id = b.publisher_id
                WHERE b.id = $1
             ) share
             WHERE p.id = share.publisher_id",
        )
        .bind(line.book_id)
        .bind(line_subtotal(line)?)
        .execute(&mut *conn)
        .await?;

        sqlx::query("UPDATE books SET sales_count = GREATEST(sales_count - $2, 0) WHERE id = $1")
            .bind(line.book_id)
            .bind(i64::from(line.quantity))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Zero out current-month earnings; run at the start of each month.
pub async fn reset_monthly_earnings(pool: &PgPool) -> sqlx::Result<u64> {
    let result = sqlx::query("UPDATE publishers SET current_month_earnings_cents = 0")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
