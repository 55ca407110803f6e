use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::db::orders::BookSales;
use crate::db::publishers::Publisher;
use crate::domain::account::{check_payout, normalize_genres};
use crate::domain::catalog::Book;
use crate::domain::money::Money;
use crate::error::{AppError, AppResult};

// ============================================================================
// Publisher Service - profiles, earnings and payouts
// ============================================================================

/// What the publisher sees about themselves.
#[derive(Debug, Serialize)]
pub struct PublisherDashboard {
    pub publisher: Publisher,
    pub books: Vec<Book>,
    pub sales: Vec<BookSales>,
}

/// Public storefront view; earnings stay private.
#[derive(Debug, Serialize)]
pub struct PublicPublisher {
    pub id: Uuid,
    pub pen_name: String,
    pub biography: String,
    pub website: Option<String>,
    pub genres: Vec<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub books: Vec<Book>,
}

#[derive(Debug, Deserialize)]
pub struct PublisherUpdate {
    pub biography: Option<String>,
    pub website: Option<String>,
    pub genres: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct PayrollRequest {
    pub publisher_id: Uuid,
    pub amount: Money,
}

pub struct PublisherService {
    pool: PgPool,
}

impl PublisherService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn dashboard(&self, publisher_id: Uuid) -> AppResult<PublisherDashboard> {
        let publisher = self.find(publisher_id).await?;
        let books = db::books::by_publisher(&self.pool, publisher_id).await?;
        let sales = db::orders::sales_for_publisher(&self.pool, publisher_id).await?;
        Ok(PublisherDashboard { publisher, books, sales })
    }

    pub async fn public_profile(&self, publisher_id: Uuid) -> AppResult<PublicPublisher> {
        let publisher = self.find(publisher_id).await?;
        let books = db::books::by_publisher(&self.pool, publisher_id)
            .await?
            .into_iter()
            .filter(Book::is_published)
            .collect();

        Ok(PublicPublisher {
            id: publisher.id,
            pen_name: publisher.pen_name,
            biography: publisher.biography,
            website: publisher.website,
            genres: publisher.genres,
            is_verified: publisher.is_verified,
            created_at: publisher.created_at,
            books,
        })
    }

    pub async fn list(&self) -> AppResult<Vec<Publisher>> {
        Ok(db::publishers::list(&self.pool).await?)
    }

    pub async fn update_profile(&self, publisher_id: Uuid, update: PublisherUpdate) -> AppResult<Publisher> {
        let genres = update.genres.map(normalize_genres);
        let publisher = db::publishers::update_profile(
            &self.pool,
            publisher_id,
            update.biography.as_deref().map(str::trim),
            update.website.as_deref().map(str::trim),
            genres.as_deref(),
        )
        .await?;
        Ok(publisher)
    }

    pub async fn verify(&self, publisher_id: Uuid, admin_id: Uuid) -> AppResult<Publisher> {
        let publisher = db::publishers::verify(&self.pool, publisher_id)
            .await?
            .ok_or_else(|| AppError::not_found("Publisher not found"))?;
        tracing::info!(publisher_id = %publisher_id, admin_id = %admin_id, "✅ Publisher verified");
        Ok(publisher)
    }

    /// Pay out part of a publisher's pending earnings.
    pub async fn payroll(&self, request: PayrollRequest, admin_id: Uuid) -> AppResult<Publisher> {
        let mut tx = self.pool.begin().await?;

        let publisher = db::publishers::lock(&mut tx, request.publisher_id)
            .await?
            .ok_or_else(|| AppError::not_found("Publisher not found"))?;
        check_payout(request.amount, publisher.pending_earnings)?;

        let publisher = db::publishers::record_payout(&mut tx, publisher.id, request.amount).await?;
        tx.commit().await?;

        tracing::info!(
            publisher_id = %publisher.id,
            amount = %request.amount,
            remaining = %publisher.pending_earnings,
            admin_id = %admin_id,
            "💸 Publisher payout recorded"
        );
        Ok(publisher)
    }

    pub async fn reset_monthly_earnings(&self, admin_id: Uuid) -> AppResult<u64> {
        let reset = db::publishers::reset_monthly_earnings(&self.pool).await?;
        tracing::info!(publishers = reset, admin_id = %admin_id, "Monthly earnings reset");
        Ok(reset)
    }

    async fn find(&self, publisher_id: Uuid) -> AppResult<Publisher> {
        db::publishers::find(&self.pool, publisher_id)
            .await?
            .ok_or_else(|| AppError::not_found("Publisher not found"))
    }
}
