use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::db::carts::CartLineView;
use crate::domain::cart::{CartError, CartItem};
use crate::domain::money::Money;
use crate::error::{AppError, AppResult};

// ============================================================================
// Cart Service - every mutation locks the cart row for its transaction
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartLineView>,
    pub item_count: i64,
    pub total: Money,
}

impl CartView {
    fn from_lines(items: Vec<CartLineView>) -> Result<Self, CartError> {
        let subtotals = items
            .iter()
            .map(|line| line.unit_price.checked_times(line.quantity).ok_or(CartError::TotalOverflow))
            .collect::<Result<Vec<_>, _>>()?;
        let total = Money::checked_sum(subtotals).ok_or(CartError::TotalOverflow)?;
        let item_count = items.iter().map(|line| i64::from(line.quantity)).sum();
        Ok(Self { items, item_count, total })
    }
}

#[derive(Debug, Deserialize)]
pub struct CartLineRequest {
    pub book_id: Uuid,
    #[serde(default = "one")]
    pub quantity: i32,
}

fn one() -> i32 {
    1
}

/// Guest cart lines carried over at login. Any client-side price is ignored.
#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub items: Vec<CartLineRequest>,
}

pub struct CartService {
    pool: PgPool,
}

impl CartService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn view(&self, customer_id: Uuid) -> AppResult<CartView> {
        // First visit creates the cart.
        let mut tx = self.pool.begin().await?;
        db::carts::lock_for_customer(&mut tx, customer_id).await?;
        tx.commit().await?;

        let lines = db::carts::view(&self.pool, customer_id).await?;
        Ok(CartView::from_lines(lines)?)
    }

    /// Price is captured from the catalog at add time.
    pub async fn add(&self, customer_id: Uuid, request: CartLineRequest) -> AppResult<CartView> {
        let mut tx = self.pool.begin().await?;

        let book = db::books::find(&mut *tx, request.book_id)
            .await?
            .ok_or_else(|| AppError::not_found("Book not found"))?;
        book.ensure_purchasable()?;

        let mut cart = db::carts::lock_for_customer(&mut tx, customer_id).await?;
        cart.add(book.id, request.quantity, book.price)?;
        db::carts::save(&mut tx, &cart).await?;
        tx.commit().await?;

        tracing::debug!(customer_id = %customer_id, book_id = %book.id, quantity = request.quantity, "Added to cart");
        self.view(customer_id).await
    }

    /// Set a line's quantity; zero removes it.
    pub async fn update(&self, customer_id: Uuid, request: CartLineRequest) -> AppResult<CartView> {
        let mut tx = self.pool.begin().await?;
        let mut cart = db::carts::lock_for_customer(&mut tx, customer_id).await?;
        cart.set_quantity(request.book_id, request.quantity)?;
        db::carts::save(&mut tx, &cart).await?;
        tx.commit().await?;
        self.view(customer_id).await
    }

    pub async fn remove(&self, customer_id: Uuid, book_id: Uuid) -> AppResult<CartView> {
        let mut tx = self.pool.begin().await?;
        let mut cart = db::carts::lock_for_customer(&mut tx, customer_id).await?;
        cart.remove(book_id)?;
        db::carts::save(&mut tx, &cart).await?;
        tx.commit().await?;
        self.view(customer_id).await
    }

    pub async fn clear(&self, customer_id: Uuid) -> AppResult<CartView> {
        let mut tx = self.pool.begin().await?;
        let cart = db::carts::lock_for_customer(&mut tx, customer_id).await?;
        db::carts::clear(&mut tx, cart.id).await?;
        tx.commit().await?;
        self.view(customer_id).await
    }

    /// Fold guest items into the stored cart, summing quantities. Books that
    /// no longer exist or cannot be bought are skipped.
    pub async fn merge(&self, customer_id: Uuid, request: MergeRequest) -> AppResult<CartView> {
        let mut tx = self.pool.begin().await?;
        let mut cart = db::carts::lock_for_customer(&mut tx, customer_id).await?;

        let mut guest_items = Vec::with_capacity(request.items.len());
        for line in request.items {
            match db::books::find(&mut *tx, line.book_id).await? {
                Some(book) if book.is_published() => guest_items.push(CartItem {
                    book_id: book.id,
                    quantity: line.quantity,
                    unit_price: book.price,
                }),
                _ => tracing::debug!(book_id = %line.book_id, "Skipping unavailable guest cart item"),
            }
        }

        let merged = guest_items.len();
        cart.merge(guest_items)?;
        db::carts::save(&mut tx, &cart).await?;
        tx.commit().await?;

        tracing::debug!(customer_id = %customer_id, merged, "Merged guest cart");
        self.view(customer_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn line(price: i64, quantity: i32) -> CartLineView {
        CartLineView {
            book_id: Uuid::new_v4(),
            title: "Ibong Adarna".into(),
            author_name: "Anonymous".into(),
            cover_image_url: None,
            quantity,
            unit_price: Money::from_cents(price),
            current_price: Money::from_cents(price + 1_000),
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_total_uses_price_at_add() {
        let view = CartView::from_lines(vec![line(10_000, 2), line(5_050, 1)]).unwrap();
        assert_eq!(view.total, Money::from_cents(25_050));
        assert_eq!(view.item_count, 3);
    }

    #[test]
    fn test_quantity_defaults_to_one() {
        let request: CartLineRequest =
            serde_json::from_str(r#"{"book_id":"0190b4a4-7d2e-7c1b-9f00-000000000001"}"#).unwrap();
        assert_eq!(request.quantity, 1);
    }
}
