use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::db::orders::LibraryEntry;
use crate::db::sessions::SessionPrincipal;
use crate::domain::order::{
    CommandContext, OrderAggregate, OrderCommand, OrderCommandHandler, OrderEvent, OrderStatus, PaymentMethod,
};
use crate::error::{AppError, AppResult};
use crate::event_sourcing::EventEnvelope;
use crate::storage::UploadStore;

// ============================================================================
// Order Service - checkout, reads and customer/admin order commands
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OrderHistory {
    pub events: Vec<EventEnvelope<OrderEvent>>,
    /// State rebuilt from the events alone.
    pub replayed: OrderAggregate,
}

#[derive(Debug, Serialize)]
pub struct DownloadLink {
    pub order_id: Uuid,
    pub book_id: Uuid,
    pub title: String,
    pub url: String,
}

/// A book file ready to be streamed to its buyer.
pub struct BookFile {
    pub path: PathBuf,
    pub file_name: String,
}

pub struct OrderService {
    pool: PgPool,
    handler: Arc<OrderCommandHandler>,
    uploads: Arc<UploadStore>,
    public_base_url: String,
}

impl OrderService {
    pub fn new(
        pool: PgPool,
        handler: Arc<OrderCommandHandler>,
        uploads: Arc<UploadStore>,
        public_base_url: String,
    ) -> Self {
        Self {
            pool,
            handler,
            uploads,
            public_base_url,
        }
    }

    /// Items and total come from the stored cart; nothing priced by the client is used.
    pub async fn checkout(&self, actor: &SessionPrincipal, request: CheckoutRequest) -> AppResult<OrderAggregate> {
        let customer_id = require_customer(actor)?;
        let ctx = CommandContext::new(Some(actor.user_id), "checkout");
        self.handler.place(customer_id, request.payment_method, &ctx).await
    }

    pub async fn my_orders(&self, actor: &SessionPrincipal) -> AppResult<Vec<OrderAggregate>> {
        let customer_id = require_customer(actor)?;
        Ok(db::orders::by_customer(&self.pool, customer_id).await?)
    }

    pub async fn library(&self, actor: &SessionPrincipal) -> AppResult<Vec<LibraryEntry>> {
        let customer_id = require_customer(actor)?;
        Ok(db::orders::library(&self.pool, customer_id).await?)
    }

    pub async fn list(&self, query: OrderListQuery) -> AppResult<Vec<OrderAggregate>> {
        let limit = query.limit.unwrap_or(50).clamp(1, 200);
        let offset = query.offset.unwrap_or(0).max(0);
        Ok(db::orders::list(&self.pool, query.status, limit, offset).await?)
    }

    pub async fn get(&self, actor: &SessionPrincipal, order_id: Uuid) -> AppResult<OrderAggregate> {
        let order = self.load(order_id).await?;
        ensure_can_view(actor, &order)?;
        Ok(order)
    }

    pub async fn history(&self, actor: &SessionPrincipal, order_id: Uuid) -> AppResult<OrderHistory> {
        self.get(actor, order_id).await?;
        let (events, replayed) = self.handler.history(order_id).await?;
        Ok(OrderHistory { events, replayed })
    }

    pub async fn cancel(
        &self,
        actor: &SessionPrincipal,
        order_id: Uuid,
        request: CancelRequest,
    ) -> AppResult<OrderAggregate> {
        let order = self.load(order_id).await?;
        ensure_can_view(actor, &order)?;

        let reason = request
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "Cancelled by customer".to_string());
        let command = OrderCommand::Cancel {
            reason,
            cancelled_by: Some(actor.user_id),
        };
        let ctx = CommandContext::new(Some(actor.user_id), "api");
        Ok(self.handler.handle(order_id, command, &ctx).await?.order)
    }

    pub async fn grant_access(&self, admin: &SessionPrincipal, order_id: Uuid) -> AppResult<OrderAggregate> {
        let command = OrderCommand::GrantAccess {
            granted_by: Some(admin.user_id),
        };
        let ctx = CommandContext::new(Some(admin.user_id), "admin");
        Ok(self.handler.handle(order_id, command, &ctx).await?.order)
    }

    pub async fn download_link(
        &self,
        actor: &SessionPrincipal,
        order_id: Uuid,
        book_id: Uuid,
    ) -> AppResult<DownloadLink> {
        let (order, title) = self.downloadable(actor, order_id, book_id).await?;
        Ok(DownloadLink {
            order_id: order.id,
            book_id,
            title,
            url: format!(
                "{}/api/order/{}/books/{}/file",
                self.public_base_url, order.id, book_id
            ),
        })
    }

    pub async fn book_file(&self, actor: &SessionPrincipal, order_id: Uuid, book_id: Uuid) -> AppResult<BookFile> {
        self.downloadable(actor, order_id, book_id).await?;

        let book = db::books::find(&self.pool, book_id)
            .await?
            .ok_or_else(|| AppError::not_found("Book is no longer available"))?;
        let relative = book
            .file_path
            .ok_or_else(|| AppError::not_found("Book has no file"))?;
        let path = self.uploads.resolve(&relative)?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("pdf")
            .to_string();
        Ok(BookFile {
            path,
            file_name: format!("{}.{}", download_name(&book.title), extension),
        })
    }

    /// The order owner's purchased copy, once access has been granted.
    async fn downloadable(
        &self,
        actor: &SessionPrincipal,
        order_id: Uuid,
        book_id: Uuid,
    ) -> AppResult<(OrderAggregate, String)> {
        let order = self.load(order_id).await?;
        if actor.customer_id != Some(order.customer_id) {
            return Err(AppError::forbidden("Only the buyer can download this book"));
        }
        order.ensure_downloadable(book_id)?;

        let title = order
            .items
            .iter()
            .find(|line| line.book_id == book_id)
            .map(|line| line.title.clone())
            .unwrap_or_default();
        Ok((order, title))
    }

    async fn load(&self, order_id: Uuid) -> AppResult<OrderAggregate> {
        db::orders::find(&self.pool, order_id)
            .await?
            .ok_or_else(|| AppError::not_found("Order not found"))
    }
}

pub(crate) fn require_customer(actor: &SessionPrincipal) -> AppResult<Uuid> {
    actor
        .customer_id
        .ok_or_else(|| AppError::forbidden("A customer account is required"))
}

/// Owners see their orders; admins see all of them.
pub(crate) fn ensure_can_view(actor: &SessionPrincipal, order: &OrderAggregate) -> AppResult<()> {
    if actor.is_admin() || actor.customer_id == Some(order.customer_id) {
        Ok(())
    } else {
        Err(AppError::forbidden("Not your order"))
    }
}

/// File name safe for a Content-Disposition header.
fn download_name(title: &str) -> String {
    let name: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let name = name.trim_matches('-');
    if name.is_empty() {
        "book".to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_name_is_header_safe() {
        assert_eq!(download_name("Noli Me Tangere"), "Noli-Me-Tangere");
        assert_eq!(download_name("\"quoted\"; name"), "quoted---name");
        assert_eq!(download_name("ñ"), "book");
    }

    #[test]
    fn test_checkout_request_rejects_unknown_method() {
        assert!(serde_json::from_str::<CheckoutRequest>(r#"{"payment_method":"gcash"}"#).is_ok());
        assert!(serde_json::from_str::<CheckoutRequest>(r#"{"payment_method":"barter"}"#).is_err());
    }
}
