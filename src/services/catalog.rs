use std::sync::Arc;

use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::db::sessions::SessionPrincipal;
use crate::domain::catalog::{Book, BookUpdate, NewBook, SearchFilter, Shelf};
use crate::error::{AppError, AppResult};
use crate::storage::{UploadKind, UploadStore};

// ============================================================================
// Catalog Service - book metadata, files and listings
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateBook {
    #[serde(flatten)]
    pub book: NewBook,
    /// Admins create books on behalf of a publisher.
    pub publisher_id: Option<Uuid>,
}

pub struct CatalogService {
    pool: PgPool,
    uploads: Arc<UploadStore>,
}

impl CatalogService {
    pub fn new(pool: PgPool, uploads: Arc<UploadStore>) -> Self {
        Self { pool, uploads }
    }

    pub async fn create(&self, actor: &SessionPrincipal, request: CreateBook) -> AppResult<Book> {
        let publisher_id = match (actor.publisher_id, request.publisher_id) {
            (_, Some(on_behalf)) if actor.is_admin() => on_behalf,
            (Some(own), _) => own,
            (None, _) if actor.is_admin() => {
                return Err(AppError::bad_request("publisher_id is required when an admin creates a book"))
            }
            (None, _) => return Err(AppError::forbidden("Only publishers can create books")),
        };
        if db::publishers::find(&self.pool, publisher_id).await?.is_none() {
            return Err(AppError::not_found("Publisher not found"));
        }

        let book = request.book.validate()?;
        let book = db::books::insert(&self.pool, publisher_id, &book).await?;
        tracing::info!(book_id = %book.id, publisher_id = %publisher_id, title = %book.title, "📖 Book created");
        Ok(book)
    }

    /// Public detail view; every fetch counts as a view.
    pub async fn view(&self, book_id: Uuid) -> AppResult<Book> {
        db::books::record_view(&self.pool, book_id)
            .await?
            .ok_or_else(|| AppError::not_found("Book not found"))
    }

    pub async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<Book>> {
        Ok(db::books::list_published(&self.pool, limit.clamp(1, SearchFilter::MAX_LIMIT), offset.max(0)).await?)
    }

    pub async fn mine(&self, actor: &SessionPrincipal) -> AppResult<Vec<Book>> {
        let publisher_id = actor
            .publisher_id
            .ok_or_else(|| AppError::forbidden("Only publishers have their own books"))?;
        Ok(db::books::by_publisher(&self.pool, publisher_id).await?)
    }

    pub async fn shelf(&self, shelf: Shelf, limit: Option<i64>) -> AppResult<Vec<Book>> {
        let limit = limit.unwrap_or(Shelf::DEFAULT_LIMIT).clamp(1, SearchFilter::MAX_LIMIT);
        Ok(db::books::shelf(&self.pool, shelf, limit).await?)
    }

    pub async fn categories(&self) -> AppResult<Vec<String>> {
        Ok(db::books::categories(&self.pool).await?)
    }

    pub async fn by_category(&self, category: &str) -> AppResult<Vec<Book>> {
        Ok(db::books::by_category(&self.pool, category).await?)
    }

    pub async fn search(&self, filter: SearchFilter) -> AppResult<Vec<Book>> {
        let filter = filter.validate()?;
        Ok(db::books::search(&self.pool, &filter).await?)
    }

    pub async fn update(&self, actor: &SessionPrincipal, book_id: Uuid, update: BookUpdate) -> AppResult<Book> {
        let mut book = self.managed_book(actor, book_id).await?;
        update.apply_to(&mut book)?;
        Ok(db::books::update(&self.pool, &book).await?)
    }

    /// Removes the row and both stored files. Past orders keep their snapshot.
    pub async fn delete(&self, actor: &SessionPrincipal, book_id: Uuid) -> AppResult<()> {
        let book = self.managed_book(actor, book_id).await?;
        if !db::books::delete(&self.pool, book_id).await? {
            return Err(AppError::not_found("Book not found"));
        }
        if let Some(path) = &book.file_path {
            self.uploads.remove(path).await;
        }
        self.remove_cover(&book).await;

        tracing::info!(book_id = %book_id, actor = %actor.user_id, "🗑️ Book deleted");
        Ok(())
    }

    /// Store the book file. A book with a file is published.
    pub async fn upload_file(
        &self,
        actor: &SessionPrincipal,
        book_id: Uuid,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> AppResult<Book> {
        let previous = self.managed_book(actor, book_id).await?;
        let stored = self.uploads.save(UploadKind::BookFile, content_type, bytes).await?;

        let book = match db::books::set_file(&self.pool, book_id, &stored.relative_path).await {
            Ok(book) => book,
            Err(e) => {
                self.uploads.remove(&stored.relative_path).await;
                return Err(e.into());
            }
        };
        if let Some(old) = previous.file_path.as_deref() {
            self.uploads.remove(old).await;
        }

        tracing::info!(book_id = %book_id, size = stored.size, "📤 Book file uploaded");
        Ok(book)
    }

    pub async fn upload_cover(
        &self,
        actor: &SessionPrincipal,
        book_id: Uuid,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> AppResult<Book> {
        let previous = self.managed_book(actor, book_id).await?;
        let stored = self.uploads.save(UploadKind::Cover, content_type, bytes).await?;
        let url = stored
            .public_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Cover stored without a public URL"))?;

        let book = match db::books::set_cover(&self.pool, book_id, &url).await {
            Ok(book) => book,
            Err(e) => {
                self.uploads.remove(&stored.relative_path).await;
                return Err(e.into());
            }
        };
        self.remove_cover(&previous).await;
        Ok(book)
    }

    /// Load a book the actor may change: its publisher or any admin.
    async fn managed_book(&self, actor: &SessionPrincipal, book_id: Uuid) -> AppResult<Book> {
        let book = db::books::find(&self.pool, book_id)
            .await?
            .ok_or_else(|| AppError::not_found("Book not found"))?;
        ensure_can_manage(actor, &book)?;
        Ok(book)
    }

    async fn remove_cover(&self, book: &Book) {
        if let Some(relative) = book
            .cover_image_url
            .as_deref()
            .and_then(|url| self.uploads.relative_from_url(url))
        {
            self.uploads.remove(&relative).await;
        }
    }
}

fn ensure_can_manage(actor: &SessionPrincipal, book: &Book) -> AppResult<()> {
    if actor.is_admin() || actor.publisher_id == Some(book.publisher_id) {
        Ok(())
    } else {
        Err(AppError::forbidden("Only the book's publisher or an admin can change it"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    use crate::domain::money::Money;

    fn principal(publisher_id: Option<Uuid>, admin: bool) -> SessionPrincipal {
        SessionPrincipal {
            user_id: Uuid::new_v4(),
            email: "someone@example.com".into(),
            roles: if admin { vec!["admin".into()] } else { vec!["publisher".into()] },
            is_active: true,
            customer_id: None,
            publisher_id,
            admin_id: admin.then(Uuid::new_v4),
            admin_permissions: admin.then(Vec::new),
        }
    }

    fn book(publisher_id: Uuid) -> Book {
        Book {
            id: Uuid::new_v4(),
            publisher_id,
            author_name: "Lualhati Bautista".into(),
            title: "Dekada '70".into(),
            category: "Fiction".into(),
            publication_date: NaiveDate::from_ymd_opt(1983, 1, 1).unwrap(),
            price: Money::from_cents(39_900),
            keywords: vec![],
            description: String::new(),
            rating: 0.0,
            sales_count: 0,
            view_count: 0,
            file_path: None,
            cover_image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_owner_and_admin_can_manage() {
        let publisher_id = Uuid::new_v4();
        let book = book(publisher_id);

        assert!(ensure_can_manage(&principal(Some(publisher_id), false), &book).is_ok());
        assert!(ensure_can_manage(&principal(None, true), &book).is_ok());
        assert!(matches!(
            ensure_can_manage(&principal(Some(Uuid::new_v4()), false), &book),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_create_request_flattens_book_fields() {
        let request: CreateBook = serde_json::from_value(serde_json::json!({
            "author_name": "Amado V. Hernandez",
            "title": "Mga Ibong Mandaragit",
            "category": "Fiction",
            "publication_date": "1969-01-01",
            "price": 45000,
            "publisher_id": "0190b4a4-7d2e-7c1b-9f00-000000000001"
        }))
        .unwrap();

        assert_eq!(request.book.price, Money::from_cents(45_000));
        assert!(request.publisher_id.is_some());
    }
}
