use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::domain::catalog::{Book, NewBook, SearchFilter, Shelf};

// ============================================================================
// Books
// ============================================================================

const COLUMNS: [&str; 16] = [
    "id",
    "publisher_id",
    "author_name",
    "title",
    "category",
    "publication_date",
    "price_cents",
    "keywords",
    "description",
    "rating",
    "sales_count",
    "view_count",
    "file_path",
    "cover_image_url",
    "created_at",
    "updated_at",
];

/// Book column list, optionally qualified with a table alias.
pub(crate) fn book_columns(alias: &str) -> String {
    COLUMNS
        .iter()
        .map(|c| if alias.is_empty() { c.to_string() } else { format!("{alias}.{c}") })
        .collect::<Vec<_>>()
        .join(", ")
}

pub async fn insert(pool: &PgPool, publisher_id: Uuid, book: &NewBook) -> sqlx::Result<Book> {
    sqlx::query_as(&format!(
        "INSERT INTO books (id, publisher_id, author_name, title, category,
                            publication_date, price_cents, keywords, description)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING {}",
        book_columns("")
    ))
    .bind(Uuid::now_v7())
    .bind(publisher_id)
    .bind(&book.author_name)
    .bind(&book.title)
    .bind(&book.category)
    .bind(book.publication_date)
    .bind(book.price.cents())
    .bind(&book.keywords)
    .bind(&book.description)
    .fetch_one(pool)
    .await
}

pub async fn find<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> sqlx::Result<Option<Book>> {
    sqlx::query_as(&format!("SELECT {} FROM books WHERE id = $1", book_columns("")))
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Fetch a book for display, counting the view.
pub async fn record_view(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<Book>> {
    sqlx::query_as(&format!(
        "UPDATE books SET view_count = view_count + 1 WHERE id = $1 RETURNING {}",
        book_columns("")
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Persist the editable fields of a book.
pub async fn update(pool: &PgPool, book: &Book) -> sqlx::Result<Book> {
    sqlx::query_as(&format!(
        "UPDATE books SET
            author_name = $2, title = $3, category = $4, publication_date = $5,
            price_cents = $6, keywords = $7, description = $8, updated_at = NOW()
         WHERE id = $1
         RETURNING {}",
        book_columns("")
    ))
    .bind(book.id)
    .bind(&book.author_name)
    .bind(&book.title)
    .bind(&book.category)
    .bind(book.publication_date)
    .bind(book.price.cents())
    .bind(&book.keywords)
    .bind(&book.description)
    .fetch_one(pool)
    .await
}

pub async fn set_file(pool: &PgPool, id: Uuid, file_path: &str) -> sqlx::Result<Book> {
    sqlx::query_as(&format!(
        "UPDATE books SET file_path = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
        book_columns("")
    ))
    .bind(id)
    .bind(file_path)
    .fetch_one(pool)
    .await
}

pub async fn set_cover(pool: &PgPool, id: Uuid, cover_image_url: &str) -> sqlx::Result<Book> {
    sqlx::query_as(&format!(
        "UPDATE books SET cover_image_url = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
        book_columns("")
    ))
    .bind(id)
    .bind(cover_image_url)
    .fetch_one(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM books WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Published books, newest first.
pub async fn list_published(pool: &PgPool, limit: i64, offset: i64) -> sqlx::Result<Vec<Book>> {
    sqlx::query_as(&format!(
        "SELECT {} FROM books WHERE file_path IS NOT NULL
         ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        book_columns("")
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn shelf(pool: &PgPool, shelf: Shelf, limit: i64) -> sqlx::Result<Vec<Book>> {
    sqlx::query_as(&format!(
        "SELECT {} FROM books WHERE file_path IS NOT NULL ORDER BY {} LIMIT $1",
        book_columns(""),
        shelf.order_by()
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn categories(pool: &PgPool) -> sqlx::Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT category FROM books WHERE file_path IS NOT NULL ORDER BY category",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(c,)| c).collect())
}

pub async fn by_category(pool: &PgPool, category: &str) -> sqlx::Result<Vec<Book>> {
    sqlx::query_as(&format!(
        "SELECT {} FROM books WHERE file_path IS NOT NULL AND LOWER(category) = LOWER($1)
         ORDER BY title",
        book_columns("")
    ))
    .bind(category)
    .fetch_all(pool)
    .await
}

/// All of a publisher's books, published or not.
pub async fn by_publisher(pool: &PgPool, publisher_id: Uuid) -> sqlx::Result<Vec<Book>> {
    sqlx::query_as(&format!(
        "SELECT {} FROM books WHERE publisher_id = $1 ORDER BY created_at DESC",
        book_columns("")
    ))
    .bind(publisher_id)
    .fetch_all(pool)
    .await
}

pub async fn search(pool: &PgPool, filter: &SearchFilter) -> sqlx::Result<Vec<Book>> {
    let mut query = search_query(filter);
    query.build_query_as::<Book>().fetch_all(pool).await
}

fn search_query(filter: &SearchFilter) -> QueryBuilder<'_, Postgres> {
    let mut query = QueryBuilder::new(format!(
        "SELECT {} FROM books WHERE file_path IS NOT NULL",
        book_columns("")
    ));

    if let Some(q) = &filter.q {
        let pattern = format!("%{}%", escape_like(q));
        query
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR author_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(author) = &filter.author {
        query
            .push(" AND author_name ILIKE ")
            .push_bind(format!("%{}%", escape_like(author)));
    }
    if let Some(keyword) = &filter.keyword {
        query.push(" AND ").push_bind(keyword.clone()).push(" = ANY (keywords)");
    }
    if let Some(category) = &filter.category {
        query.push(" AND LOWER(category) = LOWER(").push_bind(category.clone()).push(")");
    }
    if let Some(min) = filter.min_price {
        query.push(" AND price_cents >= ").push_bind(min.cents());
    }
    if let Some(max) = filter.max_price {
        query.push(" AND price_cents <= ").push_bind(max.cents());
    }
    if let Some(min) = filter.min_rating {
        query.push(" AND rating >= ").push_bind(min);
    }
    if let Some(max) = filter.max_rating {
        query.push(" AND rating <= ").push_bind(max);
    }
    if let Some(from) = filter.published_from {
        query.push(" AND publication_date >= ").push_bind(from);
    }
    if let Some(to) = filter.published_to {
        query.push(" AND publication_date <= ").push_bind(to);
    }

    query
        .push(" ORDER BY rating DESC, title ASC LIMIT ")
        .push_bind(filter.limit.unwrap_or(20))
        .push(" OFFSET ")
        .push_bind(filter.offset.unwrap_or(0));

    query
}

pub(super) fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
