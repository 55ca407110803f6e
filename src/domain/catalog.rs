use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::money::Money;

// ============================================================================
// Catalog - books owned by publishers
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),

    #[error("Price cannot be negative")]
    NegativePrice,

    #[error("Rating must be between 0 and 5 (got {0})")]
    InvalidRating(f64),

    #[error("Book {0} has no uploaded file yet and cannot be purchased")]
    NotPublished(Uuid),

    #[error("Invalid {0} range: minimum is greater than maximum")]
    InvalidRange(&'static str),
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Book {
    pub id: Uuid,
    pub publisher_id: Uuid,
    pub author_name: String,
    pub title: String,
    pub category: String,
    pub publication_date: NaiveDate,
    #[sqlx(rename = "price_cents", try_from = "i64")]
    pub price: Money,
    pub keywords: Vec<String>,
    pub description: String,
    pub rating: f64,
    pub sales_count: i64,
    pub view_count: i64,
    #[serde(skip_serializing)]
    pub file_path: Option<String>,
    pub cover_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// A book becomes purchasable once its file has been uploaded.
    pub fn is_published(&self) -> bool {
        self.file_path.is_some()
    }

    pub fn ensure_purchasable(&self) -> Result<(), CatalogError> {
        if !self.is_published() {
            return Err(CatalogError::NotPublished(self.id));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBook {
    pub author_name: String,
    pub title: String,
    pub category: String,
    pub publication_date: NaiveDate,
    pub price: Money,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl NewBook {
    pub fn validate(mut self) -> Result<Self, CatalogError> {
        self.author_name = required("author name", &self.author_name)?;
        self.title = required("title", &self.title)?;
        self.category = required("category", &self.category)?;
        if self.price.is_negative() {
            return Err(CatalogError::NegativePrice);
        }
        self.keywords = normalize_keywords(self.keywords);
        self.description = self.description.trim().to_string();
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookUpdate {
    pub author_name: Option<String>,
    pub title: Option<String>,
    pub category: Option<String>,
    pub publication_date: Option<NaiveDate>,
    pub price: Option<Money>,
    pub keywords: Option<Vec<String>>,
    pub description: Option<String>,
}

impl BookUpdate {
    /// Apply onto an existing book, validating only the supplied fields.
    pub fn apply_to(self, book: &mut Book) -> Result<(), CatalogError> {
        if let Some(author) = self.author_name {
            book.author_name = required("author name", &author)?;
        }
        if let Some(title) = self.title {
            book.title = required("title", &title)?;
        }
        if let Some(category) = self.category {
            book.category = required("category", &category)?;
        }
        if let Some(date) = self.publication_date {
            book.publication_date = date;
        }
        if let Some(price) = self.price {
            if price.is_negative() {
                return Err(CatalogError::NegativePrice);
            }
            book.price = price;
        }
        if let Some(keywords) = self.keywords {
            book.keywords = normalize_keywords(keywords);
        }
        if let Some(description) = self.description {
            book.description = description.trim().to_string();
        }
        Ok(())
    }
}

/// Curated listings on the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shelf {
    NewlyReleased,
    TopSelling,
    MostPopular,
}

impl Shelf {
    pub const DEFAULT_LIMIT: i64 = 4;

    pub fn order_by(&self) -> &'static str {
        match self {
            Shelf::NewlyReleased => "publication_date DESC, created_at DESC",
            Shelf::TopSelling => "sales_count DESC, rating DESC",
            Shelf::MostPopular => "view_count DESC, rating DESC",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilter {
    /// Matches title or author, case-insensitive.
    pub q: Option<String>,
    pub author: Option<String>,
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
    pub published_from: Option<NaiveDate>,
    pub published_to: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl SearchFilter {
    pub const MAX_LIMIT: i64 = 100;

    pub fn validate(mut self) -> Result<Self, CatalogError> {
        self.q = non_blank(self.q);
        self.author = non_blank(self.author);
        self.keyword = non_blank(self.keyword).map(|k| k.to_lowercase());
        self.category = non_blank(self.category);

        for rating in [self.min_rating, self.max_rating].into_iter().flatten() {
            if !(0.0..=5.0).contains(&rating) {
                return Err(CatalogError::InvalidRating(rating));
            }
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(CatalogError::InvalidRange("price"));
            }
        }
        if let (Some(min), Some(max)) = (self.min_rating, self.max_rating) {
            if min > max {
                return Err(CatalogError::InvalidRange("rating"));
            }
        }
        if let (Some(from), Some(to)) = (self.published_from, self.published_to) {
            if from > to {
                return Err(CatalogError::InvalidRange("publication date"));
            }
        }

        self.limit = Some(self.limit.unwrap_or(20).clamp(1, Self::MAX_LIMIT));
        self.offset = Some(self.offset.unwrap_or(0).max(0));
        Ok(self)
    }
}

fn required(field: &'static str, value: &str) -> Result<String, CatalogError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::EmptyField(field));
    }
    Ok(trimmed.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_keywords(keywords: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = keywords
        .into_iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_book() -> NewBook {
        NewBook {
            author_name: " Jose Rizal ".into(),
            title: "El Filibusterismo".into(),
            category: "Classics".into(),
            publication_date: NaiveDate::from_ymd_opt(1891, 9, 18).unwrap(),
            price: Money::from_cents(34_900),
            keywords: vec!["Revolution".into(), "revolution ".into(), "".into()],
            description: "  Sequel to Noli.  ".into(),
        }
    }

    fn book() -> Book {
        let now = Utc::now();
        Book {
            id: Uuid::new_v4(),
            publisher_id: Uuid::new_v4(),
            author_name: "Jose Rizal".into(),
            title: "Noli Me Tangere".into(),
            category: "Classics".into(),
            publication_date: NaiveDate::from_ymd_opt(1887, 3, 21).unwrap(),
            price: Money::from_cents(29_900),
            keywords: vec![],
            description: String::new(),
            rating: 4.8,
            sales_count: 0,
            view_count: 0,
            file_path: None,
            cover_image_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_new_book_normalized() {
        let book = new_book().validate().unwrap();
        assert_eq!(book.author_name, "Jose Rizal");
        assert_eq!(book.keywords, vec!["revolution".to_string()]);
        assert_eq!(book.description, "Sequel to Noli.");
    }

    #[test]
    fn test_new_book_rejects_blank_title_and_negative_price() {
        let mut b = new_book();
        b.title = " ".into();
        assert!(matches!(b.validate(), Err(CatalogError::EmptyField("title"))));

        let mut b = new_book();
        b.price = Money::from_cents(-1);
        assert!(matches!(b.validate(), Err(CatalogError::NegativePrice)));
    }

    #[test]
    fn test_unpublished_book_not_purchasable() {
        let mut b = book();
        assert!(matches!(b.ensure_purchasable(), Err(CatalogError::NotPublished(_))));
        b.file_path = Some("books/1.pdf".into());
        assert!(b.ensure_purchasable().is_ok());
    }

    #[test]
    fn test_file_path_never_serialized() {
        let mut b = book();
        b.file_path = Some("books/secret.pdf".into());
        let json = serde_json::to_value(&b).unwrap();
        assert!(json.get("file_path").is_none());
        assert_eq!(json["price"], 29_900);
    }

    #[test]
    fn test_update_applies_only_given_fields() {
        let mut b = book();
        BookUpdate {
            price: Some(Money::from_cents(19_900)),
            keywords: Some(vec!["Classic".into()]),
            ..Default::default()
        }
        .apply_to(&mut b)
        .unwrap();

        assert_eq!(b.price, Money::from_cents(19_900));
        assert_eq!(b.keywords, vec!["classic".to_string()]);
        assert_eq!(b.title, "Noli Me Tangere");
    }

    #[test]
    fn test_search_filter_ranges() {
        let filter = SearchFilter {
            min_price: Some(Money::from_cents(500)),
            max_price: Some(Money::from_cents(100)),
            ..Default::default()
        };
        assert!(matches!(filter.validate(), Err(CatalogError::InvalidRange("price"))));

        let filter = SearchFilter { min_rating: Some(6.0), ..Default::default() };
        assert!(matches!(filter.validate(), Err(CatalogError::InvalidRating(_))));
    }

    #[test]
    fn test_search_filter_defaults_and_blank_terms() {
        let filter = SearchFilter {
            q: Some("   ".into()),
            keyword: Some(" Romance ".into()),
            limit: Some(1_000),
            ..Default::default()
        }
        .validate()
        .unwrap();

        assert_eq!(filter.q, None);
        assert_eq!(filter.keyword.as_deref(), Some("romance"));
        assert_eq!(filter.limit, Some(SearchFilter::MAX_LIMIT));
        assert_eq!(filter.offset, Some(0));
    }
}
