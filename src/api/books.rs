use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::catalog::{BookUpdate, SearchFilter, Shelf};
use crate::error::AppResult;
use crate::services::catalog::CreateBook;

use super::extractors::content_type;
use super::{created, message, ok, AppState, AuthUser};

#[derive(Debug, Deserialize)]
struct Page {
    limit: Option<i64>,
    offset: Option<i64>,
}

// Static segments are registered ahead of `/{id}`.
pub(super) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(list))
        .route("", web::post().to(create))
        .route("/my", web::get().to(mine))
        .route("/categories", web::get().to(categories))
        .route("/category/{category}", web::get().to(by_category))
        .route("/search", web::get().to(search))
        .route("/newly-released", web::get().to(newly_released))
        .route("/top-selling", web::get().to(top_selling))
        .route("/most-popular", web::get().to(most_popular))
        .route("/{id}", web::get().to(view))
        .route("/{id}", web::put().to(update))
        .route("/{id}", web::delete().to(delete))
        .route("/{id}/file", web::put().to(upload_file))
        .route("/{id}/cover", web::put().to(upload_cover));
}

async fn list(state: web::Data<AppState>, page: web::Query<Page>) -> AppResult<HttpResponse> {
    let books = state
        .catalog
        .list(page.limit.unwrap_or(20), page.offset.unwrap_or(0))
        .await?;
    Ok(ok(books))
}

async fn create(state: web::Data<AppState>, auth: AuthUser, body: web::Json<CreateBook>) -> AppResult<HttpResponse> {
    Ok(created(state.catalog.create(&auth.principal, body.into_inner()).await?))
}

async fn mine(state: web::Data<AppState>, auth: AuthUser) -> AppResult<HttpResponse> {
    Ok(ok(state.catalog.mine(&auth.principal).await?))
}

async fn categories(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(ok(state.catalog.categories().await?))
}

async fn by_category(state: web::Data<AppState>, path: web::Path<String>) -> AppResult<HttpResponse> {
    Ok(ok(state.catalog.by_category(&path.into_inner()).await?))
}

async fn search(state: web::Data<AppState>, filter: web::Query<SearchFilter>) -> AppResult<HttpResponse> {
    Ok(ok(state.catalog.search(filter.into_inner()).await?))
}

async fn newly_released(state: web::Data<AppState>, page: web::Query<Page>) -> AppResult<HttpResponse> {
    Ok(ok(state.catalog.shelf(Shelf::NewlyReleased, page.limit).await?))
}

async fn top_selling(state: web::Data<AppState>, page: web::Query<Page>) -> AppResult<HttpResponse> {
    Ok(ok(state.catalog.shelf(Shelf::TopSelling, page.limit).await?))
}

async fn most_popular(state: web::Data<AppState>, page: web::Query<Page>) -> AppResult<HttpResponse> {
    Ok(ok(state.catalog.shelf(Shelf::MostPopular, page.limit).await?))
}

async fn view(state: web::Data<AppState>, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
    Ok(ok(state.catalog.view(path.into_inner()).await?))
}

async fn update(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<Uuid>,
    body: web::Json<BookUpdate>,
) -> AppResult<HttpResponse> {
    let book = state
        .catalog
        .update(&auth.principal, path.into_inner(), body.into_inner())
        .await?;
    Ok(ok(book))
}

async fn delete(state: web::Data<AppState>, auth: AuthUser, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
    state.catalog.delete(&auth.principal, path.into_inner()).await?;
    Ok(message("Book deleted"))
}

async fn upload_file(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<Uuid>,
    req: HttpRequest,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let book = state
        .catalog
        .upload_file(&auth.principal, path.into_inner(), content_type(&req), &body)
        .await?;
    Ok(ok(book))
}

async fn upload_cover(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<Uuid>,
    req: HttpRequest,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let book = state
        .catalog
        .upload_cover(&auth.principal, path.into_inner(), content_type(&req), &body)
        .await?;
    Ok(ok(book))
}
