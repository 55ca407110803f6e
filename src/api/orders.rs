use actix_web::{http::header, web, HttpResponse};
use anyhow::Context;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::orders::{CancelRequest, CheckoutRequest, OrderListQuery};

use super::{created, ok, AppState, AuthUser};

pub(super) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::post().to(checkout))
        .route("", web::get().to(list))
        .route("/my-orders", web::get().to(my_orders))
        .route("/library", web::get().to(library))
        .route("/{id}", web::get().to(get))
        .route("/{id}/history", web::get().to(history))
        .route("/{id}/cancel", web::put().to(cancel))
        .route("/{id}/access", web::post().to(grant_access))
        .route("/{id}/download/{book_id}", web::get().to(download_link))
        .route("/{id}/books/{book_id}/file", web::get().to(book_file));
}

async fn checkout(
    state: web::Data<AppState>,
    auth: AuthUser,
    body: web::Json<CheckoutRequest>,
) -> AppResult<HttpResponse> {
    Ok(created(state.orders.checkout(&auth.principal, body.into_inner()).await?))
}

async fn list(state: web::Data<AppState>, auth: AuthUser, query: web::Query<OrderListQuery>) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    Ok(ok(state.orders.list(query.into_inner()).await?))
}

async fn my_orders(state: web::Data<AppState>, auth: AuthUser) -> AppResult<HttpResponse> {
    Ok(ok(state.orders.my_orders(&auth.principal).await?))
}

async fn library(state: web::Data<AppState>, auth: AuthUser) -> AppResult<HttpResponse> {
    Ok(ok(state.orders.library(&auth.principal).await?))
}

async fn get(state: web::Data<AppState>, auth: AuthUser, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
    Ok(ok(state.orders.get(&auth.principal, path.into_inner()).await?))
}

async fn history(state: web::Data<AppState>, auth: AuthUser, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
    Ok(ok(state.orders.history(&auth.principal, path.into_inner()).await?))
}

async fn cancel(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<Uuid>,
    body: Option<web::Json<CancelRequest>>,
) -> AppResult<HttpResponse> {
    let request = body
        .map(web::Json::into_inner)
        .unwrap_or(CancelRequest { reason: None });
    Ok(ok(state.orders.cancel(&auth.principal, path.into_inner(), request).await?))
}

async fn grant_access(state: web::Data<AppState>, auth: AuthUser, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
    let admin = auth.require_admin()?;
    Ok(ok(state.orders.grant_access(admin, path.into_inner()).await?))
}

async fn download_link(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<(Uuid, Uuid)>,
) -> AppResult<HttpResponse> {
    let (order_id, book_id) = path.into_inner();
    Ok(ok(state.orders.download_link(&auth.principal, order_id, book_id).await?))
}

async fn book_file(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<(Uuid, Uuid)>,
) -> AppResult<HttpResponse> {
    let (order_id, book_id) = path.into_inner();
    let file = state.orders.book_file(&auth.principal, order_id, book_id).await?;
    let bytes = tokio::fs::read(&file.path)
        .await
        .with_context(|| format!("Failed to read book file {}", file.path.display()))?;

    tracing::info!(order_id = %order_id, book_id = %book_id, size = bytes.len(), "📥 Book downloaded");
    Ok(HttpResponse::Ok()
        .content_type(book_mime(&file.file_name))
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.file_name),
        ))
        .body(bytes))
}

fn book_mime(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next() {
        Some("epub") => "application/epub+zip",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}
