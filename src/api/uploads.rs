use actix_web::{http::header, web, HttpResponse};

use crate::error::{AppError, AppResult};
use crate::storage::UploadKind;

use super::AppState;

// Only covers and avatars are served here. Book files and payment proofs go
// through the authorized order and payment routes.
pub(super) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/covers/{file}", web::get().to(cover))
        .route("/avatars/{file}", web::get().to(avatar));
}

async fn cover(state: web::Data<AppState>, path: web::Path<String>) -> AppResult<HttpResponse> {
    serve(&state, UploadKind::Cover, &path.into_inner()).await
}

async fn avatar(state: web::Data<AppState>, path: web::Path<String>) -> AppResult<HttpResponse> {
    serve(&state, UploadKind::Avatar, &path.into_inner()).await
}

async fn serve(state: &AppState, kind: UploadKind, file_name: &str) -> AppResult<HttpResponse> {
    let path = state
        .uploads
        .public_file(kind, file_name)
        .map_err(|_| AppError::not_found("File not found"))?;

    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(HttpResponse::Ok()
            .content_type(image_mime(file_name))
            .insert_header((header::CACHE_CONTROL, "public, max-age=86400"))
            .body(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::not_found("File not found")),
        Err(e) => Err(anyhow::Error::new(e).context("Failed to read public upload").into()),
    }
}

fn image_mime(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
