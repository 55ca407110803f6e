use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::cart::{CartLineRequest, MergeRequest};

use super::{ok, AppState, AuthUser};

#[derive(Debug, Deserialize)]
struct RemoveLine {
    book_id: Uuid,
}

pub(super) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(view))
        .route("/add", web::post().to(add))
        .route("/update", web::post().to(update))
        .route("/remove", web::post().to(remove))
        .route("/clear", web::post().to(clear))
        .route("/merge", web::post().to(merge));
}

async fn view(state: web::Data<AppState>, auth: AuthUser) -> AppResult<HttpResponse> {
    let customer_id = auth.require_customer()?;
    Ok(ok(state.carts.view(customer_id).await?))
}

async fn add(state: web::Data<AppState>, auth: AuthUser, body: web::Json<CartLineRequest>) -> AppResult<HttpResponse> {
    let customer_id = auth.require_customer()?;
    Ok(ok(state.carts.add(customer_id, body.into_inner()).await?))
}

async fn update(
    state: web::Data<AppState>,
    auth: AuthUser,
    body: web::Json<CartLineRequest>,
) -> AppResult<HttpResponse> {
    let customer_id = auth.require_customer()?;
    Ok(ok(state.carts.update(customer_id, body.into_inner()).await?))
}

async fn remove(state: web::Data<AppState>, auth: AuthUser, body: web::Json<RemoveLine>) -> AppResult<HttpResponse> {
    let customer_id = auth.require_customer()?;
    Ok(ok(state.carts.remove(customer_id, body.book_id).await?))
}

async fn clear(state: web::Data<AppState>, auth: AuthUser) -> AppResult<HttpResponse> {
    let customer_id = auth.require_customer()?;
    Ok(ok(state.carts.clear(customer_id).await?))
}

async fn merge(state: web::Data<AppState>, auth: AuthUser, body: web::Json<MergeRequest>) -> AppResult<HttpResponse> {
    let customer_id = auth.require_customer()?;
    Ok(ok(state.carts.merge(customer_id, body.into_inner()).await?))
}
