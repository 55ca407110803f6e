use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::account::Registration;
use crate::error::AppResult;
use crate::services::accounts::{LoginRequest, PasswordChange, ProfileUpdate};

use super::extractors::content_type;
use super::{created, message, ok, AppState, AuthUser};

#[derive(Debug, Deserialize)]
struct EmailCheck {
    email: String,
}

#[derive(Debug, Deserialize)]
struct WishlistAdd {
    book_id: Uuid,
}

pub(super) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/register", web::post().to(register))
        .route("/login", web::post().to(login))
        .route("/logout", web::post().to(logout))
        .route("/validate-token", web::get().to(validate_token))
        .route("/check", web::post().to(check_email))
        .route("/forgot-password", web::post().to(forgot_password))
        .route("/profile", web::get().to(profile))
        .route("/profile", web::put().to(update_profile))
        .route("/password", web::put().to(change_password))
        .route("/avatar", web::put().to(upload_avatar))
        .route("/avatar", web::delete().to(remove_avatar))
        .route("/wishlist", web::get().to(wishlist))
        .route("/wishlist", web::post().to(add_to_wishlist))
        .route("/wishlist/{book_id}", web::delete().to(remove_from_wishlist));
}

async fn register(state: web::Data<AppState>, body: web::Json<Registration>) -> AppResult<HttpResponse> {
    let user = state.accounts.register_customer(body.into_inner()).await?;
    Ok(created(user))
}

async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> AppResult<HttpResponse> {
    Ok(ok(state.accounts.login(body.into_inner()).await?))
}

async fn logout(state: web::Data<AppState>, auth: AuthUser) -> AppResult<HttpResponse> {
    state.accounts.logout(&auth.token_hash).await?;
    Ok(message("Logged out"))
}

async fn validate_token(state: web::Data<AppState>, auth: AuthUser) -> AppResult<HttpResponse> {
    Ok(ok(state.accounts.validate(&auth.principal).await?))
}

async fn check_email(state: web::Data<AppState>, body: web::Json<EmailCheck>) -> AppResult<HttpResponse> {
    let exists = state.accounts.email_registered(&body.email).await?;
    Ok(ok(json!({ "exists": exists })))
}

/// Same answer whether or not the address is registered.
async fn forgot_password(body: web::Json<EmailCheck>) -> HttpResponse {
    tracing::debug!(email = %body.email, "Password reset requested");
    message("If an account exists for that email, reset instructions have been sent")
}

async fn profile(state: web::Data<AppState>, auth: AuthUser) -> AppResult<HttpResponse> {
    Ok(ok(state.accounts.profile(auth.principal.user_id).await?))
}

async fn update_profile(
    state: web::Data<AppState>,
    auth: AuthUser,
    body: web::Json<ProfileUpdate>,
) -> AppResult<HttpResponse> {
    let user = state
        .accounts
        .update_profile(auth.principal.user_id, body.into_inner())
        .await?;
    Ok(ok(user))
}

async fn change_password(
    state: web::Data<AppState>,
    auth: AuthUser,
    body: web::Json<PasswordChange>,
) -> AppResult<HttpResponse> {
    state
        .accounts
        .change_password(auth.principal.user_id, body.into_inner())
        .await?;
    Ok(message("Password updated"))
}

async fn upload_avatar(
    state: web::Data<AppState>,
    auth: AuthUser,
    req: HttpRequest,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let user = state
        .accounts
        .set_avatar(auth.principal.user_id, content_type(&req), &body)
        .await?;
    Ok(ok(user))
}

async fn remove_avatar(state: web::Data<AppState>, auth: AuthUser) -> AppResult<HttpResponse> {
    Ok(ok(state.accounts.remove_avatar(auth.principal.user_id).await?))
}

async fn wishlist(state: web::Data<AppState>, auth: AuthUser) -> AppResult<HttpResponse> {
    let customer_id = auth.require_customer()?;
    Ok(ok(state.accounts.wishlist(customer_id).await?))
}

async fn add_to_wishlist(
    state: web::Data<AppState>,
    auth: AuthUser,
    body: web::Json<WishlistAdd>,
) -> AppResult<HttpResponse> {
    let customer_id = auth.require_customer()?;
    Ok(ok(state.accounts.add_to_wishlist(customer_id, body.book_id).await?))
}

async fn remove_from_wishlist(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let customer_id = auth.require_customer()?;
    Ok(ok(state.accounts.remove_from_wishlist(customer_id, path.into_inner()).await?))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, App};

    use crate::api::configure;
    use crate::api::test_support::offline_state;

    #[actix_web::test]
    async fn test_profile_requires_token() {
        let app = test::init_service(App::new().app_data(offline_state(None).await).configure(configure)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/user/profile").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_forgot_password_is_neutral() {
        let app = test::init_service(App::new().app_data(offline_state(None).await).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/user/forgot-password")
            .set_json(serde_json::json!({ "email": "nobody@example.com" }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert!(body["message"].as_str().unwrap().starts_with("If an account exists"));
    }

    #[actix_web::test]
    async fn test_register_rejects_malformed_body() {
        let app = test::init_service(App::new().app_data(offline_state(None).await).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/user/register")
            .set_json(serde_json::json!({ "email": "a@b.co" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
