use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::account::{PublisherProfile, Registration, USER_MANAGEMENT};
use crate::error::AppResult;
use crate::services::publishers::{PayrollRequest, PublisherUpdate};

use super::{created, ok, AppState, AuthUser};

#[derive(Debug, Deserialize)]
struct PublisherRegistration {
    #[serde(flatten)]
    account: Registration,
    #[serde(flatten)]
    profile: PublisherProfile,
}

pub(super) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(list))
        .route("/register/publisher", web::post().to(register))
        .route("/upgrade/publisher", web::post().to(upgrade))
        .route("/profile", web::get().to(dashboard))
        .route("/profile", web::put().to(update_profile))
        .route("/payroll", web::post().to(payroll))
        .route("/reset-monthly", web::post().to(reset_monthly))
        .route("/{id}", web::get().to(public_profile))
        .route("/{id}/verify", web::post().to(verify));
}

async fn register(state: web::Data<AppState>, body: web::Json<PublisherRegistration>) -> AppResult<HttpResponse> {
    let PublisherRegistration { account, profile } = body.into_inner();
    let user = state.accounts.register_publisher(account, profile).await?;
    Ok(created(user))
}

async fn upgrade(
    state: web::Data<AppState>,
    auth: AuthUser,
    body: web::Json<PublisherProfile>,
) -> AppResult<HttpResponse> {
    let user = state
        .accounts
        .upgrade_to_publisher(&auth.principal, body.into_inner())
        .await?;
    Ok(created(user))
}

async fn dashboard(state: web::Data<AppState>, auth: AuthUser) -> AppResult<HttpResponse> {
    let publisher_id = auth.require_publisher()?;
    Ok(ok(state.publishers.dashboard(publisher_id).await?))
}

async fn update_profile(
    state: web::Data<AppState>,
    auth: AuthUser,
    body: web::Json<PublisherUpdate>,
) -> AppResult<HttpResponse> {
    let publisher_id = auth.require_publisher()?;
    Ok(ok(state.publishers.update_profile(publisher_id, body.into_inner()).await?))
}

async fn public_profile(state: web::Data<AppState>, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
    Ok(ok(state.publishers.public_profile(path.into_inner()).await?))
}

async fn list(state: web::Data<AppState>, auth: AuthUser) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    Ok(ok(state.publishers.list().await?))
}

async fn verify(state: web::Data<AppState>, auth: AuthUser, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
    let admin = auth.require_permission(USER_MANAGEMENT)?;
    Ok(ok(state.publishers.verify(path.into_inner(), admin.user_id).await?))
}

async fn payroll(
    state: web::Data<AppState>,
    auth: AuthUser,
    body: web::Json<PayrollRequest>,
) -> AppResult<HttpResponse> {
    let admin = auth.require_admin()?;
    Ok(ok(state.publishers.payroll(body.into_inner(), admin.user_id).await?))
}

async fn reset_monthly(state: web::Data<AppState>, auth: AuthUser) -> AppResult<HttpResponse> {
    let admin = auth.require_admin()?;
    let reset = state.publishers.reset_monthly_earnings(admin.user_id).await?;
    Ok(ok(json!({ "publishers_reset": reset })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{admin_with, offline_state};
    use crate::error::AppError;

    #[test]
    fn test_registration_splits_account_and_profile() {
        let body: PublisherRegistration = serde_json::from_value(json!({
            "username": "jrizal",
            "email": "rizal@example.com",
            "password": "noli-me-tangere",
            "confirm_password": "noli-me-tangere",
            "full_name": "Jose Rizal",
            "pen_name": "Laong Laan",
            "genres": ["Fiction", "Satire"]
        }))
        .unwrap();

        assert_eq!(body.account.username, "jrizal");
        assert_eq!(body.profile.pen_name, "Laong Laan");
        assert_eq!(body.profile.genres.len(), 2);
    }

    #[actix_web::test]
    async fn test_verification_requires_user_management() {
        let state = offline_state(None).await;
        let err = verify(state, admin_with(&["book-management"]), web::Path::from(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
