use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::account::{AdminProfile, Registration, ANALYTICS_VIEW, USER_MANAGEMENT};
use crate::error::AppResult;
use crate::services::accounts::{Paging, UserSearch};

use super::{created, ok, AppState, AuthUser};

#[derive(Debug, Deserialize)]
struct AdminRegistration {
    #[serde(flatten)]
    account: Registration,
    #[serde(flatten)]
    profile: AdminProfile,
}

pub(super) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/register", web::post().to(register))
        .route("/stats", web::get().to(user_stats))
        .route("/users/search", web::get().to(search_users))
        .route("/users/{id}/deactivate", web::put().to(deactivate))
        .route("/users/{id}/reactivate", web::put().to(reactivate))
        .route("/customers", web::get().to(customers))
        .route("/customers/{id}", web::get().to(customer))
        .route("/publishers/{id}", web::get().to(publisher));
}

async fn register(
    state: web::Data<AppState>,
    auth: AuthUser,
    body: web::Json<AdminRegistration>,
) -> AppResult<HttpResponse> {
    let AdminRegistration { account, profile } = body.into_inner();
    let user = state.accounts.register_admin(&auth.principal, account, profile).await?;
    Ok(created(user))
}

async fn deactivate(state: web::Data<AppState>, auth: AuthUser, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
    let admin = auth.require_permission(USER_MANAGEMENT)?;
    Ok(ok(state.accounts.set_active(admin, path.into_inner(), false).await?))
}

async fn reactivate(state: web::Data<AppState>, auth: AuthUser, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
    let admin = auth.require_permission(USER_MANAGEMENT)?;
    Ok(ok(state.accounts.set_active(admin, path.into_inner(), true).await?))
}

async fn search_users(
    state: web::Data<AppState>,
    auth: AuthUser,
    query: web::Query<UserSearch>,
) -> AppResult<HttpResponse> {
    auth.require_permission(USER_MANAGEMENT)?;
    Ok(ok(state.accounts.search_users(query.into_inner()).await?))
}

async fn customers(state: web::Data<AppState>, auth: AuthUser, query: web::Query<Paging>) -> AppResult<HttpResponse> {
    auth.require_permission(USER_MANAGEMENT)?;
    Ok(ok(state.accounts.customers(query.into_inner()).await?))
}

async fn customer(state: web::Data<AppState>, auth: AuthUser, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
    auth.require_permission(USER_MANAGEMENT)?;
    Ok(ok(state.accounts.customer(path.into_inner()).await?))
}

/// Full publisher view: profile with earnings, every book and sales.
async fn publisher(state: web::Data<AppState>, auth: AuthUser, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
    auth.require_permission(USER_MANAGEMENT)?;
    Ok(ok(state.publishers.dashboard(path.into_inner()).await?))
}

async fn user_stats(state: web::Data<AppState>, auth: AuthUser) -> AppResult<HttpResponse> {
    auth.require_permission(ANALYTICS_VIEW)?;
    Ok(ok(state.accounts.user_stats().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{admin_with, offline_state};
    use crate::domain::account::AccountRole;
    use crate::error::AppError;

    #[test]
    fn test_admin_level_defaults_to_moderator() {
        let body: AdminRegistration = serde_json::from_value(serde_json::json!({
            "username": "ops",
            "email": "ops@example.com",
            "password": "correct-horse",
            "confirm_password": "correct-horse",
            "full_name": "Operations",
            "permissions": ["user-management"]
        }))
        .unwrap();

        assert_eq!(body.profile.admin_level, "moderator");
        assert_eq!(body.profile.permissions, vec!["user-management".to_string()]);
    }

    #[test]
    fn test_search_query_string() {
        let query = web::Query::<UserSearch>::from_query("q=rizal&userType=publisher&limit=5&offset=10").unwrap();
        assert_eq!(query.q.as_deref(), Some("rizal"));
        assert_eq!(query.user_type, Some(AccountRole::Publisher));
        assert_eq!((query.limit, query.offset), (Some(5), Some(10)));
    }

    #[actix_web::test]
    async fn test_deactivation_requires_user_management() {
        let state = offline_state(None).await;
        let target = Uuid::new_v4();

        let err = deactivate(state.clone(), admin_with(&[ANALYTICS_VIEW]), web::Path::from(target))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = reactivate(state.clone(), admin_with(&[]), web::Path::from(target))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        // Past the permission check the offline pool is the first thing to fail.
        let err = deactivate(state, admin_with(&[USER_MANAGEMENT]), web::Path::from(target))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[actix_web::test]
    async fn test_rosters_and_stats_are_permission_gated() {
        let state = offline_state(None).await;

        let err = customers(state.clone(), admin_with(&[ANALYTICS_VIEW]), web::Query(Paging::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = publisher(state.clone(), admin_with(&[ANALYTICS_VIEW]), web::Path::from(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = user_stats(state.clone(), admin_with(&[USER_MANAGEMENT])).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = user_stats(state, admin_with(&[ANALYTICS_VIEW])).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[actix_web::test]
    async fn test_blank_search_rejected_before_querying() {
        let state = offline_state(None).await;
        let query = web::Query::<UserSearch>::from_query("q=%20%20").unwrap();

        let err = search_users(state, admin_with(&[USER_MANAGEMENT]), query).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
