use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use uuid::Uuid;

use crate::db;
use crate::db::sessions::SessionPrincipal;
use crate::error::{AppError, AppResult};
use crate::services::auth;

use super::AppState;

/// An authenticated caller, resolved from `Authorization: Bearer <token>`.
pub struct AuthUser {
    pub principal: SessionPrincipal,
    /// Digest of the presented token; logout revokes exactly this session.
    pub token_hash: String,
}

impl AuthUser {
    pub fn require_admin(&self) -> AppResult<&SessionPrincipal> {
        if self.principal.is_admin() {
            Ok(&self.principal)
        } else {
            Err(AppError::forbidden("Admin access required"))
        }
    }

    /// An admin that also holds `permission`.
    pub fn require_permission(&self, permission: &str) -> AppResult<&SessionPrincipal> {
        let admin = self.require_admin()?;
        if admin.has_permission(permission) {
            Ok(admin)
        } else {
            Err(AppError::forbidden(format!("Requires the {permission} permission")))
        }
    }

    pub fn require_customer(&self) -> AppResult<Uuid> {
        self.principal
            .customer_id
            .ok_or_else(|| AppError::forbidden("A customer account is required"))
    }

    pub fn require_publisher(&self) -> AppResult<Uuid> {
        self.principal
            .publisher_id
            .ok_or_else(|| AppError::forbidden("A publisher account is required"))
    }
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = bearer_token(req).map(str::to_string);
        let state = req.app_data::<web::Data<AppState>>().cloned();

        Box::pin(async move {
            let token = token.ok_or_else(|| AppError::unauthorized("Missing bearer token"))?;
            let state = state.ok_or_else(|| anyhow::anyhow!("Application state not configured"))?;

            let token_hash = auth::hash_token(&token);
            let principal = db::sessions::find_principal(&state.pool, &token_hash)
                .await?
                .ok_or_else(|| AppError::unauthorized("Invalid or expired token"))?;
            if !principal.is_active {
                return Err(AppError::unauthorized("Account is deactivated"));
            }

            Ok(AuthUser { principal, token_hash })
        })
    }
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// `Content-Type` of a raw upload body, without parameters.
pub(crate) fn content_type(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::CONTENT_TYPE)?
        .to_str()
        .ok()
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
}
