use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::domain::account::AccountError;
use crate::domain::cart::CartError;
use crate::domain::catalog::CatalogError;
use crate::domain::order::OrderError;
use crate::gateway::webhook::WebhookError;
use crate::gateway::GatewayError;
use crate::storage::UploadError;

// ============================================================================
// HTTP-facing Error - every handler returns Result<_, AppError>
// ============================================================================

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Message sent to the client. Storage and internal failures stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::Database(sqlx::Error::RowNotFound) => "Resource not found".to_string(),
            AppError::Database(e) if is_unique_violation(e) => "Resource already exists".to_string(),
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Upload(UploadError::Io(_)) => "Failed to store upload".to_string(),
            other => other.to_string(),
        }
    }
}

/// Two requests racing to create the same row.
fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Order(_) | AppError::Cart(_) | AppError::Catalog(_) => StatusCode::BAD_REQUEST,
            AppError::Account(e) => match e {
                AccountError::EmailTaken(_) | AccountError::RoleAlreadyHeld(_) => StatusCode::CONFLICT,
                AccountError::InvalidCredentials | AccountError::Inactive => StatusCode::UNAUTHORIZED,
                _ => StatusCode::BAD_REQUEST,
            },
            AppError::Upload(e) => match e {
                UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                UploadError::UnsupportedType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                UploadError::Empty | UploadError::InvalidName => StatusCode::BAD_REQUEST,
                UploadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Gateway(e) => match e {
                GatewayError::UnsupportedMethod(_) => StatusCode::BAD_REQUEST,
                GatewayError::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
                GatewayError::Transport(_) | GatewayError::Rejected { .. } | GatewayError::InvalidResponse(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
            AppError::Webhook(WebhookError::MalformedPayload(_)) => StatusCode::BAD_REQUEST,
            AppError::Webhook(_) => StatusCode::UNAUTHORIZED,
            AppError::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Database(e) if is_unique_violation(e) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        HttpResponse::build(status).json(json!({
            "success": false,
            "error": self.public_message(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderStatus, PaymentMethod};

    #[test]
    fn test_order_rule_violation_is_bad_request() {
        let err = AppError::from(OrderError::AccessRequiresCompleted(OrderStatus::Pending));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.public_message().contains("completed"));
    }

    #[test]
    fn test_row_not_found_maps_to_404() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = AppError::from(anyhow::anyhow!("connection string leaked"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn test_upload_errors_map_to_media_statuses() {
        let too_large = AppError::from(UploadError::TooLarge { limit: 10 });
        assert_eq!(too_large.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let wrong_type = AppError::from(UploadError::UnsupportedType {
            content_type: "text/plain".into(),
        });
        assert_eq!(wrong_type.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn test_duplicate_email_is_conflict() {
        let err = AppError::from(AccountError::EmailTaken("a@b.co".into()));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_gateway_error_statuses() {
        let err = AppError::from(GatewayError::CircuitOpen);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err = AppError::from(GatewayError::Rejected { status: 400, detail: "bad".into() });
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let err = AppError::from(GatewayError::UnsupportedMethod(PaymentMethod::BankTransfer));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_webhook_signature_failure_is_unauthorized() {
        let err = AppError::from(WebhookError::SignatureMismatch);
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let err = AppError::from(WebhookError::MalformedPayload("eof".into()));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
