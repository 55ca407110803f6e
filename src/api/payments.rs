use actix_web::{web, HttpRequest, HttpResponse};
use anyhow::Context;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppResult;
use crate::gateway::webhook::SIGNATURE_HEADER;
use crate::gateway::SourceType;
use crate::services::payments::{ConfirmRequest, OrderPaymentRequest, RefundRequest, ReviewRequest};

use super::extractors::content_type;
use super::{ok, AppState, AuthUser};

#[derive(Debug, Deserialize)]
struct ProofQuery {
    notes: Option<String>,
}

pub(super) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/create-intent", web::post().to(create_intent))
        .route("/gcash", web::post().to(gcash))
        .route("/maya", web::post().to(maya))
        .route("/confirm", web::post().to(confirm))
        .route("/status/{intent_id}", web::get().to(intent_status))
        .route("/verify/{order_id}", web::post().to(submit_proof))
        .route("/pending-verifications", web::get().to(pending_verifications))
        .route("/proof/{order_id}", web::get().to(proof_file))
        .route("/approve/{order_id}", web::post().to(review))
        .route("/refund/request", web::post().to(request_refund))
        .route("/refund/process", web::post().to(process_refund))
        .route("/pending-refunds", web::get().to(pending_refunds))
        .route("/webhook", web::post().to(webhook));
}

async fn create_intent(
    state: web::Data<AppState>,
    auth: AuthUser,
    body: web::Json<OrderPaymentRequest>,
) -> AppResult<HttpResponse> {
    Ok(ok(state.payments.create_intent(&auth.principal, body.order_id).await?))
}

async fn gcash(
    state: web::Data<AppState>,
    auth: AuthUser,
    body: web::Json<OrderPaymentRequest>,
) -> AppResult<HttpResponse> {
    let source = state
        .payments
        .create_source(&auth.principal, body.order_id, SourceType::Gcash)
        .await?;
    Ok(ok(source))
}

async fn maya(
    state: web::Data<AppState>,
    auth: AuthUser,
    body: web::Json<OrderPaymentRequest>,
) -> AppResult<HttpResponse> {
    let source = state
        .payments
        .create_source(&auth.principal, body.order_id, SourceType::Maya)
        .await?;
    Ok(ok(source))
}

async fn confirm(state: web::Data<AppState>, auth: AuthUser, body: web::Json<ConfirmRequest>) -> AppResult<HttpResponse> {
    Ok(ok(state.payments.confirm(&auth.principal, body.into_inner()).await?))
}

async fn intent_status(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    Ok(ok(state.payments.intent_status(&auth.principal, &path.into_inner()).await?))
}

async fn submit_proof(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<Uuid>,
    query: web::Query<ProofQuery>,
    req: HttpRequest,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let order = state
        .payments
        .submit_proof(
            &auth.principal,
            path.into_inner(),
            content_type(&req),
            &body,
            query.into_inner().notes,
        )
        .await?;
    Ok(ok(order))
}

async fn pending_verifications(state: web::Data<AppState>, auth: AuthUser) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    Ok(ok(state.payments.pending_verifications().await?))
}

async fn proof_file(state: web::Data<AppState>, auth: AuthUser, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let file = state.payments.proof_file(path.into_inner()).await?;
    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read payment proof {}", file.display()))?;

    let mime = match file.extension().and_then(|ext| ext.to_str()) {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    };
    Ok(HttpResponse::Ok().content_type(mime).body(bytes))
}

async fn review(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<Uuid>,
    body: web::Json<ReviewRequest>,
) -> AppResult<HttpResponse> {
    let admin = auth.require_admin()?;
    Ok(ok(state.payments.review(admin, path.into_inner(), body.into_inner()).await?))
}

async fn request_refund(
    state: web::Data<AppState>,
    auth: AuthUser,
    body: web::Json<RefundRequest>,
) -> AppResult<HttpResponse> {
    Ok(ok(state.payments.request_refund(&auth.principal, body.into_inner()).await?))
}

async fn process_refund(
    state: web::Data<AppState>,
    auth: AuthUser,
    body: web::Json<OrderPaymentRequest>,
) -> AppResult<HttpResponse> {
    let admin = auth.require_admin()?;
    Ok(ok(state.payments.process_refund(admin, body.order_id).await?))
}

async fn pending_refunds(state: web::Data<AppState>, auth: AuthUser) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    Ok(ok(state.payments.pending_refunds().await?))
}

/// Signature is checked against the exact bytes received.
async fn webhook(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> AppResult<HttpResponse> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let outcome = state.payments.handle_webhook(signature, &body).await?;
    Ok(HttpResponse::Ok().json(json!({ "received": true, "outcome": outcome })))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, App};
    use chrono::Utc;
    use serde_json::json;

    use crate::api::configure;
    use crate::api::test_support::offline_state;
    use crate::gateway::webhook::{sign, SIGNATURE_HEADER};

    const SECRET: &str = "whsk_test_secret";

    fn signed_header(body: &[u8]) -> String {
        let ts = Utc::now().timestamp();
        format!("t={},te={},li=", ts, hex::encode(sign(SECRET, ts, body).unwrap()))
    }

    #[actix_web::test]
    async fn test_webhook_rejected_without_configured_secret() {
        let app = test::init_service(App::new().app_data(offline_state(None).await).configure(configure)).await;

        let body = br#"{"data":{"id":"evt_1","attributes":{"type":"payment.paid"}}}"#.to_vec();
        let req = test::TestRequest::post()
            .uri("/api/payment/webhook")
            .insert_header((SIGNATURE_HEADER, signed_header(&body)))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_webhook_rejects_bad_signature() {
        let app =
            test::init_service(App::new().app_data(offline_state(Some(SECRET)).await).configure(configure)).await;

        let body = br#"{"data":{"id":"evt_1","attributes":{"type":"payment.paid"}}}"#.to_vec();
        let ts = Utc::now().timestamp();
        let req = test::TestRequest::post()
            .uri("/api/payment/webhook")
            .insert_header((SIGNATURE_HEADER, format!("t={ts},te={},li=", "00".repeat(32))))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_unhandled_event_type_is_acknowledged() {
        let app =
            test::init_service(App::new().app_data(offline_state(Some(SECRET)).await).configure(configure)).await;

        let body = serde_json::to_vec(&json!({
            "data": {
                "id": "evt_2",
                "attributes": {
                    "type": "checkout_session.payment.paid",
                    "data": { "id": "cs_1", "attributes": {} }
                }
            }
        }))
        .unwrap();
        let req = test::TestRequest::post()
            .uri("/api/payment/webhook")
            .insert_header((SIGNATURE_HEADER, signed_header(&body)))
            .set_payload(body)
            .to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["received"], true);
        assert_eq!(resp["outcome"], "ignored");
    }

    #[actix_web::test]
    async fn test_refund_processing_requires_token() {
        let app = test::init_service(App::new().app_data(offline_state(None).await).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/payment/refund/process")
            .set_json(json!({ "order_id": "0190b4a4-7d2e-7c1b-9f00-000000000001" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
