use actix_web::{web, HttpResponse, Responder};
use prometheus::{Encoder, TextEncoder};

use crate::api::AppState;

/// Prometheus text exposition of every registered metric.
pub async fn metrics_handler(state: web::Data<AppState>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

/// Liveness plus a database round-trip.
pub async fn health_handler(state: web::Data<AppState>) -> impl Responder {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "service": "bookstore-api",
            "database": "up"
        })),
        Err(e) => {
            tracing::warn!(error = %e, "Health check: database unreachable");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "unhealthy",
                "service": "bookstore-api",
                "database": "down"
            }))
        }
    }
}
