use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;

use crate::config::Config;
use crate::domain::order::{OrderCommandHandler, OrderEvent};
use crate::event_sourcing::EventStore;
use crate::gateway::{PayMongoClient, PaymentGateway};
use crate::metrics::{self, Metrics};
use crate::services::{AccountService, CartService, CatalogService, OrderService, PaymentService, PublisherService};
use crate::storage::UploadStore;

mod extractors;
mod users;
mod publishers;
mod admins;
mod books;
mod cart;
mod orders;
mod payments;
mod uploads;

pub use extractors::AuthUser;

// ============================================================================
// HTTP API - actix-web routes over the application services
// ============================================================================
//
// Every JSON response is wrapped as {"success": true, "data": ...}; errors
// are rendered by AppError as {"success": false, "error": ...}.
//
// ============================================================================

/// Shared, read-only state behind every handler.
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub metrics: Arc<Metrics>,
    pub uploads: Arc<UploadStore>,
    pub accounts: AccountService,
    pub publishers: PublisherService,
    pub catalog: CatalogService,
    pub carts: CartService,
    pub orders: OrderService,
    pub payments: PaymentService,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool, metrics: Arc<Metrics>, uploads: Arc<UploadStore>) -> anyhow::Result<Self> {
        let gateway: Arc<dyn PaymentGateway> =
            Arc::new(PayMongoClient::new(&config.gateway, &config.frontend_url, metrics.clone())?);
        Ok(Self::with_gateway(config, pool, metrics, uploads, gateway))
    }

    /// Wire every service around an already-built gateway client.
    pub fn with_gateway(
        config: Config,
        pool: PgPool,
        metrics: Arc<Metrics>,
        uploads: Arc<UploadStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let event_store = Arc::new(EventStore::<OrderEvent>::new("Order", "order_events"));
        let handler = Arc::new(OrderCommandHandler::new(pool.clone(), event_store, metrics.clone()));

        Self {
            accounts: AccountService::new(pool.clone(), config.sessions.clone(), uploads.clone()),
            publishers: PublisherService::new(pool.clone()),
            catalog: CatalogService::new(pool.clone(), uploads.clone()),
            carts: CartService::new(pool.clone()),
            orders: OrderService::new(
                pool.clone(),
                handler.clone(),
                uploads.clone(),
                config.public_base_url.clone(),
            ),
            payments: PaymentService::new(
                pool.clone(),
                handler,
                gateway,
                uploads.clone(),
                metrics.clone(),
                &config.gateway,
            ),
            pool,
            config,
            metrics,
            uploads,
        }
    }
}

/// Mount every route. Shared by `main` and the handler tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(metrics::health_handler))
        .route("/metrics", web::get().to(metrics::metrics_handler))
        .service(
            web::scope("/api")
                .service(web::scope("/user").configure(users::configure))
                .service(web::scope("/publisher").configure(publishers::configure))
                .service(web::scope("/admin").configure(admins::configure))
                .service(web::scope("/books").configure(books::configure))
                .service(web::scope("/cart").configure(cart::configure))
                .service(web::scope("/order").configure(orders::configure))
                .service(web::scope("/payment").configure(payments::configure)),
        )
        .service(web::scope("/uploads").configure(uploads::configure));
}

pub(crate) fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "data": data }))
}

pub(crate) fn created<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Created().json(json!({ "success": true, "data": data }))
}

pub(crate) fn message(text: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "message": text }))
}
