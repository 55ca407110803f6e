use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::{dev::Service, web, App, HttpServer};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod db;
mod domain;
mod error;
mod event_sourcing;
mod gateway;
mod metrics;
mod services;
mod storage;
mod utils;

use api::AppState;
use config::Config;
use storage::UploadStore;

/// Largest request body accepted; book files are the biggest uploads.
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024 + 64 * 1024;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, overridable with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bookstore_api=debug"))
        )
        .init();

    tracing::info!("🚀 Starting bookstore API");

    let config = Config::from_env()?;
    let pool = db::connect(&config).await?;

    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metric families", metrics.registry().gather().len());

    let uploads = Arc::new(
        UploadStore::init(config.upload_dir.clone(), config.public_base_url.clone(), metrics.clone()).await?,
    );
    if config.gateway.webhook_secret.is_none() {
        tracing::warn!("PAYMONGO_WEBHOOK_SECRET not set; every webhook delivery will be rejected");
    }

    let bind_addr = config.bind_addr.clone();
    let bootstrap_admin = config.bootstrap_admin.clone();
    let state = web::Data::new(AppState::new(config, pool, metrics, uploads)?);

    if let Some(seed) = &bootstrap_admin {
        if !state.accounts.ensure_bootstrap_admin(seed).await? {
            tracing::debug!("An admin already exists; ADMIN_EMAIL ignored");
        }
    }

    spawn_session_purge(state.clone());

    tracing::info!(addr = %bind_addr, "🌐 HTTP server listening");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(MAX_BODY_BYTES))
            .app_data(web::JsonConfig::default().limit(1024 * 1024))
            .wrap_fn(|req, srv| {
                let started = Instant::now();
                let method = req.method().to_string();
                let path = req.path().to_string();
                let fut = srv.call(req);
                async move {
                    let res = fut.await?;
                    let elapsed = started.elapsed();
                    let route = res
                        .request()
                        .match_pattern()
                        .unwrap_or_else(|| "unmatched".to_string());
                    let status = res.status().as_u16();

                    if let Some(state) = res.request().app_data::<web::Data<AppState>>() {
                        state
                            .metrics
                            .record_http_request(&method, &route, status, elapsed.as_secs_f64());
                    }
                    tracing::debug!(
                        method = %method,
                        path = %path,
                        status,
                        latency_ms = elapsed.as_millis() as u64,
                        "HTTP request"
                    );
                    Ok(res)
                }
            })
            .configure(api::configure)
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    tracing::info!("👋 Server stopped");
    Ok(())
}

/// Expired sessions are already rejected on lookup; this only keeps the table small.
fn spawn_session_purge(state: web::Data<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match state.accounts.purge_expired_sessions().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "🧹 Expired sessions purged"),
                Err(e) => tracing::warn!(error = %e, "Session purge failed"),
            }
        }
    });
}
